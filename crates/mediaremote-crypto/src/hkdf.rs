//! HKDF-SHA512 key derivation for handshake and session keys.

use hkdf::Hkdf;
use mediaremote_core::error::CryptoError;
use sha2::Sha512;

/// Derive a 32-byte key using HKDF-SHA512.
pub fn derive_key_32(ikm: &[u8], salt: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha512>::new(Some(salt), ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation("HKDF expand failed".to_string()))?;
    Ok(okm)
}

/// Salt and info labels used by the pairing protocol.
pub mod constants {
    pub const PAIR_SETUP_CONTROLLER_SIGN_SALT: &[u8] = b"Pair-Setup-Controller-Sign-Salt";
    pub const PAIR_SETUP_CONTROLLER_SIGN_INFO: &[u8] = b"Pair-Setup-Controller-Sign-Info";

    pub const PAIR_SETUP_ACCESSORY_SIGN_SALT: &[u8] = b"Pair-Setup-Accessory-Sign-Salt";
    pub const PAIR_SETUP_ACCESSORY_SIGN_INFO: &[u8] = b"Pair-Setup-Accessory-Sign-Info";

    pub const PAIR_SETUP_ENCRYPT_SALT: &[u8] = b"Pair-Setup-Encrypt-Salt";
    pub const PAIR_SETUP_ENCRYPT_INFO: &[u8] = b"Pair-Setup-Encrypt-Info";

    pub const PAIR_VERIFY_ENCRYPT_SALT: &[u8] = b"Pair-Verify-Encrypt-Salt";
    pub const PAIR_VERIFY_ENCRYPT_INFO: &[u8] = b"Pair-Verify-Encrypt-Info";

    pub const MEDIA_REMOTE_SALT: &[u8] = b"MediaRemote-Salt";
    pub const MEDIA_REMOTE_WRITE_KEY_INFO: &[u8] = b"MediaRemote-Write-Encryption-Key";
    pub const MEDIA_REMOTE_READ_KEY_INFO: &[u8] = b"MediaRemote-Read-Encryption-Key";
}

/// Derive the controller's pair-setup signing material (M5 transcript prefix).
pub fn derive_controller_sign_key(srp_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        srp_key,
        constants::PAIR_SETUP_CONTROLLER_SIGN_SALT,
        constants::PAIR_SETUP_CONTROLLER_SIGN_INFO,
    )
}

/// Derive the accessory's pair-setup signing material (M6 transcript prefix).
pub fn derive_accessory_sign_key(srp_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        srp_key,
        constants::PAIR_SETUP_ACCESSORY_SIGN_SALT,
        constants::PAIR_SETUP_ACCESSORY_SIGN_INFO,
    )
}

/// Derive pair-setup encryption key.
pub fn derive_pair_setup_key(srp_key: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        srp_key,
        constants::PAIR_SETUP_ENCRYPT_SALT,
        constants::PAIR_SETUP_ENCRYPT_INFO,
    )
}

/// Derive pair-verify encryption key.
pub fn derive_pair_verify_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::PAIR_VERIFY_ENCRYPT_SALT,
        constants::PAIR_VERIFY_ENCRYPT_INFO,
    )
}

/// Derive session write key (controller to peer).
pub fn derive_session_write_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::MEDIA_REMOTE_SALT,
        constants::MEDIA_REMOTE_WRITE_KEY_INFO,
    )
}

/// Derive session read key (peer to controller).
pub fn derive_session_read_key(shared_secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    derive_key_32(
        shared_secret,
        constants::MEDIA_REMOTE_SALT,
        constants::MEDIA_REMOTE_READ_KEY_INFO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    mod derive_key_32 {
        use super::*;

        #[test]
        fn different_salts_produce_different_keys() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key_32(&ikm, b"salt1", &[]).unwrap();
            let key2 = derive_key_32(&ikm, b"salt2", &[]).unwrap();
            assert_ne!(key1, key2);
        }

        #[test]
        fn different_info_produces_different_keys() {
            let ikm = [0x0bu8; 22];
            let key1 = derive_key_32(&ikm, &[], b"info1").unwrap();
            let key2 = derive_key_32(&ikm, &[], b"info2").unwrap();
            assert_ne!(key1, key2);
        }
    }

    mod protocol_labels {
        use super::*;

        #[test]
        fn setup_labels_produce_distinct_keys() {
            let srp_key = [0xABu8; 64];
            let controller = derive_controller_sign_key(&srp_key).unwrap();
            let accessory = derive_accessory_sign_key(&srp_key).unwrap();
            let encrypt = derive_pair_setup_key(&srp_key).unwrap();
            assert_ne!(controller, accessory);
            assert_ne!(controller, encrypt);
            assert_ne!(accessory, encrypt);
        }

        #[test]
        fn write_and_read_keys_are_different() {
            let shared_secret = [0xABu8; 32];
            let write_key = derive_session_write_key(&shared_secret).unwrap();
            let read_key = derive_session_read_key(&shared_secret).unwrap();
            assert_ne!(write_key, read_key);
        }
    }

    mod known_vectors {
        use super::*;

        #[test]
        fn sha512_test_case_1() {
            // RFC 5869 test case 1 inputs run through HKDF-SHA512
            let ikm = hex::decode("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b").unwrap();
            let salt = hex::decode("000102030405060708090a0b0c").unwrap();
            let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

            // First 32 bytes of the 42-byte OKM
            let okm = derive_key_32(&ikm, &salt, &info).unwrap();
            assert_eq!(
                hex::encode(okm),
                "832390086cda71fb47625bb5ceb168e4c8e26a1a16ed34d9fc7fe92c14815793"
            );
        }

        #[test]
        fn media_remote_session_keys() {
            let shared_secret = [0xABu8; 32];
            assert_eq!(
                hex::encode(derive_session_write_key(&shared_secret).unwrap()),
                "4d3d710c39e8ade3e3e77ae8d6ebfdab4f899ec89cafa4297ee8e7d1d4eed1a5"
            );
            assert_eq!(
                hex::encode(derive_session_read_key(&shared_secret).unwrap()),
                "1bd9be22d7e8ade65512814d1d01c82c893435b600e83339b3637c2c469d0563"
            );
        }
    }
}
