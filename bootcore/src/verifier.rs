//! RSA-2048 / PKCS#1 v1.5 / SHA-256 image verification (spec §4.4).

use alloc::vec::Vec;

use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::constants::{FIRMWARE_SIGNATURE_LENGTH, PINNED_PUBLIC_KEY_E_HEX, PINNED_PUBLIC_KEY_N_HEX};
use crate::{BootError, Result};

fn hex_to_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(BootError::BadInput);
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let s = core::str::from_utf8(chunk).map_err(|_| BootError::BadInput)?;
        bytes.push(u8::from_str_radix(s, 16).map_err(|_| BootError::BadInput)?);
    }
    Ok(bytes)
}

/// Builds the pinned `RsaPublicKey` from the hex-encoded modulus and public
/// exponent, rejecting anything that isn't a genuine 2048-bit (256-byte)
/// modulus.
fn pinned_public_key() -> Result<RsaPublicKey> {
    let n_bytes = hex_to_bytes(PINNED_PUBLIC_KEY_N_HEX)?;
    let e_bytes = hex_to_bytes(PINNED_PUBLIC_KEY_E_HEX)?;
    if n_bytes.len() != 256 {
        return Err(BootError::InvalidRSASignFormat);
    }
    let n = BigUint::from_bytes_be(&n_bytes);
    let e = BigUint::from_bytes_be(&e_bytes);
    RsaPublicKey::new(n, e).map_err(|_| BootError::InvalidRSASignFormat)
}

/// Verifies `signature` against the SHA-256 digest of `image`, using the
/// given public key. The key (an `RsaPublicKey`/`BigUint` pair) is dropped
/// on every return path once this function returns, by ordinary RAII.
fn verify_with_key(
    pubkey: &RsaPublicKey,
    image: &[u8],
    signature: &[u8; FIRMWARE_SIGNATURE_LENGTH],
) -> Result<()> {
    let mut hasher = Sha256::new();
    hasher.update(image);
    let digest = hasher.finalize();

    pubkey
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, signature)
        .map_err(|_| BootError::RSAVerFail)
}

/// Verifies `image`'s signature against the pinned public key (spec §4.4).
pub fn verify_image(image: &[u8], signature: &[u8; FIRMWARE_SIGNATURE_LENGTH]) -> Result<()> {
    let pubkey = pinned_public_key()?;
    verify_with_key(&pubkey, image, signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use rsa::{traits::PublicKeyParts, RsaPrivateKey};

    fn sign(privkey: &RsaPrivateKey, image: &[u8]) -> [u8; FIRMWARE_SIGNATURE_LENGTH] {
        let mut hasher = Sha256::new();
        hasher.update(image);
        let digest = hasher.finalize();
        let sig = privkey
            .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
            .unwrap();
        let mut out = [0u8; FIRMWARE_SIGNATURE_LENGTH];
        out.copy_from_slice(&sig);
        out
    }

    #[test]
    fn valid_signature_is_accepted() {
        let privkey = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pubkey = RsaPublicKey::from(&privkey);
        let image = b"a firmware image, allegedly";
        let signature = sign(&privkey, image);

        assert!(verify_with_key(&pubkey, image, &signature).is_ok());
    }

    #[test]
    fn tampered_image_is_rejected() {
        let privkey = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let pubkey = RsaPublicKey::from(&privkey);
        let image = b"a firmware image, allegedly";
        let signature = sign(&privkey, image);

        let result = verify_with_key(&pubkey, b"a firmware image, actually", &signature);
        assert_eq!(result, Err(BootError::RSAVerFail));
    }

    #[test]
    fn signature_from_a_different_key_is_rejected() {
        let signing_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let other_key = RsaPrivateKey::new(&mut OsRng, 2048).unwrap();
        let image = b"a firmware image, allegedly";
        let signature = sign(&signing_key, image);

        let result = verify_with_key(&RsaPublicKey::from(&other_key), image, &signature);
        assert_eq!(result, Err(BootError::RSAVerFail));
    }

    #[test]
    fn pinned_key_decodes_to_a_2048_bit_modulus() {
        let pubkey = pinned_public_key().unwrap();
        assert_eq!(pubkey.n().to_bytes_be().len(), 256);
    }
}
