//! Builds a signed firmware region blob: `header | padding | signature |
//! image`, matching the layout `bootcore::image::FirmwareInfo` expects on
//! the device side.

use bootcore::constants::{FIRMWARE_METADATA_LENGTH, FIRMWARE_SIGNATURE_LENGTH};

use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};

#[derive(Debug)]
pub enum SignError {
    Rsa(rsa::errors::Error),
    ImageTooLarge,
}

impl std::fmt::Display for SignError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SignError::Rsa(e) => write!(f, "rsa signing failed: {}", e),
            SignError::ImageTooLarge => write!(f, "image_offset + image.len() overflows u32"),
        }
    }
}

impl std::error::Error for SignError {}

/// Signs `image` with `signing_key` and returns the full firmware region:
/// the 512-byte metadata header (image size, image offset, signature) with
/// `image` appended at offset `FIRMWARE_METADATA_LENGTH`.
pub fn sign_image(
    image: &[u8],
    signing_key: &RsaPrivateKey,
    firmware_start: u32,
) -> Result<Vec<u8>, SignError> {
    let image_offset = firmware_start + FIRMWARE_METADATA_LENGTH as u32;
    let image_size = u32::try_from(image.len()).map_err(|_| SignError::ImageTooLarge)?;
    image_offset
        .checked_add(image_size)
        .ok_or(SignError::ImageTooLarge)?;

    let mut hasher = Sha256::new();
    hasher.update(image);
    let digest = hasher.finalize();
    let signature = signing_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(SignError::Rsa)?;
    assert_eq!(signature.len(), FIRMWARE_SIGNATURE_LENGTH);

    let mut region = Vec::with_capacity(FIRMWARE_METADATA_LENGTH + image.len());
    region.resize(FIRMWARE_METADATA_LENGTH, 0xFF);
    region[0..4].copy_from_slice(&image_size.to_le_bytes());
    region[4..8].copy_from_slice(&image_offset.to_le_bytes());
    region[256..256 + FIRMWARE_SIGNATURE_LENGTH].copy_from_slice(&signature);
    region.extend_from_slice(image);

    Ok(region)
}
