//! Firmware region layout (spec §3): header, signature, image bytes.

use crate::constants::{FIRMWARE_METADATA_LENGTH, FIRMWARE_SIGNATURE_LENGTH};
use crate::{BootError, Result};

/// The first 8 bytes of the firmware region: `{ imageSize: u32, imageOffset:
/// u32 }`, little-endian, followed by padding to `FIRMWARE_SIGNATURE_LENGTH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub image_size: u32,
    pub image_offset: u32,
}

impl FirmwareInfo {
    /// Parses the header out of the first `FIRMWARE_METADATA_LENGTH` bytes
    /// of the firmware region.
    pub fn parse(metadata: &[u8; FIRMWARE_METADATA_LENGTH]) -> Result<Self> {
        let image_size = u32::from_le_bytes(metadata[0..4].try_into().unwrap());
        let image_offset = u32::from_le_bytes(metadata[4..8].try_into().unwrap());
        Ok(FirmwareInfo {
            image_size,
            image_offset,
        })
    }

    /// The signature field occupies `[FIRMWARE_SIGNATURE_LENGTH,
    /// FIRMWARE_METADATA_LENGTH)`.
    pub fn signature(metadata: &[u8; FIRMWARE_METADATA_LENGTH]) -> &[u8] {
        &metadata[FIRMWARE_SIGNATURE_LENGTH..FIRMWARE_METADATA_LENGTH]
    }

    /// Validates the header against the device's flash layout (spec §4.3
    /// "metadata boundary" checks).
    pub fn validate(&self, firmware_start: usize, flash_size: u32) -> Result<()> {
        let first_block_address = self
            .image_offset
            .checked_sub(FIRMWARE_METADATA_LENGTH as u32)
            .ok_or(BootError::IncompatibleFWOffset)?;
        if first_block_address as usize != firmware_start {
            return Err(BootError::IncompatibleFWOffset);
        }
        let end = self
            .image_offset
            .checked_add(self.image_size)
            .ok_or(BootError::FWExceedsFlash)?;
        if end > flash_size {
            return Err(BootError::FWExceedsFlash);
        }
        Ok(())
    }
}
