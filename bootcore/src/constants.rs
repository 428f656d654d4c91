//! Build-time configuration (spec §6 "Build-time configuration").
//!
//! Flash geometry below targets the `nrf52840` board feature; adding a board
//! means adding its own sector geometry and pinned key behind its feature.

// **** flash geometry ****

/// Size, in bytes, of one of the first 16 erase sectors.
pub const SMALL_SECTOR_SIZE: usize = 4096;
/// Size, in bytes, of each erase sector after the first 16.
pub const LARGE_SECTOR_SIZE: usize = 32768;
/// Number of small (4 KiB) sectors at the bottom of flash.
pub const SMALL_SECTOR_COUNT: usize = 16;
/// Byte offset where large (32 KiB) sectors begin.
pub const LARGE_SECTOR_START: usize = SMALL_SECTOR_COUNT * SMALL_SECTOR_SIZE;

/// The largest single `flash.write` call the façade accepts.
pub const FLASH_PAGE_SIZE: usize = 4096;

pub const FLASH_SIZE: usize = 0x100000;
pub const FIRMWARE_START_ADDRESS: usize = 0x10000;

// **** firmware region layout (spec §3) ****

pub const FIRMWARE_SIGNATURE_LENGTH: usize = 256;
pub const FIRMWARE_METADATA_LENGTH: usize = 512;

// **** intel hex wire format (spec §3, §4.2) ****

pub const INTELHEX_ALLOWED_MAX_DATA_LENGTH: usize = 32;
pub const INTELHEX_SEGMENT_SIZE: u32 = 64 * 1024;

pub const RECORD_TYPE_DATA: u8 = 0x00;
pub const RECORD_TYPE_EOF: u8 = 0x01;
pub const RECORD_TYPE_EXT_SEGMENT_ADDRESS: u8 = 0x02;
pub const RECORD_TYPE_EXT_LINEAR_ADDRESS: u8 = 0x04;
pub const RECORD_TYPE_START_LINEAR_ADDRESS: u8 = 0x05;

// **** timing (spec §6 "Build-time configuration") ****

pub const UPGRADE_INACTIVITY_TIMEOUT_MS: u32 = 1000;
pub const UART_BAUD_RATE: u32 = 115_200;

// **** pinned public key (test key; a real deployment provisions its own) ****
//
// RSA-2048 modulus and exponent, hex-encoded, big-endian.

pub const PINNED_PUBLIC_KEY_N_HEX: &str = concat!(
    "914d6e53feec7dd6bda03e8d0fd471933073bbc9adae193b6b6b4b472563ac11",
    "75d3c5939f2582a5fbf008c65628ba52bfe75effe3ac6c82671f7b34b128900d",
    "f8cc4142b325ec92e25fc4e2ccc4f27997245991dd400e490124d2dbf21ec141",
    "5854c6eebb169eea4ff006b1a323f00c7884392fc2778c2f32d947244bbfd6b7",
    "4b2170aaee0d0e1d2c451fc5c110af4e9e58f0937d62907b900e4b57e9c79c64",
    "596faccc9bd126cfd08cc9c3d6edcde609e31788eda4f4948ced0098f90b76a4",
    "eef41f18506f81449d2c5cf5ad50dd804db5cf5882a53f854a5cd56ea7589785",
    "ef070ffa98be8483e057725d6274d600e1d028e278fc7c843beb3f48a35ac417"
);
pub const PINNED_PUBLIC_KEY_E_HEX: &str = "010001";
