#![cfg_attr(not(test), no_std)]
#![allow(non_snake_case)]

extern crate alloc;

pub mod boot;
pub mod constants;
pub mod flash;
pub mod hexparser;
pub mod image;
pub mod traits;
pub mod upgrade;
pub mod verifier;

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The BootError type. Every fallible operation exposed by this crate returns
/// `crate::Result<T>` built on this single, flat enum.
pub enum BootError {
    /// The intel-hex header (`:LLAAAATT`) has not arrived in full yet.
    ParserMissingLine,
    /// A second `:` was found before the current record could complete.
    ParserIncompleteLine,
    /// The record's checksum byte does not match the computed checksum.
    ParserCRCError,
    /// `LL` exceeds the 32-byte payload limit the core allows.
    ParserDataLengthExceeded,
    /// The flash façade reported `Busy`; the caller should retry.
    FlashBusy,
    /// The flash façade reported a fatal `Failure`.
    FlashFailure,
    /// An address lies outside the device's flash range.
    OutOfRange,
    /// `write` was called with a `len` outside {256, 512, 1024, 4096} or an
    /// unaligned `address`.
    InvalidWriteSize,
    /// The header's `imageOffset - FIRMWARE_METADATA_LENGTH` does not equal
    /// `FIRMWARE_START_ADDRESS`.
    IncompatibleFWOffset,
    /// `imageOffset + imageSize` exceeds the device's flash size.
    FWExceedsFlash,
    /// The record stream carried an unrecoverable framing error.
    BadRecord,
    /// No data arrived for longer than the configured inactivity timeout.
    UpgradeTimeout,
    /// The public key's modulus is not 2048 bits (256 bytes) wide.
    InvalidRSASignFormat,
    /// SHA-256 digest computation over the image failed.
    MDVerFail,
    /// PKCS#1 v1.5 signature verification failed.
    RSAVerFail,
    /// The pinned public key could not be parsed from its hex encoding.
    BadInput,
    /// The boot loop exhausted its configured retry budget without a
    /// successful verification.
    ExhaustedRetries,

    #[doc(hidden)]
    __Nonexhaustive,
}

/// The result type for bootcore.
pub type Result<T> = core::result::Result<T, BootError>;

#[rustfmt::skip]
impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &BootError::ParserMissingLine        => write!(f, "intel-hex: need more bytes"),
            &BootError::ParserIncompleteLine     => write!(f, "intel-hex: record truncated by a second ':'"),
            &BootError::ParserCRCError           => write!(f, "intel-hex: checksum mismatch"),
            &BootError::ParserDataLengthExceeded => write!(f, "intel-hex: LL exceeds 32 bytes"),
            &BootError::FlashBusy                => write!(f, "flash: device busy, retry"),
            &BootError::FlashFailure              => write!(f, "flash: operation failed"),
            &BootError::OutOfRange                => write!(f, "flash: address out of range"),
            &BootError::InvalidWriteSize          => write!(f, "flash: invalid write length or alignment"),
            &BootError::IncompatibleFWOffset      => write!(f, "upgrade: imageOffset incompatible with FIRMWARE_START_ADDRESS"),
            &BootError::FWExceedsFlash            => write!(f, "upgrade: image does not fit in flash"),
            &BootError::BadRecord                 => write!(f, "upgrade: unrecoverable record framing error"),
            &BootError::UpgradeTimeout            => write!(f, "upgrade: inactivity timeout"),
            &BootError::InvalidRSASignFormat      => write!(f, "verify: public key is not RSA-2048"),
            &BootError::MDVerFail                 => write!(f, "verify: sha256 digest computation failed"),
            &BootError::RSAVerFail                => write!(f, "verify: signature does not match"),
            &BootError::BadInput                  => write!(f, "verify: malformed pinned key"),
            &BootError::ExhaustedRetries          => write!(f, "boot: exhausted upgrade/verify retry budget"),
            &BootError::__Nonexhaustive           => unreachable!(),
        }
    }
}
