//! Boot controller (spec §4.5): init, optional upgrade, verify, jump.

use crate::constants::{FIRMWARE_METADATA_LENGTH, FIRMWARE_SIGNATURE_LENGTH, FIRMWARE_START_ADDRESS};
use crate::flash::FlashApi;
use crate::image::FirmwareInfo;
use crate::traits::{Cpu, Timer, Uart, UpgradeTrigger};
use crate::upgrade::{Flags, UpgradeEngine};
use crate::verifier::verify_image;
use crate::{BootError, Result};

/// Bounds the boot loop's verify-attempt budget (spec §4.5 "Retry policy").
///
/// `max_attempts = None` reproduces the reference loop's unbounded retry;
/// `Some(n)` causes [`run`] to return [`BootError::ExhaustedRetries`] after
/// `n` failed verify attempts, rather than spinning forever. This never
/// weakens the no-jump-without-verify invariant: exhausting retries still
/// never calls `jump_to_image`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub backoff_ms: u32,
}

impl RetryPolicy {
    pub const fn unbounded(backoff_ms: u32) -> Self {
        RetryPolicy {
            max_attempts: None,
            backoff_ms,
        }
    }
}

/// Drives one boot cycle to completion: optionally runs the upgrade engine,
/// verifies the firmware region, and returns the address to jump to.
///
/// Does not itself call `jump_to_image` — the caller (normally a board's
/// `main`) performs the irreversible transfer once this returns `Ok`, after
/// disabling interrupts via the `Cpu` façade.
pub fn run<Flash, U, T, C, G>(
    flash: &mut Flash,
    uart: &mut U,
    timer: &mut T,
    cpu: &mut C,
    trigger: &mut G,
    flags: &Flags,
    retry: RetryPolicy,
) -> Result<usize>
where
    Flash: FlashApi,
    U: Uart,
    T: Timer,
    C: Cpu,
    G: UpgradeTrigger,
{
    let _ = cpu.get_cpu_frequency_hz();

    let mut attempts: u32 = 0;
    loop {
        if trigger.check_and_wait_for_upgrade_attempt() {
            let mut engine = UpgradeEngine::new(flash, FIRMWARE_START_ADDRESS);
            engine.run(uart, timer, flags)?;
        }

        match verify_firmware_region(flash) {
            Ok(image_address) => return Ok(image_address),
            Err(_verify_err) => {
                attempts += 1;
                if let Some(max) = retry.max_attempts {
                    if attempts >= max {
                        return Err(BootError::ExhaustedRetries);
                    }
                }
                timer.start(retry.backoff_ms);
            }
        }
    }
}

/// Reads the metadata header and signature out of the firmware region,
/// then verifies the image bytes against the pinned public key.
///
/// Returns the address the bootloader should jump to on success.
fn verify_firmware_region<Flash: FlashApi>(flash: &mut Flash) -> Result<usize> {
    let metadata_slice = mapped_flash_region(FIRMWARE_START_ADDRESS, FIRMWARE_METADATA_LENGTH, flash)?;
    let mut metadata = [0u8; FIRMWARE_METADATA_LENGTH];
    metadata.copy_from_slice(metadata_slice);

    let info = FirmwareInfo::parse(&metadata)?;
    info.validate(FIRMWARE_START_ADDRESS, flash.size())?;

    let mut signature = [0u8; FIRMWARE_SIGNATURE_LENGTH];
    signature.copy_from_slice(FirmwareInfo::signature(&metadata));

    let image_address = info.image_offset as usize;
    let image = mapped_flash_region(image_address, info.image_size as usize, flash)?;
    verify_image(image, &signature)?;

    Ok(image_address)
}

/// Reads back `len` bytes starting at `address` over memory-mapped flash.
///
/// The `FlashApi` façade (spec §4.1) only models the IAP-sequenced
/// write/erase path; read access needs no such sequencing and is always
/// available as ordinary loads on the target, so the core reaches past the
/// façade here rather than widening it (mirrors `dt::reader`'s
/// `read_from_address` in the rest of this codebase).
fn mapped_flash_region<Flash: FlashApi>(
    address: usize,
    len: usize,
    flash: &Flash,
) -> Result<&'static [u8]> {
    let end = address.checked_add(len).ok_or(BootError::OutOfRange)?;
    if end > flash.size() as usize {
        return Err(BootError::OutOfRange);
    }
    Ok(unsafe { core::slice::from_raw_parts(address as *const u8, len) })
}
