//! Driver façades the core consumes (spec §6). A test harness provides
//! in-memory fakes for all four; board crates provide the real thing.

/// Non-blocking UART façade.
pub trait Uart {
    /// Returns up to `buf.len()` bytes currently buffered; never blocks.
    /// Returns `0` if nothing is pending, `-1` on device error.
    fn receive(&mut self, buf: &mut [u8]) -> i32;
    fn send(&mut self, buf: &[u8]);
}

/// One-shot, re-armable inactivity timer façade.
pub trait Timer {
    /// (Re-)arms the timer to fire after `timeout_ms` of inactivity.
    fn start(&mut self, timeout_ms: u32);
}

/// CPU control façade (spec §6).
pub trait Cpu {
    fn disable_interrupts(&mut self);
    fn enable_interrupts(&mut self);
    /// Transfers control to the image at `address`. Does not return.
    fn jump_to_image(&mut self, address: usize) -> !;
    fn get_cpu_frequency_hz(&self) -> u32;
}

/// Policy hook: decides whether an upgrade attempt should run this boot
/// (spec §4.5, §9 "`CheckAndWaitForUpgradeAttempt` is a policy hook").
pub trait UpgradeTrigger {
    fn check_and_wait_for_upgrade_attempt(&mut self) -> bool;
}
