#![no_std]
#![no_main]

use core::mem::MaybeUninit;
use core::sync::atomic::Ordering;

#[cfg(feature = "defmt-rtt")]
use defmt_rtt as _;
#[cfg(feature = "panic-probe")]
use panic_probe as _;

use cortex_m_rt::entry;
use embedded_alloc::Heap;
use nrf52840_hal::pac::{interrupt, Peripherals, RTC0};

use bootcore::boot::{self, RetryPolicy};
use bootcore::traits::UpgradeTrigger;
use bootcore::upgrade::Flags;
use bootcore_hal::{CortexMCpu, FlashWriterEraser, RtcTimer, UarteDriver};

/// Interrupt-visible upgrade-session flags (spec §5): written only here and
/// in the two ISRs below, read only by `bootcore::upgrade::UpgradeEngine`.
static FLAGS: Flags = Flags::new();

/// Backs `bootcore::verifier`'s RSA arithmetic (spec §4.4: an 8 KiB fixed
/// arena, never grown, never freed back to a pool).
#[global_allocator]
static HEAP: Heap = Heap::empty();
const HEAP_SIZE: usize = 8192;

fn init_heap() {
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    unsafe { HEAP.init(HEAP_MEM.as_ptr() as usize, HEAP_SIZE) }
}

/// Policy hook: holding the DK's Button 1 (P0.11) down across reset
/// requests an upgrade attempt (spec §4.5 step 3a).
struct ButtonTrigger {
    button: nrf52840_hal::gpio::Pin<nrf52840_hal::gpio::Input<nrf52840_hal::gpio::PullUp>>,
}

impl UpgradeTrigger for ButtonTrigger {
    fn check_and_wait_for_upgrade_attempt(&mut self) -> bool {
        use embedded_hal::digital::v2::InputPin;
        self.button.is_low().unwrap_or(false)
    }
}

#[entry]
fn main() -> ! {
    init_heap();

    let dp = Peripherals::take().unwrap();
    let cp = nrf52840_hal::pac::CorePeripherals::take().unwrap();

    let port0 = nrf52840_hal::gpio::p0::Parts::new(dp.P0);
    let button = port0.p0_11.into_pullup_input().degrade();

    let mut flash = FlashWriterEraser::new(dp.NVMC);
    let mut uart = UarteDriver::new(dp.UARTE0);
    let mut timer = RtcTimer::new(dp.RTC0);
    let mut cpu = CortexMCpu::new(cp.SCB);
    let mut trigger = ButtonTrigger { button };

    unsafe {
        cortex_m::peripheral::NVIC::unmask(nrf52840_hal::pac::Interrupt::UARTE0_UART0);
        cortex_m::peripheral::NVIC::unmask(nrf52840_hal::pac::Interrupt::RTC0);
    }

    // an unbounded verify-retry budget reproduces the reference loop;
    // swap in `RetryPolicy { max_attempts: Some(n), .. }` to hand control
    // back to a watchdog after n failed attempts instead.
    let retry = RetryPolicy::unbounded(1000);

    match boot::run(&mut flash, &mut uart, &mut timer, &mut cpu, &mut trigger, &FLAGS, retry) {
        Ok(image_address) => {
            cpu.disable_interrupts();
            cpu.jump_to_image(image_address);
        }
        Err(_e) => loop {
            cortex_m::asm::bkpt();
        },
    }
}

#[interrupt]
fn UARTE0_UART0() {
    FLAGS.data_received.store(true, Ordering::SeqCst);
}

#[interrupt]
fn RTC0() {
    unsafe {
        (*RTC0::ptr()).events_compare[0].write(|w| w.bits(0));
    }
    FLAGS.upgrade_timeout.store(true, Ordering::SeqCst);
}

#[cfg(not(feature = "panic-probe"))]
#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {
        cortex_m::asm::bkpt();
    }
}
