//! nRF52840 driver façades: NVMC-backed flash and the boot-time CPU
//! control transfer, wired to the `bootcore` traits the core consumes.

#![no_std]

use bootcore::constants::FLASH_SIZE;
use bootcore::flash::{FlashApi, FlashStatus};
use bootcore::traits::{Cpu, Timer, Uart};

use nrf52840_hal::pac::{NVMC, RTC0, UARTE0};

const NVMC_PAGE_SIZE: u32 = 4096;

/// Stack-pointer bounds sanity-checked before a jump (spec §4.5
/// "irreversible control transfer").
const STACK_LOW: u32 = 0x2000_0000;
const STACK_HIGH: u32 = 0x2004_0000;

pub struct FlashWriterEraser {
    pub nvmc: NVMC,
}

impl FlashWriterEraser {
    pub fn new(nvmc: NVMC) -> Self {
        FlashWriterEraser { nvmc }
    }
}

impl FlashApi for FlashWriterEraser {
    fn prepare(&mut self, _start_block: u32, _end_block: u32) -> FlashStatus {
        // nRF52840's NVMC has no lock/unlock sequence to wait out.
        FlashStatus::Success
    }

    fn erase(&mut self, start_block: u32, end_block: u32) -> FlashStatus {
        let start = bootcore::flash::base_of(start_block) as u32;
        let end = bootcore::flash::base_of(end_block + 1) as u32;

        let mut addr = start;
        while addr < end {
            self.nvmc.config.write(|w| w.wen().een());
            while self.nvmc.readynext.read().readynext().is_busy() {}
            self.nvmc
                .erasepage()
                .write(|w| unsafe { w.erasepage().bits(addr) });
            while self.nvmc.ready.read().ready().is_busy() {}
            addr += NVMC_PAGE_SIZE;
        }
        self.nvmc.config.write(|w| w.wen().ren());
        FlashStatus::Success
    }

    fn write(&mut self, address: usize, bytes: &[u8], len: usize) -> FlashStatus {
        if !bootcore::flash::is_legal_write_len(len) || address % len != 0 {
            return FlashStatus::Failure;
        }

        let mut idx = 0usize;
        while idx < len {
            self.nvmc.config.write(|w| w.wen().wen());
            while self.nvmc.readynext.read().readynext().is_busy() {}

            if len - idx >= 4 && (address + idx) % 4 == 0 {
                let word = u32::from_le_bytes(bytes[idx..idx + 4].try_into().unwrap());
                unsafe {
                    core::ptr::write_volatile((address + idx) as *mut u32, word);
                }
                idx += 4;
            } else {
                // sub-word write: read-modify-write the containing word,
                // since NVMC only accepts 32-bit stores.
                let word_addr = (address + idx) & !0x3;
                let offset = (address + idx) - word_addr;
                let word = unsafe { core::ptr::read_volatile(word_addr as *const u32) };
                let mut word_bytes = word.to_le_bytes();
                word_bytes[offset] = bytes[idx];
                let word = u32::from_le_bytes(word_bytes);
                unsafe {
                    core::ptr::write_volatile(word_addr as *mut u32, word);
                }
                idx += 1;
            }
            while self.nvmc.ready.read().ready().is_busy() {}
        }
        self.nvmc.config.write(|w| w.wen().ren());
        FlashStatus::Success
    }

    fn size(&self) -> u32 {
        FLASH_SIZE as u32
    }
}

pub struct CortexMCpu {
    pub scb: nrf52840_hal::pac::SCB,
}

impl CortexMCpu {
    pub fn new(scb: nrf52840_hal::pac::SCB) -> Self {
        CortexMCpu { scb }
    }
}

impl Cpu for CortexMCpu {
    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn enable_interrupts(&mut self) {
        unsafe { cortex_m::interrupt::enable() };
    }

    /// Sets the vector table base to the image's own, loads its initial
    /// stack pointer and branches to its reset handler. Does not return
    /// (spec §4.5 step 4).
    #[rustfmt::skip]
    fn jump_to_image(&mut self, address: usize) -> ! {
        unsafe {
            let stack_pointer = *(address as *const u32);
            let reset_vector = *((address + 4) as *const u32);
            assert!(stack_pointer >= STACK_LOW && stack_pointer < STACK_HIGH);

            let jump: extern "C" fn() -> ! = core::mem::transmute(reset_vector as usize);

            cortex_m::asm::dsb();
            cortex_m::asm::isb();
            self.scb.vtor.write(address as u32);
            cortex_m::register::msp::write(stack_pointer);
            jump()
        }
    }

    fn get_cpu_frequency_hz(&self) -> u32 {
        // nRF52840 HFCLK, crystal-sourced.
        64_000_000
    }
}

/// EasyDMA-driven, interrupt-free polling UART (spec §5: the core only
/// ever sees the `dataReceived` flag set from interrupt context; this
/// driver's `receive` is the non-blocking drain the main loop calls once
/// that flag is observed).
pub struct UarteDriver {
    uarte: UARTE0,
    rx_buf: [u8; 256],
}

impl UarteDriver {
    pub fn new(uarte: UARTE0) -> Self {
        let mut driver = UarteDriver {
            uarte,
            rx_buf: [0u8; 256],
        };
        driver.start_rx();
        driver
    }

    fn start_rx(&mut self) {
        let ptr = self.rx_buf.as_mut_ptr();
        let len = self.rx_buf.len() as u16;
        self.uarte.rxd.ptr.write(|w| unsafe { w.ptr().bits(ptr as u32) });
        self.uarte.rxd.maxcnt.write(|w| unsafe { w.maxcnt().bits(len) });
        self.uarte.events_endrx.write(|w| unsafe { w.bits(0) });
        self.uarte.tasks_startrx.write(|w| unsafe { w.bits(1) });
    }
}

impl Uart for UarteDriver {
    fn receive(&mut self, buf: &mut [u8]) -> i32 {
        if self.uarte.events_endrx.read().bits() == 0 {
            return 0;
        }
        let amount = self.uarte.rxd.amount.read().amount().bits() as usize;
        let n = amount.min(buf.len());
        buf[..n].copy_from_slice(&self.rx_buf[..n]);
        self.start_rx();
        n as i32
    }

    fn send(&mut self, buf: &[u8]) {
        self.uarte.txd.ptr.write(|w| unsafe { w.ptr().bits(buf.as_ptr() as u32) });
        self.uarte
            .txd
            .maxcnt
            .write(|w| unsafe { w.maxcnt().bits(buf.len() as u16) });
        self.uarte.events_endtx.write(|w| unsafe { w.bits(0) });
        self.uarte.tasks_starttx.write(|w| unsafe { w.bits(1) });
        while self.uarte.events_endtx.read().bits() == 0 {}
        self.uarte.tasks_stoptx.write(|w| unsafe { w.bits(1) });
    }
}

const RTC_TICKS_PER_SEC: u32 = 32_768;

/// Inactivity timer backed by RTC0's compare-0 channel, running off LFCLK.
pub struct RtcTimer {
    rtc: RTC0,
}

impl RtcTimer {
    pub fn new(rtc: RTC0) -> Self {
        rtc.tasks_start.write(|w| unsafe { w.bits(1) });
        RtcTimer { rtc }
    }
}

impl Timer for RtcTimer {
    fn start(&mut self, timeout_ms: u32) {
        let ticks = (timeout_ms as u64 * RTC_TICKS_PER_SEC as u64 / 1000) as u32;
        let counter = self.rtc.counter.read().counter().bits();
        let target = counter.wrapping_add(ticks) & 0x00FF_FFFF;

        self.rtc.events_compare[0].write(|w| unsafe { w.bits(0) });
        self.rtc.cc[0].write(|w| unsafe { w.compare().bits(target) });
        self.rtc.evtenset.write(|w| w.compare0().set_bit());
        self.rtc.intenset.write(|w| w.compare0().set_bit());
    }
}
