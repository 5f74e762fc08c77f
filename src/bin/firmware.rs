//! # coopos Demo Firmware
//!
//! Runs the cooperative scheduler on an STM32F4 (Cortex-M4) with three
//! threads sharing a channel, a mutex and the SysTick clock:
//!
//! | Thread | Priority | Persistent | Behavior |
//! |--------|----------|------------|----------|
//! | `sampler` | 2 | no | Produces readings into a channel forever |
//! | `filter` | 1 | no | Drains the channel, updates a mutex-guarded average |
//! | `heartbeat` | 1 | yes | Waits one period, toggles a flag, finishes and is restarted |
//!
//! Build with `cargo build --release --features firmware --target thumbv7em-none-eabihf`.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::rc::Rc;
use core::cell::Cell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::{entry, exception};
use linked_list_allocator::LockedHeap;
use panic_halt as _;

use coopos::{Channel, Mutex, Scheduler, ThreadConfig, ThreadContext};

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// SysTick frequency in Hz.
const TICK_HZ: u32 = 1000;

const HEAP_SIZE: usize = 32 * 1024;
const HEARTBEAT_PERIOD_TICKS: u32 = 500;

#[global_allocator]
static HEAP: LockedHeap = LockedHeap::empty();

static TICKS: AtomicU32 = AtomicU32::new(0);

#[exception]
fn SysTick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    syst.set_reload(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Yield until `ticks` SysTicks have passed. The whole wait is one step.
fn sleep(cx: &ThreadContext<'_>, ticks: u32) {
    let start = TICKS.load(Ordering::Relaxed);
    let _quiet = cx.implicit();
    while TICKS.load(Ordering::Relaxed).wrapping_sub(start) < ticks {
        cx.yield_now();
    }
}

#[entry]
fn main() -> ! {
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    // cortex-m-rt hands `#[entry]` statics out as `&'static mut` exactly once
    HEAP.lock().init_from_slice(HEAP_MEM);

    let Some(mut cp) = cortex_m::Peripherals::take() else {
        loop {
            cortex_m::asm::wfi();
        }
    };
    configure_systick(&mut cp.SYST);

    let scheduler = Scheduler::new();
    let Ok(readings) = Channel::<u16>::new(4) else {
        loop {
            cortex_m::asm::wfi();
        }
    };
    let readings = Rc::new(readings);
    let average = Rc::new(Cell::new(0u32));
    let guard = Rc::new(Mutex::new());
    let beat = Rc::new(Cell::new(false));

    let tx = readings.clone();
    let sampler = scheduler.spawn(ThreadConfig::new().priority(2), move |cx| {
        let mut sample: u16 = 0;
        loop {
            sample = sample.wrapping_mul(75).wrapping_add(74);
            tx.write(cx, sample % 1024);
            sleep(cx, 10);
        }
    });

    let (rx, avg, lock) = (readings.clone(), average.clone(), guard.clone());
    let filter = scheduler.spawn(ThreadConfig::new(), move |cx| loop {
        let value = rx.read(cx) as u32;
        lock.lock(cx);
        avg.set((avg.get() * 7 + value) / 8);
        lock.unlock(cx);
    });

    let flag = beat.clone();
    let heartbeat = scheduler.spawn(ThreadConfig::new().persistent(true), move |cx| {
        sleep(cx, HEARTBEAT_PERIOD_TICKS);
        flag.set(!flag.get());
    });

    if sampler.is_err() || filter.is_err() || heartbeat.is_err() {
        loop {
            cortex_m::asm::wfi();
        }
    }

    scheduler.run()
}
