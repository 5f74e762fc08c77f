//! # Cortex-M4 Port Layer
//!
//! Context switching for the ARM Cortex-M4 (Thumb-2). Threads never leave
//! Thread mode: a switch is an ordinary function call that pushes the AAPCS
//! callee-saved registers (R4-R11, LR) onto the running stack, swaps SP and
//! pops the other side's registers, returning into it through PC.
//!
//! On hard-float targets (`eabihf`) S16-S31 are callee-saved as well and
//! are stacked below the core registers.
//!
//! ## Saved frame (low address first)
//!
//! ```text
//! [S16..S31]      16 words, eabihf only
//! R3              padding, keeps the frame 8-byte aligned
//! R4 .. R11       8 words
//! PC              return address (LR at switch time)
//! ```

use core::arch::naked_asm;

use super::{align_down, Context, EntryFn};

#[cfg(target_abi = "eabihf")]
const FPU_WORDS: usize = 16;
#[cfg(not(target_abi = "eabihf"))]
const FPU_WORDS: usize = 0;

const CORE_WORDS: usize = 10;

// ---------------------------------------------------------------------------
// Context switch
// ---------------------------------------------------------------------------

/// Save the running context into `from` and resume `to`.
///
/// # Safety
/// `to` must hold a context written by a previous `switch` or by
/// [`init_stack`], and must not have been resumed since. Both pointers must
/// stay valid until the saved side is resumed.
#[cfg(not(target_abi = "eabihf"))]
#[unsafe(naked)]
pub unsafe extern "C" fn switch(from: *mut Context, to: *const Context) {
    naked_asm!(
        "push {{r3-r11, lr}}",
        "mov r2, sp",
        "str r2, [r0]",
        "ldr r2, [r1]",
        "mov sp, r2",
        "pop {{r3-r11, pc}}",
    );
}

/// Save the running context into `from` and resume `to`.
///
/// # Safety
/// See the soft-float variant.
#[cfg(target_abi = "eabihf")]
#[unsafe(naked)]
pub unsafe extern "C" fn switch(from: *mut Context, to: *const Context) {
    naked_asm!(
        "push {{r3-r11, lr}}",
        "vpush {{s16-s31}}",
        "mov r2, sp",
        "str r2, [r0]",
        "ldr r2, [r1]",
        "mov sp, r2",
        "vpop {{s16-s31}}",
        "pop {{r3-r11, pc}}",
    );
}

// ---------------------------------------------------------------------------
// Fresh stack launch
// ---------------------------------------------------------------------------

/// First code executed on a fresh stack: R4 holds the argument and R5 the
/// entry point. `udf` traps if the entry ever returns.
#[unsafe(naked)]
unsafe extern "C" fn start_thunk() -> ! {
    naked_asm!("mov r0, r4", "blx r5", "udf #0");
}

/// Build the initial frame on the stack ending at `stack_top`.
///
/// ```text
/// [FPU block]    zeroed (eabihf only)
/// R3             0
/// R4             arg
/// R5             entry
/// R6 .. R11      0
/// PC             start_thunk (Thumb bit set by the linker)
/// ```
///
/// # Safety
/// `stack_top` must be one past the end of a writable region large enough
/// for the frame plus whatever `entry` uses, and `ctx` must be valid.
pub unsafe fn init_stack(ctx: *mut Context, stack_top: *mut u8, entry: EntryFn, arg: *mut u8) {
    // Align to 8 bytes (AAPCS requirement)
    let top = align_down(stack_top as usize, 8);
    let words = FPU_WORDS + CORE_WORDS;
    let frame = (top - words * 4) as *mut u32;

    unsafe {
        for i in 0..words {
            *frame.add(i) = 0;
        }
        *frame.add(FPU_WORDS + 1) = arg as u32; // R4
        *frame.add(FPU_WORDS + 2) = entry as *const () as u32; // R5
        *frame.add(FPU_WORDS + 9) = start_thunk as *const () as u32; // PC

        (*ctx).sp = frame as usize;
    }
}
