//! # AArch64 Port
//!
//! AAPCS64 callee-saved state is `x19`-`x28`, the frame pointer `x29`, the
//! link register `x30` and the low halves of `v8`-`v15`. `switch` stores
//! them in a 160-byte frame below the running `sp`.

use core::arch::naked_asm;

use super::{align_down, Context, EntryFn};

const FRAME_WORDS: usize = 20;

/// Save the running context into `from` and resume `to`.
///
/// # Safety
/// `to` must hold a context written by a previous `switch` or by
/// [`init_stack`], and must not have been resumed since. Both pointers must
/// stay valid until the saved side is resumed.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(from: *mut Context, to: *const Context) {
    naked_asm!(
        "sub sp, sp, #160",
        "stp x19, x20, [sp, #0]",
        "stp x21, x22, [sp, #16]",
        "stp x23, x24, [sp, #32]",
        "stp x25, x26, [sp, #48]",
        "stp x27, x28, [sp, #64]",
        "stp x29, x30, [sp, #80]",
        "stp d8, d9, [sp, #96]",
        "stp d10, d11, [sp, #112]",
        "stp d12, d13, [sp, #128]",
        "stp d14, d15, [sp, #144]",
        "mov x9, sp",
        "str x9, [x0]",
        "ldr x9, [x1]",
        "mov sp, x9",
        "ldp x19, x20, [sp, #0]",
        "ldp x21, x22, [sp, #16]",
        "ldp x23, x24, [sp, #32]",
        "ldp x25, x26, [sp, #48]",
        "ldp x27, x28, [sp, #64]",
        "ldp x29, x30, [sp, #80]",
        "ldp d8, d9, [sp, #96]",
        "ldp d10, d11, [sp, #112]",
        "ldp d12, d13, [sp, #128]",
        "ldp d14, d15, [sp, #144]",
        "add sp, sp, #160",
        "ret",
    );
}

/// First code executed on a fresh stack: `x19` holds the argument and `x20`
/// the entry point.
#[unsafe(naked)]
unsafe extern "C" fn start_thunk() -> ! {
    naked_asm!("mov x0, x19", "blr x20", "brk #1");
}

/// Build the initial frame on the stack ending at `stack_top`.
///
/// # Safety
/// `stack_top` must be one past the end of a writable region large enough
/// for the frame plus whatever `entry` uses, and `ctx` must be valid.
pub unsafe fn init_stack(ctx: *mut Context, stack_top: *mut u8, entry: EntryFn, arg: *mut u8) {
    let top = align_down(stack_top as usize, 16);
    let frame = (top - FRAME_WORDS * 8) as *mut usize;

    unsafe {
        for i in 0..FRAME_WORDS {
            *frame.add(i) = 0;
        }
        *frame.add(0) = arg as usize; // x19
        *frame.add(1) = entry as *const () as usize; // x20
        *frame.add(11) = start_thunk as *const () as usize; // x30

        (*ctx).sp = frame as usize;
    }
}
