//! # x86_64 (System V) Port
//!
//! Callee-saved state under the SysV ABI is `rbx`, `rbp`, `r12`-`r15`, the
//! MXCSR control bits and the x87 control word. `switch` pushes all of it on
//! the running stack and stores `rsp` into the outgoing context.
//!
//! ## Saved frame (low address first)
//!
//! ```text
//! [rsp + 0]   MXCSR (32 bits) | x87 CW (16 bits)
//! [rsp + 8]   r15
//! [rsp + 16]  r14
//! [rsp + 24]  r13
//! [rsp + 32]  r12
//! [rsp + 40]  rbx
//! [rsp + 48]  rbp
//! [rsp + 56]  return address
//! ```

use core::arch::naked_asm;

use super::{align_down, Context, EntryFn};

const FRAME_WORDS: usize = 8;

/// Default MXCSR (all exceptions masked, round to nearest).
const MXCSR_DEFAULT: usize = 0x1F80;
/// Default x87 control word (extended precision, all exceptions masked).
const FPU_CW_DEFAULT: usize = 0x037F;

/// Save the running context into `from` and resume `to`.
///
/// # Safety
/// `to` must hold a context written by a previous `switch` or by
/// [`init_stack`], and must not have been resumed since. Both pointers must
/// stay valid until the saved side is resumed.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(from: *mut Context, to: *const Context) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "sub rsp, 8",
        "stmxcsr dword ptr [rsp]",
        "fnstcw word ptr [rsp + 4]",
        "mov [rdi], rsp",
        "mov rsp, [rsi]",
        "ldmxcsr dword ptr [rsp]",
        "fldcw word ptr [rsp + 4]",
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    );
}

/// First code executed on a fresh stack: `rbx` holds the argument and
/// `r12` the entry point, both placed there by [`init_stack`].
#[unsafe(naked)]
unsafe extern "C" fn start_thunk() -> ! {
    naked_asm!("mov rdi, rbx", "call r12", "ud2");
}

/// Build the initial frame on the stack ending at `stack_top`.
///
/// # Safety
/// `stack_top` must be one past the end of a writable region large enough
/// for the frame plus whatever `entry` uses, and `ctx` must be valid.
pub unsafe fn init_stack(ctx: *mut Context, stack_top: *mut u8, entry: EntryFn, arg: *mut u8) {
    // After `ret` pops the thunk address, rsp is 16-byte aligned, so the
    // thunk's `call` enters `entry` with the alignment the ABI expects.
    let top = align_down(stack_top as usize, 16);
    let frame = (top - FRAME_WORDS * 8) as *mut usize;

    unsafe {
        *frame.add(0) = MXCSR_DEFAULT | (FPU_CW_DEFAULT << 32);
        *frame.add(1) = 0; // r15
        *frame.add(2) = 0; // r14
        *frame.add(3) = 0; // r13
        *frame.add(4) = entry as *const () as usize; // r12
        *frame.add(5) = arg as usize; // rbx
        *frame.add(6) = 0; // rbp
        *frame.add(7) = start_thunk as *const () as usize;

        (*ctx).sp = frame as usize;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn park(_arg: *mut u8) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    #[test]
    fn test_initial_frame() {
        let mut stack = [0usize; 64];
        let mut ctx = Context::empty();
        unsafe {
            let top = stack.as_mut_ptr().add(stack.len()) as *mut u8;
            init_stack(&mut ctx, top, park, 0x40 as *mut u8);
        }

        // rsp lands 16-byte aligned once `ret` pops the thunk address
        assert_eq!((ctx.sp + FRAME_WORDS * 8) % 16, 0);
        let frame = ctx.sp as *const usize;
        unsafe {
            assert_eq!(*frame.add(4), park as *const () as usize);
            assert_eq!(*frame.add(5), 0x40);
            assert_eq!(*frame.add(7), start_thunk as *const () as usize);
        }
    }
}
