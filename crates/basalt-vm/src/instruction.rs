use serde::Deserialize;

/// Register a slot offset is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reg {
    Ap,
    Fp,
}

/// A memory cell addressed relative to a register: `[reg + off]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Slot {
    pub reg: Reg,
    pub off: i32,
}

impl Slot {
    pub fn ap(off: i32) -> Self {
        Self { reg: Reg::Ap, off }
    }

    pub fn fp(off: i32) -> Self {
        Self { reg: Reg::Fp, off }
    }
}

/// The machine's instruction set.
///
/// Word arithmetic wraps mod 2^128. Address-plus-word bumps the offset and
/// faults on overflow; any other operand mix is a type fault. `call`/`ret`
/// implement the calling convention the entry frame is built for: `call`
/// saves `[fp, return pc]` at `[ap]`, `ret` jumps through `[fp - 1]` and
/// restores the caller's frame pointer from `[fp - 2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instruction {
    /// `[dst] = imm`
    StoreImm { dst: Slot, imm: u64 },
    /// `[dst] = [src]`
    Mov { dst: Slot, src: Slot },
    /// `[dst] = [a] + [b]`
    Add { dst: Slot, a: Slot, b: Slot },
    /// `[dst] = [src] + imm`
    AddImm { dst: Slot, src: Slot, imm: u64 },
    /// `[[ptr] + index] = [src]` — store through a pointer held in memory.
    StoreVia { ptr: Slot, index: u32, src: Slot },
    /// `[dst] = [[ptr] + index]`
    LoadVia { dst: Slot, ptr: Slot, index: u32 },
    /// `ap = ap + delta`
    AddAp { delta: i32 },
    /// Save the frame and jump to the code offset `target`.
    Call { target: usize },
    /// Return to the caller recorded by `call` (or to the halt sentinel for
    /// the entry frame).
    Ret,
    /// Absolute jump within the code segment.
    Jmp { target: usize },
}
