use std::fmt;

use crate::builtins::BuiltinError;
use crate::instruction::{Instruction, Reg, Slot};
use crate::memory::{Memory, MemoryError};
use crate::value::{Addr, Value};

/// One step of the execution trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub pc: Addr,
    pub ap: Addr,
    pub fp: Addr,
}

#[derive(Debug)]
pub enum ExecutionFault {
    Memory(MemoryError),
    Builtin(BuiltinError),
    PcOutOfCode { pc: Addr, step: u64 },
    TypeMismatch {
        at: Addr,
        expected: &'static str,
        found: Value,
        step: u64,
    },
    AddrOverflow { base: Addr, delta: i64, step: u64 },
    StepLimit { limit: u64 },
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionFault::Memory(err) => write!(f, "memory fault: {err}"),
            ExecutionFault::Builtin(err) => write!(f, "builtin check failed: {err}"),
            ExecutionFault::PcOutOfCode { pc, step } => {
                write!(f, "pc {pc} left the code segment at step {step}")
            }
            ExecutionFault::TypeMismatch {
                at,
                expected,
                found,
                step,
            } => write!(
                f,
                "cell {at} holds {found} ({}), expected {expected}, at step {step}",
                found.kind()
            ),
            ExecutionFault::AddrOverflow { base, delta, step } => {
                write!(f, "address {base}{delta:+} out of segment at step {step}")
            }
            ExecutionFault::StepLimit { limit } => {
                write!(f, "step limit of {limit} steps exceeded")
            }
        }
    }
}

impl std::error::Error for ExecutionFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecutionFault::Memory(err) => Some(err),
            ExecutionFault::Builtin(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemoryError> for ExecutionFault {
    fn from(err: MemoryError) -> Self {
        ExecutionFault::Memory(err)
    }
}

impl From<BuiltinError> for ExecutionFault {
    fn from(err: BuiltinError) -> Self {
        ExecutionFault::Builtin(err)
    }
}

/// The machine proper: registers, code, memory, and the step loop.
///
/// `pc` addresses the code segment; `ap` (allocation pointer) and `fp`
/// (frame pointer) address the execution segment. The machine knows nothing
/// about entry frames or halting policy — the driver seeds the registers and
/// decides which pc terminates the run.
#[derive(Debug)]
pub struct Vm {
    memory: Memory,
    code_base: Addr,
    code: Vec<Instruction>,
    pc: Addr,
    ap: Addr,
    fp: Addr,
    steps: u64,
    trace: Vec<TraceEntry>,
}

impl Vm {
    pub fn new(memory: Memory, code_base: Addr, code: Vec<Instruction>, pc: Addr, top: Addr) -> Self {
        Self {
            memory,
            code_base,
            code,
            pc,
            ap: top,
            fp: top,
            steps: 0,
            trace: Vec::new(),
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Tear the machine down into its memory and trace, once stepping is
    /// over.
    pub fn into_parts(self) -> (Memory, Vec<TraceEntry>) {
        (self.memory, self.trace)
    }

    pub fn pc(&self) -> Addr {
        self.pc
    }

    pub fn ap(&self) -> Addr {
        self.ap
    }

    pub fn fp(&self) -> Addr {
        self.fp
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Step until `pc == terminal`, recording a trace entry per step.
    /// `max_steps` is the external liveness guard.
    pub fn run_until(&mut self, terminal: Addr, max_steps: u64) -> Result<u64, ExecutionFault> {
        while self.pc != terminal {
            if self.steps >= max_steps {
                return Err(ExecutionFault::StepLimit { limit: max_steps });
            }
            self.trace.push(TraceEntry {
                pc: self.pc,
                ap: self.ap,
                fp: self.fp,
            });
            let instruction = self.fetch()?;
            self.execute(instruction)?;
            self.steps += 1;
        }
        Ok(self.steps)
    }

    /// Extend the trace to the next power-of-two step count by repeating the
    /// final machine state. Returns the padded length.
    pub fn pad_trace(&mut self) -> u64 {
        let Some(last) = self.trace.last().copied() else {
            return 0;
        };
        let target = self.trace.len().next_power_of_two();
        while self.trace.len() < target {
            self.trace.push(last);
        }
        self.trace.len() as u64
    }

    fn fetch(&self) -> Result<Instruction, ExecutionFault> {
        if self.pc.segment != self.code_base.segment {
            return Err(ExecutionFault::PcOutOfCode {
                pc: self.pc,
                step: self.steps,
            });
        }
        let index = self
            .pc
            .offset
            .checked_sub(self.code_base.offset)
            .ok_or(ExecutionFault::PcOutOfCode {
                pc: self.pc,
                step: self.steps,
            })?;
        self.code
            .get(index)
            .copied()
            .ok_or(ExecutionFault::PcOutOfCode {
                pc: self.pc,
                step: self.steps,
            })
    }

    fn execute(&mut self, instruction: Instruction) -> Result<(), ExecutionFault> {
        let next_pc = Addr::new(self.pc.segment, self.pc.offset + 1);
        match instruction {
            Instruction::StoreImm { dst, imm } => {
                let at = self.slot_addr(dst)?;
                self.memory.write(at, Value::Word(imm as u128))?;
                self.pc = next_pc;
            }
            Instruction::Mov { dst, src } => {
                let value = self.read_slot(src)?;
                let at = self.slot_addr(dst)?;
                self.memory.write(at, value)?;
                self.pc = next_pc;
            }
            Instruction::Add { dst, a, b } => {
                let lhs = self.read_slot(a)?;
                let rhs = self.read_slot(b)?;
                let sum = self.add_values(lhs, rhs, self.slot_addr(b)?)?;
                let at = self.slot_addr(dst)?;
                self.memory.write(at, sum)?;
                self.pc = next_pc;
            }
            Instruction::AddImm { dst, src, imm } => {
                let lhs = self.read_slot(src)?;
                let sum = self.add_values(lhs, Value::Word(imm as u128), self.slot_addr(src)?)?;
                let at = self.slot_addr(dst)?;
                self.memory.write(at, sum)?;
                self.pc = next_pc;
            }
            Instruction::StoreVia { ptr, index, src } => {
                let target = self.pointer_target(ptr, index)?;
                let value = self.read_slot(src)?;
                self.memory.write(target, value)?;
                self.pc = next_pc;
            }
            Instruction::LoadVia { dst, ptr, index } => {
                let target = self.pointer_target(ptr, index)?;
                let value = self.memory.read(target)?;
                let at = self.slot_addr(dst)?;
                self.memory.write(at, value)?;
                self.pc = next_pc;
            }
            Instruction::AddAp { delta } => {
                self.ap = self.offset_addr(self.ap, delta as i64)?;
                self.pc = next_pc;
            }
            Instruction::Call { target } => {
                self.memory.write(self.ap, Value::Addr(self.fp))?;
                let ret_slot = self.offset_addr(self.ap, 1)?;
                self.memory.write(ret_slot, Value::Addr(next_pc))?;
                self.ap = self.offset_addr(self.ap, 2)?;
                self.fp = self.ap;
                self.pc = Addr::new(self.code_base.segment, self.code_base.offset + target);
            }
            Instruction::Ret => {
                let ret_pc_at = self.offset_addr(self.fp, -1)?;
                let ret_fp_at = self.offset_addr(self.fp, -2)?;
                let ret_pc = self.read_addr(ret_pc_at)?;
                let ret_fp = self.read_addr(ret_fp_at)?;
                self.pc = ret_pc;
                self.fp = ret_fp;
            }
            Instruction::Jmp { target } => {
                self.pc = Addr::new(self.code_base.segment, self.code_base.offset + target);
            }
        }
        Ok(())
    }

    fn slot_addr(&self, slot: Slot) -> Result<Addr, ExecutionFault> {
        let base = match slot.reg {
            Reg::Ap => self.ap,
            Reg::Fp => self.fp,
        };
        self.offset_addr(base, slot.off as i64)
    }

    fn offset_addr(&self, base: Addr, delta: i64) -> Result<Addr, ExecutionFault> {
        base.checked_add_signed(delta)
            .ok_or(ExecutionFault::AddrOverflow {
                base,
                delta,
                step: self.steps,
            })
    }

    fn read_slot(&self, slot: Slot) -> Result<Value, ExecutionFault> {
        let at = self.slot_addr(slot)?;
        Ok(self.memory.read(at)?)
    }

    fn read_addr(&self, at: Addr) -> Result<Addr, ExecutionFault> {
        let value = self.memory.read(at)?;
        value.as_addr().ok_or(ExecutionFault::TypeMismatch {
            at,
            expected: "addr",
            found: value,
            step: self.steps,
        })
    }

    fn pointer_target(&self, ptr: Slot, index: u32) -> Result<Addr, ExecutionFault> {
        let at = self.slot_addr(ptr)?;
        let base = self.read_addr(at)?;
        self.offset_addr(base, index as i64)
    }

    fn add_values(&self, lhs: Value, rhs: Value, at: Addr) -> Result<Value, ExecutionFault> {
        match (lhs, rhs) {
            (Value::Word(a), Value::Word(b)) => Ok(Value::Word(a.wrapping_add(b))),
            (Value::Addr(a), Value::Word(b)) => {
                let delta = i64::try_from(b).map_err(|_| ExecutionFault::AddrOverflow {
                    base: a,
                    delta: i64::MAX,
                    step: self.steps,
                })?;
                Ok(Value::Addr(self.offset_addr(a, delta)?))
            }
            (found, _) => Err(ExecutionFault::TypeMismatch {
                at,
                expected: "word or addr+word",
                found,
                step: self.steps,
            }),
        }
    }
}
