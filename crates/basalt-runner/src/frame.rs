use std::collections::BTreeMap;
use std::fmt;

use basalt_vm::{ordered_subset, Addr, BuiltinId, BuiltinRunner, Memory, MemoryError, Value};

use crate::signature::ImplicitArg;

/// The activation record assembled for the entry function, plus the two
/// synthetic addresses the driver needs afterwards.
#[derive(Debug)]
pub struct EntryFrame {
    pub stack: Vec<Value>,
    pub return_fp: Addr,
    pub halt: Addr,
}

#[derive(Debug)]
pub enum FrameError {
    /// The signature requires a builtin with no active runner (strict mode).
    MissingBuiltin { id: BuiltinId },
    /// The program declares a builtin name the registry does not recognize
    /// (strict mode).
    UnknownBuiltin { name: String },
    Memory(MemoryError),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MissingBuiltin { id } => {
                write!(f, "entry signature requires builtin {id}, which has no active runner")
            }
            FrameError::UnknownBuiltin { name } => write!(f, "unknown builtin {name:?}"),
            FrameError::Memory(err) => write!(f, "entry stack write failed: {err}"),
        }
    }
}

impl std::error::Error for FrameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameError::Memory(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MemoryError> for FrameError {
    fn from(err: MemoryError) -> Self {
        FrameError::Memory(err)
    }
}

/// Assemble the entry stack:
/// builtin contributions, then a gas segment per `gas` argument, then the
/// output segment base when the signature's arity requires one, then the
/// synthetic caller frame pointer, then the halt sentinel.
///
/// Builtin contributions always land in canonical builtin order, whatever
/// order the signature declares them in; the machine's layout checks assume
/// the canonical sequence. The output builtin never contributes through its
/// argument position — its base is placed by the arity check alone, reusing
/// the active output runner's segment when there is one. Unknown implicit
/// arguments are skipped. In strict mode a required builtin without an
/// active runner fails before any segment is allocated.
pub fn build_entry_frame(
    args: &[ImplicitArg],
    runners: &BTreeMap<BuiltinId, BuiltinRunner>,
    needs_output: bool,
    permissive: bool,
    memory: &mut Memory,
) -> Result<EntryFrame, FrameError> {
    if !permissive {
        for arg in args {
            if let ImplicitArg::Builtin(id) = arg {
                if !runners.contains_key(id) {
                    return Err(FrameError::MissingBuiltin { id: *id });
                }
            }
        }
    }

    let mut required: Vec<BuiltinId> = Vec::new();
    for arg in args {
        if let ImplicitArg::Builtin(id) = arg {
            if *id != BuiltinId::Output && runners.contains_key(id) && !required.contains(id) {
                required.push(*id);
            }
        }
    }
    let mut pending = ordered_subset(&required).into_iter();

    let mut stack = Vec::new();
    for arg in args {
        match arg {
            ImplicitArg::Builtin(BuiltinId::Output) => {}
            ImplicitArg::Builtin(id) => {
                if !runners.contains_key(id) {
                    // Permissive mode: the missing builtin contributes nothing.
                    continue;
                }
                if let Some(next) = pending.next() {
                    if let Some(runner) = runners.get(&next) {
                        stack.extend(runner.initial_stack());
                    }
                }
            }
            ImplicitArg::Gas => {
                let gas = memory.add_segment();
                stack.push(Value::Addr(gas));
            }
            ImplicitArg::Unknown(_) => {}
        }
    }

    if needs_output {
        let output = match runners.get(&BuiltinId::Output) {
            Some(runner) => runner.base(),
            None => memory.add_segment(),
        };
        stack.push(Value::Addr(output));
    }
    let return_fp = memory.add_segment();
    stack.push(Value::Addr(return_fp));
    let halt = memory.add_segment();
    stack.push(Value::Addr(halt));

    Ok(EntryFrame {
        stack,
        return_fp,
        halt,
    })
}
