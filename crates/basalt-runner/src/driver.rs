use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;

use basalt_vm::{
    canonical_builtin_list, Addr, BuiltinError, BuiltinId, BuiltinRunner, BuiltinStats,
    ExecutionFault, Memory, Program, TraceEntry, Value, Vm, BUILTIN_ORDER,
};

use crate::frame::{build_entry_frame, FrameError};
use crate::relocate::{relocate_memory, relocation_table, RelocationError};
use crate::signature::FuncDecl;

pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

/// Which builtin runners the machine instance carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum Layout {
    /// Everything except the keccak unit and the wide range-check variant.
    Core,
    /// All builtins.
    Extended,
}

const CORE_BUILTINS: &[BuiltinId] = &[
    BuiltinId::Output,
    BuiltinId::Pedersen,
    BuiltinId::RangeCheck,
    BuiltinId::Ecdsa,
    BuiltinId::Bitwise,
    BuiltinId::EcOp,
    BuiltinId::Poseidon,
];

impl Layout {
    pub fn builtin_ids(self) -> &'static [BuiltinId] {
        match self {
            Layout::Core => CORE_BUILTINS,
            Layout::Extended => BUILTIN_ORDER,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Layout::Core => "core",
            Layout::Extended => "extended",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver-selection knobs, fixed at initialization time.
#[derive(Debug, Clone, Copy)]
pub struct RunnerConfig {
    pub layout: Layout,
    pub allow_missing_builtins: bool,
    pub disable_trace_padding: bool,
    /// External liveness guard; a run exceeding it faults.
    pub max_steps: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Extended,
            allow_missing_builtins: false,
            disable_trace_padding: false,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// An initialized machine: program bound, builtin list canonicalized, code
/// and execution segments created, builtin runners live. Nothing has
/// executed yet.
#[derive(Debug)]
pub struct Runner {
    program: Program,
    config: RunnerConfig,
    memory: Memory,
    code_base: Addr,
    exec_base: Addr,
    builtins: BTreeMap<BuiltinId, BuiltinRunner>,
}

impl Runner {
    /// Bind a program. The declared builtin list is rewritten into canonical
    /// order; builtins outside the layout are an error in strict mode and
    /// dropped in permissive mode.
    pub fn new(mut program: Program, config: RunnerConfig) -> Result<Self, FrameError> {
        let declared = match canonical_builtin_list(&program.builtins, config.allow_missing_builtins)
        {
            Ok(ids) => ids,
            Err(BuiltinError::UnknownName { name }) => {
                return Err(FrameError::UnknownBuiltin { name })
            }
            Err(other) => {
                return Err(FrameError::UnknownBuiltin {
                    name: other.to_string(),
                })
            }
        };

        let layout = config.layout.builtin_ids();
        let mut active = Vec::with_capacity(declared.len());
        for id in declared {
            if layout.contains(&id) {
                active.push(id);
            } else if !config.allow_missing_builtins {
                return Err(FrameError::MissingBuiltin { id });
            }
        }
        program.builtins = active.iter().map(|id| id.as_str().to_string()).collect();

        let mut memory = Memory::new();
        let code_base = memory.add_segment_of(program.data.len());
        let exec_base = memory.add_segment();
        let builtins = active
            .into_iter()
            .map(|id| (id, BuiltinRunner::new(id, &mut memory)))
            .collect();

        Ok(Self {
            program,
            config,
            memory,
            code_base,
            exec_base,
            builtins,
        })
    }

    pub fn builtin_names(&self) -> &[String] {
        &self.program.builtins
    }

    pub fn segment_count(&self) -> usize {
        self.memory.segment_count()
    }

    /// Build the entry frame for `entry` and hand the machine over to the
    /// running phase: pc at the entry offset, ap and fp at the top of the
    /// constructed stack, terminal pc at the halt sentinel.
    pub fn start(mut self, entry: &FuncDecl) -> Result<ActiveRun, FrameError> {
        let args = entry.implicit_args();
        let frame = build_entry_frame(
            &args,
            &self.builtins,
            entry.needs_output(),
            self.config.allow_missing_builtins,
            &mut self.memory,
        )?;
        let top = self.memory.load(self.exec_base, &frame.stack)?;
        let pc = Addr::new(self.code_base.segment, self.code_base.offset + entry.entry_point);
        let vm = Vm::new(self.memory, self.code_base, self.program.data, pc, top);
        Ok(ActiveRun {
            vm,
            halt: frame.halt,
            stack: frame.stack,
            builtins: self.builtins,
            config: self.config,
        })
    }
}

/// A machine mid-run (or about to run). Consumed by `run`.
#[derive(Debug)]
pub struct ActiveRun {
    vm: Vm,
    halt: Addr,
    stack: Vec<Value>,
    builtins: BTreeMap<BuiltinId, BuiltinRunner>,
    config: RunnerConfig,
}

impl ActiveRun {
    /// The entry stack, as constructed by the frame builder.
    pub fn initial_stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn halt_addr(&self) -> Addr {
        self.halt
    }

    pub fn builtin_base(&self, id: BuiltinId) -> Option<Addr> {
        self.builtins.get(&id).map(BuiltinRunner::base)
    }

    /// Step to the halt sentinel, then finalize: validate every builtin
    /// segment once and pad the trace once. Any fault abandons the run; a
    /// faulted run cannot reach relocation.
    pub fn run(mut self) -> Result<HaltedRun, ExecutionFault> {
        let steps = self.vm.run_until(self.halt, self.config.max_steps)?;

        let mut builtin_stats = Vec::with_capacity(self.builtins.len());
        for runner in self.builtins.values() {
            builtin_stats.push(runner.finalize(self.vm.memory())?);
        }

        let padded_steps = if self.config.disable_trace_padding {
            steps
        } else {
            self.vm.pad_trace()
        };

        let (memory, trace) = self.vm.into_parts();
        Ok(HaltedRun {
            memory,
            trace,
            steps,
            padded_steps,
            builtin_stats,
        })
    }
}

/// A run that reached the halt sentinel and passed builtin finalization.
/// The only way forward is relocation, which consumes it.
#[derive(Debug)]
pub struct HaltedRun {
    memory: Memory,
    trace: Vec<TraceEntry>,
    steps: u64,
    padded_steps: u64,
    builtin_stats: Vec<BuiltinStats>,
}

impl HaltedRun {
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn padded_steps(&self) -> u64 {
        self.padded_steps
    }

    pub fn builtin_stats(&self) -> &[BuiltinStats] {
        &self.builtin_stats
    }

    /// Collapse segmented memory into one linear address space.
    pub fn relocate(self) -> Result<RelocatedRun, RelocationError> {
        let table = relocation_table(&self.memory.segment_sizes());
        let memory = relocate_memory(&self.memory, &table)?;
        Ok(RelocatedRun {
            table,
            memory,
            steps: self.steps,
            padded_steps: self.padded_steps,
            builtin_stats: self.builtin_stats,
        })
    }
}

/// Final product of a run: the relocation table and the flattened,
/// gap-free view of every written cell.
#[derive(Debug)]
pub struct RelocatedRun {
    pub table: Vec<usize>,
    pub memory: Vec<(usize, u128)>,
    pub steps: u64,
    pub padded_steps: u64,
    pub builtin_stats: Vec<BuiltinStats>,
}
