//! Entry-point invocation and relocation driver.
//!
//! Given a compiled program and the declared signature of its entry
//! function, the driver derives the required builtins and implicit
//! parameters, builds the entry stack in the machine's calling convention,
//! steps the machine to the halt sentinel, and relocates segmented memory
//! into one linear image for the report consumer.

mod driver;
mod frame;
mod relocate;
mod report;
mod signature;

pub use driver::{
    ActiveRun, HaltedRun, Layout, RelocatedRun, Runner, RunnerConfig, DEFAULT_MAX_STEPS,
};
pub use frame::{build_entry_frame, EntryFrame, FrameError};
pub use relocate::{relocate_memory, relocate_value, relocation_table, RelocationError};
pub use report::{memory_digest, MemoryCell, RunReport};
pub use signature::{
    find_entry, load_interface, normalize_param_name, FuncDecl, ImplicitArg, InterfaceDoc,
    SignatureError,
};
