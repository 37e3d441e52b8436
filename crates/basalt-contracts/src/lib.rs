//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings
//! that appear in machine-readable I/O.

pub const BASALT_PROGRAM_SCHEMA_VERSION: &str = "basalt.program@0.1.0";
pub const BASALT_INTERFACE_SCHEMA_VERSION: &str = "basalt.interface@0.1.0";
pub const BASALT_RUN_REPORT_SCHEMA_VERSION: &str = "basalt.run.report@0.1.0";
