use serde::Serialize;
use sha2::{Digest as _, Sha256};

use basalt_contracts::BASALT_RUN_REPORT_SCHEMA_VERSION;
use basalt_vm::BuiltinStats;

use crate::driver::{Layout, RelocatedRun};
use crate::signature::FuncDecl;

/// Machine-readable run report handed to the external consumer.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub schema_version: String,
    pub ok: bool,
    pub entry: String,
    pub entry_point: usize,
    pub layout: &'static str,
    pub steps: u64,
    pub padded_steps: u64,
    pub builtins: Vec<BuiltinStats>,
    pub relocation_table: Vec<usize>,
    pub memory: Vec<MemoryCell>,
    pub memory_sha256: String,
    pub trap: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryCell {
    pub address: usize,
    pub value: String,
}

impl RunReport {
    pub fn success(entry: &FuncDecl, layout: Layout, run: &RelocatedRun) -> Self {
        Self {
            schema_version: BASALT_RUN_REPORT_SCHEMA_VERSION.to_string(),
            ok: true,
            entry: entry.name.clone(),
            entry_point: entry.entry_point,
            layout: layout.as_str(),
            steps: run.steps,
            padded_steps: run.padded_steps,
            builtins: run.builtin_stats.clone(),
            relocation_table: run.table.clone(),
            memory: run
                .memory
                .iter()
                .map(|(address, value)| MemoryCell {
                    address: *address,
                    value: hex_word(*value),
                })
                .collect(),
            memory_sha256: memory_digest(&run.memory),
            trap: None,
        }
    }

    pub fn fault(entry: &FuncDecl, layout: Layout, trap: String) -> Self {
        Self {
            schema_version: BASALT_RUN_REPORT_SCHEMA_VERSION.to_string(),
            ok: false,
            entry: entry.name.clone(),
            entry_point: entry.entry_point,
            layout: layout.as_str(),
            steps: 0,
            padded_steps: 0,
            builtins: Vec::new(),
            relocation_table: Vec::new(),
            memory: Vec::new(),
            memory_sha256: String::new(),
            trap: Some(trap),
        }
    }
}

pub fn hex_word(value: u128) -> String {
    format!("{value:#x}")
}

/// Digest of the relocated image: one `address:value` line per cell, so two
/// runs can be compared without shipping the full image.
pub fn memory_digest(cells: &[(usize, u128)]) -> String {
    let mut hasher = Sha256::new();
    for (address, value) in cells {
        hasher.update(format!("{address}:{value:#x}\n").as_bytes());
    }
    hex_lower(hasher.finalize().as_slice())
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize]);
        out.push(HEX[(b & 0x0f) as usize]);
    }
    String::from_utf8(out).unwrap_or_default()
}
