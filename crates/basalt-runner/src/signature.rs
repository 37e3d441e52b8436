use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use basalt_contracts::BASALT_INTERFACE_SCHEMA_VERSION;
use basalt_vm::BuiltinId;

/// Interface document: the declared signatures of a program's callable
/// functions, produced alongside the compiled program.
#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceDoc {
    pub schema_version: String,
    pub funcs: Vec<FuncDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    /// Offset of the function's first instruction in the code segment.
    pub entry_point: usize,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub returns: Vec<String>,
}

impl FuncDecl {
    pub fn implicit_args(&self) -> Vec<ImplicitArg> {
        self.params.iter().map(|raw| ImplicitArg::from_raw(raw)).collect()
    }

    /// An output buffer is synthesized exactly when the parameter and return
    /// counts differ.
    pub fn needs_output(&self) -> bool {
        self.params.len() != self.returns.len()
    }
}

pub fn load_interface(path: &Path) -> Result<InterfaceDoc> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read interface: {}", path.display()))?;
    let doc: InterfaceDoc = serde_json::from_str(&text)
        .with_context(|| format!("malformed interface document: {}", path.display()))?;
    if doc.schema_version != BASALT_INTERFACE_SCHEMA_VERSION {
        anyhow::bail!(
            "interface schema {:?} is not {:?}: {}",
            doc.schema_version,
            BASALT_INTERFACE_SCHEMA_VERSION,
            path.display()
        );
    }
    Ok(doc)
}

/// A normalized implicit parameter of an entry function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImplicitArg {
    Builtin(BuiltinId),
    /// The fuel meter: not a builtin, but still a stack-visible system
    /// resource backed by a fresh segment.
    Gas,
    /// Skipped when the frame is built; newer signature features the driver
    /// does not understand must not fail the run.
    Unknown(String),
}

impl ImplicitArg {
    pub fn from_raw(raw: &str) -> Self {
        let token = normalize_param_name(raw);
        if token == "gas" {
            return ImplicitArg::Gas;
        }
        match BuiltinId::from_token(&token) {
            Some(id) => ImplicitArg::Builtin(id),
            None => ImplicitArg::Unknown(token),
        }
    }
}

/// Canonicalize a declared parameter name: camel-case word boundaries become
/// underscores, everything is lowercased, and a trailing `_builtin` marker is
/// stripped. Pure and idempotent.
pub fn normalize_param_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    for (i, c) in raw.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    match out.strip_suffix("_builtin") {
        Some(stripped) => stripped.to_string(),
        None => out,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    EntryNotFound { marker: String },
    AmbiguousEntry { marker: String, matches: Vec<String> },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureError::EntryNotFound { marker } => {
                write!(f, "no function name contains the entry marker {marker:?}")
            }
            SignatureError::AmbiguousEntry { marker, matches } => write!(
                f,
                "entry marker {marker:?} is ambiguous, matches {matches:?}"
            ),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Select the entry function: exactly one declared function whose name
/// contains `marker`. Multiple matches are ambiguous, never resolved
/// silently.
pub fn find_entry<'a>(doc: &'a InterfaceDoc, marker: &str) -> Result<&'a FuncDecl, SignatureError> {
    let mut candidates = doc.funcs.iter().filter(|f| f.name.contains(marker));
    let Some(first) = candidates.next() else {
        return Err(SignatureError::EntryNotFound {
            marker: marker.to_string(),
        });
    };
    let rest: Vec<String> = candidates.map(|f| f.name.clone()).collect();
    if !rest.is_empty() {
        let mut matches = vec![first.name.clone()];
        matches.extend(rest);
        return Err(SignatureError::AmbiguousEntry {
            marker: marker.to_string(),
            matches,
        });
    }
    Ok(first)
}
