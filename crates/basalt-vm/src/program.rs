use std::fmt;

use serde::Deserialize;

use basalt_contracts::BASALT_PROGRAM_SCHEMA_VERSION;

use crate::instruction::Instruction;

/// A compiled program: the instruction vector plus the builtin names the
/// program declares. The declared list is rewritten into canonical builtin
/// order when a runner binds the program.
#[derive(Debug, Clone, Deserialize)]
pub struct Program {
    pub schema_version: String,
    #[serde(default)]
    pub builtins: Vec<String>,
    pub data: Vec<Instruction>,
}

#[derive(Debug)]
pub enum ProgramError {
    Json(serde_json::Error),
    SchemaMismatch { found: String },
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::Json(err) => write!(f, "malformed program document: {err}"),
            ProgramError::SchemaMismatch { found } => write!(
                f,
                "program schema {found:?} is not {BASALT_PROGRAM_SCHEMA_VERSION:?}"
            ),
        }
    }
}

impl std::error::Error for ProgramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProgramError::Json(err) => Some(err),
            ProgramError::SchemaMismatch { .. } => None,
        }
    }
}

impl Program {
    pub fn from_json(text: &str) -> Result<Self, ProgramError> {
        let program: Program = serde_json::from_str(text).map_err(ProgramError::Json)?;
        if program.schema_version != BASALT_PROGRAM_SCHEMA_VERSION {
            return Err(ProgramError::SchemaMismatch {
                found: program.schema_version,
            });
        }
        Ok(program)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
