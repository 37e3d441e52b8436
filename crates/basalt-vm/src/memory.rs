use std::fmt;

use crate::value::{Addr, Value};

/// Arena of append-only, write-once segments.
///
/// Segments are created on demand and grow as cells are written. A cell that
/// has been written holds its value for the rest of the run; rewriting it
/// with a different value is a fault. Final segment sizes are only meaningful
/// once execution has halted.
#[derive(Debug, Default)]
pub struct Memory {
    segments: Vec<Vec<Option<Value>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    UnknownSegment { at: Addr },
    UndefinedCell { at: Addr },
    WriteConflict {
        at: Addr,
        existing: Value,
        attempted: Value,
    },
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::UnknownSegment { at } => write!(f, "unknown segment in address {at}"),
            MemoryError::UndefinedCell { at } => write!(f, "read of undefined cell {at}"),
            MemoryError::WriteConflict {
                at,
                existing,
                attempted,
            } => write!(
                f,
                "write conflict at {at}: cell holds {existing}, attempted {attempted}"
            ),
        }
    }
}

impl std::error::Error for MemoryError {}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh empty segment and return its base address.
    pub fn add_segment(&mut self) -> Addr {
        let segment = self.segments.len();
        self.segments.push(Vec::new());
        Addr::new(segment, 0)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Used size of a segment, in cells. Unknown segments report zero.
    pub fn segment_len(&self, segment: usize) -> usize {
        self.segments.get(segment).map_or(0, Vec::len)
    }

    /// Final per-segment size vector, in segment-creation order.
    pub fn segment_sizes(&self) -> Vec<usize> {
        self.segments.iter().map(Vec::len).collect()
    }

    /// Create a fresh segment that already spans `len` unwritten cells.
    ///
    /// Used to give the code segment its span in the address space even
    /// though instructions are fetched from the program, not from cells.
    pub fn add_segment_of(&mut self, len: usize) -> Addr {
        let segment = self.segments.len();
        self.segments.push(vec![None; len]);
        Addr::new(segment, 0)
    }

    /// Non-faulting read.
    pub fn get(&self, at: Addr) -> Option<Value> {
        self.segments.get(at.segment)?.get(at.offset).copied()?
    }

    pub fn read(&self, at: Addr) -> Result<Value, MemoryError> {
        if at.segment >= self.segments.len() {
            return Err(MemoryError::UnknownSegment { at });
        }
        self.get(at).ok_or(MemoryError::UndefinedCell { at })
    }

    /// Write-once store. Re-writing the same value is a no-op; a different
    /// value is a conflict.
    pub fn write(&mut self, at: Addr, value: Value) -> Result<(), MemoryError> {
        let segment = self
            .segments
            .get_mut(at.segment)
            .ok_or(MemoryError::UnknownSegment { at })?;
        if segment.len() <= at.offset {
            segment.resize(at.offset + 1, None);
        }
        match segment[at.offset] {
            None => {
                segment[at.offset] = Some(value);
                Ok(())
            }
            Some(existing) if existing == value => Ok(()),
            Some(existing) => Err(MemoryError::WriteConflict {
                at,
                existing,
                attempted: value,
            }),
        }
    }

    /// Write a run of values starting at `base`; returns the address one past
    /// the last written cell.
    pub fn load(&mut self, base: Addr, values: &[Value]) -> Result<Addr, MemoryError> {
        let mut at = base;
        for value in values {
            self.write(at, *value)?;
            at = Addr::new(at.segment, at.offset + 1);
        }
        Ok(at)
    }

    /// Every written cell, in (segment, offset) order.
    pub fn iter_written(&self) -> impl Iterator<Item = (Addr, Value)> + '_ {
        self.segments.iter().enumerate().flat_map(|(seg, cells)| {
            cells
                .iter()
                .enumerate()
                .filter_map(move |(off, cell)| cell.map(|v| (Addr::new(seg, off), v)))
        })
    }
}
