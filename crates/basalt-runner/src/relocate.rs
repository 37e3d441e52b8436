use std::fmt;

use basalt_vm::{Addr, Memory, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelocationError {
    /// A written cell holds an address into a segment the table does not
    /// cover. Internal-consistency violation, not a recoverable condition.
    DanglingSegment { segment: usize, at: Addr },
}

impl fmt::Display for RelocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelocationError::DanglingSegment { segment, at } => {
                write!(f, "cell {at} points into unknown segment {segment}")
            }
        }
    }
}

impl std::error::Error for RelocationError {}

/// Per-segment linear bases: a prefix sum of final segment sizes, in
/// segment-creation order. The first addressable linear address is 1.
///
/// Pure function of the size vector; identical sizes always produce an
/// identical table.
pub fn relocation_table(sizes: &[usize]) -> Vec<usize> {
    let mut table = Vec::with_capacity(sizes.len());
    let mut base = 1usize;
    for size in sizes {
        table.push(base);
        base += size;
    }
    table
}

/// Map one cell value into the linear address space.
pub fn relocate_value(table: &[usize], value: Value, at: Addr) -> Result<u128, RelocationError> {
    match value {
        Value::Word(word) => Ok(word),
        Value::Addr(addr) => {
            let base = table
                .get(addr.segment)
                .ok_or(RelocationError::DanglingSegment {
                    segment: addr.segment,
                    at,
                })?;
            Ok((base + addr.offset) as u128)
        }
    }
}

/// Flatten every written cell into `(linear address, relocated value)`
/// pairs, ordered by linear address.
pub fn relocate_memory(
    memory: &Memory,
    table: &[usize],
) -> Result<Vec<(usize, u128)>, RelocationError> {
    let mut cells = Vec::new();
    for (at, value) in memory.iter_written() {
        let base = table
            .get(at.segment)
            .ok_or(RelocationError::DanglingSegment {
                segment: at.segment,
                at,
            })?;
        cells.push((base + at.offset, relocate_value(table, value, at)?));
    }
    Ok(cells)
}
