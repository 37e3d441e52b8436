use std::fmt;

use serde::Serialize;

use crate::memory::Memory;
use crate::value::{Addr, Value};

/// Words handed to the range-check builtin must stay below this bound.
pub const RANGE_CHECK_BOUND: u128 = 1 << 64;
/// Bound for the wide range-check variant.
pub const RANGE_CHECK96_BOUND: u128 = 1 << 96;

/// The closed set of builtin co-processors, declared in canonical order.
///
/// The declaration order of these variants IS the canonical builtin order:
/// the machine's segment layout and its consistency checks assume builtins
/// appear in exactly this sequence, so `Ord` on this enum doubles as the
/// order's index function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuiltinId {
    Output,
    Pedersen,
    RangeCheck,
    Ecdsa,
    Bitwise,
    EcOp,
    Keccak,
    Poseidon,
    RangeCheck96,
}

/// Canonical builtin order, as an immutable static table.
pub const BUILTIN_ORDER: &[BuiltinId] = &[
    BuiltinId::Output,
    BuiltinId::Pedersen,
    BuiltinId::RangeCheck,
    BuiltinId::Ecdsa,
    BuiltinId::Bitwise,
    BuiltinId::EcOp,
    BuiltinId::Keccak,
    BuiltinId::Poseidon,
    BuiltinId::RangeCheck96,
];

impl BuiltinId {
    pub fn as_str(self) -> &'static str {
        match self {
            BuiltinId::Output => "output",
            BuiltinId::Pedersen => "pedersen",
            BuiltinId::RangeCheck => "range_check",
            BuiltinId::Ecdsa => "ecdsa",
            BuiltinId::Bitwise => "bitwise",
            BuiltinId::EcOp => "ec_op",
            BuiltinId::Keccak => "keccak",
            BuiltinId::Poseidon => "poseidon",
            BuiltinId::RangeCheck96 => "range_check96",
        }
    }

    pub fn from_token(token: &str) -> Option<BuiltinId> {
        BUILTIN_ORDER.iter().copied().find(|id| id.as_str() == token)
    }

    pub fn order_index(self) -> usize {
        BUILTIN_ORDER
            .iter()
            .position(|id| *id == self)
            .unwrap_or(usize::MAX)
    }

    /// Cells one logical builtin operation occupies in its segment.
    pub fn cells_per_instance(self) -> usize {
        match self {
            BuiltinId::Output => 1,
            BuiltinId::Pedersen => 3,
            BuiltinId::RangeCheck => 1,
            BuiltinId::Ecdsa => 2,
            BuiltinId::Bitwise => 5,
            BuiltinId::EcOp => 7,
            BuiltinId::Keccak => 16,
            BuiltinId::Poseidon => 6,
            BuiltinId::RangeCheck96 => 1,
        }
    }
}

impl fmt::Display for BuiltinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restrict the canonical order to `required`, preserving canonical order
/// regardless of the order `required` lists them in.
pub fn ordered_subset(required: &[BuiltinId]) -> Vec<BuiltinId> {
    BUILTIN_ORDER
        .iter()
        .copied()
        .filter(|id| required.contains(id))
        .collect()
}

/// Parse a program's declared builtin names into the canonical-order subset.
///
/// Unknown names are an error in strict mode; permissive mode drops them.
pub fn canonical_builtin_list(
    declared: &[String],
    permissive: bool,
) -> Result<Vec<BuiltinId>, BuiltinError> {
    let mut required = Vec::with_capacity(declared.len());
    for name in declared {
        match BuiltinId::from_token(name) {
            Some(id) => required.push(id),
            None if permissive => {}
            None => {
                return Err(BuiltinError::UnknownName { name: name.clone() });
            }
        }
    }
    Ok(ordered_subset(&required))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinError {
    UnknownName {
        name: String,
    },
    IncompleteInstance {
        id: BuiltinId,
        used: usize,
        cells_per_instance: usize,
    },
    MissingOperand {
        id: BuiltinId,
        at: Addr,
    },
    NonWordCell {
        id: BuiltinId,
        at: Addr,
    },
    ValueOutOfRange {
        id: BuiltinId,
        at: Addr,
        value: u128,
        bound: u128,
    },
    BitwiseMismatch {
        id: BuiltinId,
        at: Addr,
        expected: u128,
        found: u128,
    },
}

impl fmt::Display for BuiltinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuiltinError::UnknownName { name } => write!(f, "unknown builtin {name:?}"),
            BuiltinError::IncompleteInstance {
                id,
                used,
                cells_per_instance,
            } => write!(
                f,
                "{id} segment holds {used} cells, not a multiple of {cells_per_instance}"
            ),
            BuiltinError::MissingOperand { id, at } => {
                write!(f, "{id} instance at {at} is missing an operand")
            }
            BuiltinError::NonWordCell { id, at } => {
                write!(f, "{id} cell {at} holds an address, expected a word")
            }
            BuiltinError::ValueOutOfRange {
                id,
                at,
                value,
                bound,
            } => write!(f, "{id} cell {at} holds {value}, bound is {bound}"),
            BuiltinError::BitwiseMismatch {
                id,
                at,
                expected,
                found,
            } => write!(
                f,
                "{id} output cell {at} holds {found}, operands imply {expected}"
            ),
        }
    }
}

impl std::error::Error for BuiltinError {}

/// Per-builtin segment usage, reported after finalization.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltinStats {
    pub name: &'static str,
    pub segment: usize,
    pub used_cells: usize,
    pub instances: usize,
}

/// One builtin co-processor bound to its private segment.
///
/// The runner contributes its segment base to the entry stack and validates
/// its segment when the run finalizes. Internal co-processor algorithms are
/// not modeled; validation is structural, plus the cheap value checks the
/// range-check variants and the bitwise unit admit.
#[derive(Debug)]
pub struct BuiltinRunner {
    id: BuiltinId,
    base: Addr,
}

impl BuiltinRunner {
    pub fn new(id: BuiltinId, memory: &mut Memory) -> Self {
        let base = memory.add_segment();
        Self { id, base }
    }

    pub fn id(&self) -> BuiltinId {
        self.id
    }

    pub fn base(&self) -> Addr {
        self.base
    }

    /// Addresses this builtin seeds the entry stack with, in the runner's
    /// own order.
    pub fn initial_stack(&self) -> Vec<Value> {
        vec![Value::Addr(self.base)]
    }

    /// End-of-run validation of the builtin's segment. Invoked exactly once,
    /// after the last real step.
    pub fn finalize(&self, memory: &Memory) -> Result<BuiltinStats, BuiltinError> {
        let used = memory.segment_len(self.base.segment);
        let cells = self.id.cells_per_instance();
        if used % cells != 0 {
            return Err(BuiltinError::IncompleteInstance {
                id: self.id,
                used,
                cells_per_instance: cells,
            });
        }

        match self.id {
            BuiltinId::RangeCheck => self.check_bounded(memory, used, RANGE_CHECK_BOUND)?,
            BuiltinId::RangeCheck96 => self.check_bounded(memory, used, RANGE_CHECK96_BOUND)?,
            BuiltinId::Bitwise => self.check_bitwise(memory, used / cells)?,
            _ => {}
        }

        Ok(BuiltinStats {
            name: self.id.as_str(),
            segment: self.base.segment,
            used_cells: used,
            instances: used / cells,
        })
    }

    fn check_bounded(&self, memory: &Memory, used: usize, bound: u128) -> Result<(), BuiltinError> {
        for offset in 0..used {
            let at = Addr::new(self.base.segment, offset);
            let Some(value) = memory.get(at) else {
                continue;
            };
            let word = value.as_word().ok_or(BuiltinError::NonWordCell {
                id: self.id,
                at,
            })?;
            if word >= bound {
                return Err(BuiltinError::ValueOutOfRange {
                    id: self.id,
                    at,
                    value: word,
                    bound,
                });
            }
        }
        Ok(())
    }

    fn check_bitwise(&self, memory: &Memory, instances: usize) -> Result<(), BuiltinError> {
        for instance in 0..instances {
            let base_off = instance * self.id.cells_per_instance();
            let x_at = Addr::new(self.base.segment, base_off);
            let y_at = Addr::new(self.base.segment, base_off + 1);
            let x = self.word_operand(memory, x_at)?;
            let y = self.word_operand(memory, y_at)?;
            let expected = [x & y, x | y, x ^ y];
            for (slot, expected) in expected.into_iter().enumerate() {
                let at = Addr::new(self.base.segment, base_off + 2 + slot);
                let Some(value) = memory.get(at) else {
                    continue;
                };
                let found = value.as_word().ok_or(BuiltinError::NonWordCell {
                    id: self.id,
                    at,
                })?;
                if found != expected {
                    return Err(BuiltinError::BitwiseMismatch {
                        id: self.id,
                        at,
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(())
    }

    fn word_operand(&self, memory: &Memory, at: Addr) -> Result<u128, BuiltinError> {
        let value = memory.get(at).ok_or(BuiltinError::MissingOperand {
            id: self.id,
            at,
        })?;
        value.as_word().ok_or(BuiltinError::NonWordCell {
            id: self.id,
            at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_index_follows_declaration_order() {
        assert!(BuiltinId::Output.order_index() < BuiltinId::Pedersen.order_index());
        assert!(BuiltinId::RangeCheck.order_index() < BuiltinId::Bitwise.order_index());
        assert!(BuiltinId::Poseidon.order_index() < BuiltinId::RangeCheck96.order_index());
    }

    #[test]
    fn ordered_subset_is_sorted_by_order_index() {
        let subset = ordered_subset(&[
            BuiltinId::Poseidon,
            BuiltinId::Output,
            BuiltinId::Bitwise,
            BuiltinId::RangeCheck,
        ]);
        assert_eq!(
            subset,
            vec![
                BuiltinId::Output,
                BuiltinId::RangeCheck,
                BuiltinId::Bitwise,
                BuiltinId::Poseidon,
            ]
        );
        let mut indices: Vec<_> = subset.iter().map(|id| id.order_index()).collect();
        let sorted = indices.clone();
        indices.sort_unstable();
        assert_eq!(indices, sorted);
    }

    #[test]
    fn from_token_round_trips_every_builtin() {
        for id in BUILTIN_ORDER {
            assert_eq!(BuiltinId::from_token(id.as_str()), Some(*id));
        }
        assert_eq!(BuiltinId::from_token("segment_arena"), None);
    }

    #[test]
    fn canonical_builtin_list_rejects_unknown_names_in_strict_mode() {
        let declared = vec!["range_check".to_string(), "segment_arena".to_string()];
        let err = canonical_builtin_list(&declared, false).unwrap_err();
        assert!(matches!(err, BuiltinError::UnknownName { .. }));
    }

    #[test]
    fn canonical_builtin_list_drops_unknown_names_in_permissive_mode() {
        let declared = vec![
            "bitwise".to_string(),
            "segment_arena".to_string(),
            "range_check".to_string(),
        ];
        let ids = canonical_builtin_list(&declared, true).unwrap();
        assert_eq!(ids, vec![BuiltinId::RangeCheck, BuiltinId::Bitwise]);
    }

    #[test]
    fn range_check_accepts_bounded_words() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::RangeCheck, &mut memory);
        memory
            .write(runner.base(), Value::Word(RANGE_CHECK_BOUND - 1))
            .unwrap();
        let stats = runner.finalize(&memory).unwrap();
        assert_eq!(stats.used_cells, 1);
        assert_eq!(stats.instances, 1);
    }

    #[test]
    fn range_check_rejects_out_of_range_word() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::RangeCheck, &mut memory);
        memory
            .write(runner.base(), Value::Word(RANGE_CHECK_BOUND))
            .unwrap();
        let err = runner.finalize(&memory).unwrap_err();
        assert!(matches!(
            err,
            BuiltinError::ValueOutOfRange { bound: RANGE_CHECK_BOUND, .. }
        ));
    }

    #[test]
    fn range_check96_uses_wider_bound() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::RangeCheck96, &mut memory);
        memory
            .write(runner.base(), Value::Word(RANGE_CHECK_BOUND))
            .unwrap();
        runner.finalize(&memory).unwrap();
    }

    #[test]
    fn bitwise_validates_written_outputs() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::Bitwise, &mut memory);
        let seg = runner.base().segment;
        memory.write(Addr::new(seg, 0), Value::Word(0b1100)).unwrap();
        memory.write(Addr::new(seg, 1), Value::Word(0b1010)).unwrap();
        memory.write(Addr::new(seg, 2), Value::Word(0b1000)).unwrap();
        memory.write(Addr::new(seg, 3), Value::Word(0b1110)).unwrap();
        memory.write(Addr::new(seg, 4), Value::Word(0b0110)).unwrap();
        let stats = runner.finalize(&memory).unwrap();
        assert_eq!(stats.instances, 1);
    }

    #[test]
    fn bitwise_rejects_wrong_output() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::Bitwise, &mut memory);
        let seg = runner.base().segment;
        memory.write(Addr::new(seg, 0), Value::Word(0b1100)).unwrap();
        memory.write(Addr::new(seg, 1), Value::Word(0b1010)).unwrap();
        memory.write(Addr::new(seg, 2), Value::Word(0b1111)).unwrap();
        memory.write(Addr::new(seg, 4), Value::Word(0)).unwrap();
        let err = runner.finalize(&memory).unwrap_err();
        assert!(matches!(err, BuiltinError::BitwiseMismatch { .. }));
    }

    #[test]
    fn incomplete_instance_is_rejected() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::Pedersen, &mut memory);
        let seg = runner.base().segment;
        memory.write(Addr::new(seg, 0), Value::Word(1)).unwrap();
        memory.write(Addr::new(seg, 1), Value::Word(2)).unwrap();
        let err = runner.finalize(&memory).unwrap_err();
        assert!(matches!(err, BuiltinError::IncompleteInstance { .. }));
    }

    #[test]
    fn initial_stack_is_the_segment_base() {
        let mut memory = Memory::new();
        let runner = BuiltinRunner::new(BuiltinId::Output, &mut memory);
        assert_eq!(runner.initial_stack(), vec![Value::Addr(runner.base())]);
    }
}
