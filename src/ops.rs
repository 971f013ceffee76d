//! Set-algebra operation selectors.

/// Set operation applied between a target bit-vector and a serialized
/// stream (or between two blocks).
///
/// The `Count*` variants are *const* operations: they compute a cardinality
/// without modifying the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    /// Replace the target with the stream content.
    Assign,
    /// Union.
    Or,
    /// Intersection.
    And,
    /// Symmetric difference.
    Xor,
    /// Difference (target minus stream).
    Sub,
    /// Cardinality of the stream.
    Count,
    /// `|A ∧ B|`.
    CountAnd,
    /// `|A ⊕ B|`.
    CountXor,
    /// `|A ∨ B|`.
    CountOr,
    /// `|A − B|`.
    CountSubAb,
    /// `|B − A|`.
    CountSubBa,
    /// Cardinality of the target.
    CountA,
    /// Cardinality of the stream (alias of `Count`).
    CountB,
}

impl SetOp {
    /// True for operations that never modify the target vector.
    pub fn is_const(self) -> bool {
        matches!(
            self,
            SetOp::Count
                | SetOp::CountAnd
                | SetOp::CountXor
                | SetOp::CountOr
                | SetOp::CountSubAb
                | SetOp::CountSubBa
                | SetOp::CountA
                | SetOp::CountB
        )
    }

    /// The block-combine operation backing this set operation, if any.
    pub(crate) fn combine_op(self) -> Option<CombineOp> {
        match self {
            SetOp::Or | SetOp::Assign => Some(CombineOp::Or),
            SetOp::And => Some(CombineOp::And),
            SetOp::Sub => Some(CombineOp::Sub),
            SetOp::Xor => Some(CombineOp::Xor),
            _ => None,
        }
    }
}

/// Destructive block-level combine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CombineOp {
    Or,
    And,
    Sub,
    Xor,
}
