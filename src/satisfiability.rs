//! Four-valued satisfiability of conditions.

use std::fmt;

/// Whether a condition holds in an abstract state.
///
/// ```text
///          Unknown
///         /       \
///   Satisfied   NotSatisfied
///         \       /
///          Bottom
/// ```
///
/// `Bottom` means the condition is evaluated in an unreachable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Satisfiability {
    Bottom,
    Satisfied,
    NotSatisfied,
    Unknown,
}

impl Satisfiability {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Satisfiability::Satisfied
        } else {
            Satisfiability::NotSatisfied
        }
    }

    pub fn is_satisfied(self) -> bool {
        self == Satisfiability::Satisfied
    }

    pub fn is_not_satisfied(self) -> bool {
        self == Satisfiability::NotSatisfied
    }

    /// Swaps `Satisfied` and `NotSatisfied`.
    pub fn negate(self) -> Self {
        match self {
            Satisfiability::Satisfied => Satisfiability::NotSatisfied,
            Satisfiability::NotSatisfied => Satisfiability::Satisfied,
            other => other,
        }
    }

    /// Logical conjunction of two conditions.
    pub fn and(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (Bottom, _) | (_, Bottom) => Bottom,
            (NotSatisfied, _) | (_, NotSatisfied) => NotSatisfied,
            (Satisfied, Satisfied) => Satisfied,
            _ => Unknown,
        }
    }

    /// Logical disjunction of two conditions.
    pub fn or(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (Bottom, _) | (_, Bottom) => Bottom,
            (Satisfied, _) | (_, Satisfied) => Satisfied,
            (NotSatisfied, NotSatisfied) => NotSatisfied,
            _ => Unknown,
        }
    }

    /// Join: the condition may evaluate to either answer.
    pub fn lub(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (Bottom, x) | (x, Bottom) => x,
            (x, y) if x == y => x,
            _ => Unknown,
        }
    }

    /// Meet: the condition must evaluate to both answers.
    pub fn glb(self, other: Self) -> Self {
        use Satisfiability::*;
        match (self, other) {
            (Unknown, x) | (x, Unknown) => x,
            (x, y) if x == y => x,
            _ => Bottom,
        }
    }

    pub fn less_or_equal(self, other: Self) -> bool {
        self.lub(other) == other
    }
}

impl fmt::Display for Satisfiability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Satisfiability::Bottom => "⊥",
            Satisfiability::Satisfied => "satisfied",
            Satisfiability::NotSatisfied => "not satisfied",
            Satisfiability::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}
