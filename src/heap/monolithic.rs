use std::fmt;

use super::rewrite_compound;
use crate::domain::{HeapDomain, HeapReplacement, SemanticDomain};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{singleton, AllocationSite, ExpressionSet, Identifier, ScopeToken, SymbolicExpr};

/// Heap abstraction with a single summary location.
///
/// Every allocation and every field access denotes the same weak location, so heap
/// writes are always joins. Pointer identifiers are not tracked.
///
/// The summary location also stands for fields never written and objects built by code
/// outside the analysis, so it starts unconstrained: a value domain lifted with
/// [`Environment`](crate::environment::Environment) never learns anything about heap
/// contents through this heap, only about program variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonolithicHeap {
    bottom: bool,
}

impl Default for MonolithicHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl MonolithicHeap {
    pub const LOCATION: &'static str = "heap";

    pub fn new() -> Self {
        Self { bottom: false }
    }

    /// The summary location.
    pub fn site() -> AllocationSite {
        AllocationSite::new(Self::LOCATION, true)
    }

    fn rewrite_leaf(&self, expr: &SymbolicExpr) -> Result<ExpressionSet> {
        let rewritten = match expr {
            SymbolicExpr::HeapAllocation { .. } => SymbolicExpr::MemoryPointer(Self::site()),
            SymbolicExpr::AccessChild { .. } => SymbolicExpr::Identifier(Identifier::Heap(Self::site())),
            other => other.clone(),
        };
        Ok(singleton(rewritten))
    }
}

impl SemanticDomain for MonolithicHeap {
    fn assign(&self, _id: &Identifier, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.clone())
    }

    fn small_step_semantics(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.clone())
    }

    fn assume(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.clone())
    }

    fn satisfies(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Satisfiability> {
        if self.bottom {
            Ok(Satisfiability::Bottom)
        } else {
            Ok(Satisfiability::Unknown)
        }
    }

    fn forget_identifier(&self, _id: &Identifier) -> Result<Self> {
        Ok(self.clone())
    }

    fn push_scope(&self, _scope: &ScopeToken) -> Result<Self> {
        Ok(self.clone())
    }

    fn pop_scope(&self, _scope: &ScopeToken) -> Result<Self> {
        Ok(self.clone())
    }
}

impl HeapDomain for MonolithicHeap {
    fn rewrite(&self, expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<ExpressionSet> {
        rewrite_compound(expr, &|leaf| self.rewrite_leaf(leaf))
    }

    fn substitution(&self) -> &[HeapReplacement] {
        &[]
    }

    fn take_substitution(&mut self) -> Vec<HeapReplacement> {
        Vec::new()
    }
}

impl Lattice for MonolithicHeap {
    fn top(&self) -> Self {
        Self { bottom: false }
    }

    fn bottom(&self) -> Self {
        Self { bottom: true }
    }

    fn is_top(&self) -> bool {
        !self.bottom
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    // Two-point lattice: the hooks are never reached.
    fn lub_aux(&self, _other: &Self) -> Result<Self> {
        Ok(self.top())
    }

    fn less_or_equal_aux(&self, _other: &Self) -> Result<bool> {
        Ok(true)
    }
}

impl fmt::Display for MonolithicHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            write!(f, "⊥")
        } else {
            write!(f, "monolith")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::Type;
    use test_log::test;

    #[test]
    fn test_every_access_hits_the_summary() {
        let heap = MonolithicHeap::new();
        let pp = CodeLocation::new("main", 0, 0);
        let a = SymbolicExpr::access(SymbolicExpr::var("a", Type::Pointer), "f");
        let b = SymbolicExpr::access(SymbolicExpr::var("b", Type::Pointer), "g");
        let summary = singleton(SymbolicExpr::Identifier(Identifier::Heap(MonolithicHeap::site())));
        assert_eq!(heap.rewrite(&a, &pp).unwrap(), summary);
        assert_eq!(heap.rewrite(&b, &pp).unwrap(), summary);
        assert!(MonolithicHeap::site().is_weak());
    }

    #[test]
    fn test_allocation_rewrite() {
        let heap = MonolithicHeap::new();
        let pp = CodeLocation::new("main", 2, 0);
        let rewritten = heap.rewrite(&SymbolicExpr::allocation("Obj", pp.clone()), &pp).unwrap();
        assert_eq!(rewritten, singleton(SymbolicExpr::MemoryPointer(MonolithicHeap::site())));
    }
}
