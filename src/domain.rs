//! Capability traits of semantic domains.
//!
//! - [`SemanticDomain`]: the transformers every domain implements.
//! - [`HeapDomain`]: rewrites heap-level expressions and reports [`HeapReplacement`]s.
//! - [`ValueDomain`]: consumes heap-free expressions and applies heap replacements.
//!
//! [`AbstractState`](crate::state::AbstractState) composes one heap domain with one
//! value domain.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{ExpressionSet, Identifier, ScopeToken, SymbolicExpr};

/// Transformers over symbolic expressions. All of them return a new element.
pub trait SemanticDomain: Sized {
    /// Binds `id` to the value of `expr`.
    fn assign(&self, id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self>;

    /// Evaluates `expr` for its side effects on the domain (e.g. allocations).
    fn small_step_semantics(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self>;

    /// Restricts the element to the states where `expr` holds.
    fn assume(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self>;

    /// Whether `expr` holds in every, none, or some of the represented states.
    fn satisfies(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Satisfiability>;

    fn forget_identifier(&self, id: &Identifier) -> Result<Self>;

    fn forget_identifiers<'a>(&self, ids: impl IntoIterator<Item = &'a Identifier>) -> Result<Self>
    where
        Self: Clone,
    {
        let mut result = self.clone();
        for id in ids {
            result = result.forget_identifier(id)?;
        }
        Ok(result)
    }

    /// Hides every non-heap identifier behind `scope`.
    fn push_scope(&self, scope: &ScopeToken) -> Result<Self>;

    /// Reveals identifiers hidden behind `scope` and drops the locals of the frame.
    fn pop_scope(&self, scope: &ScopeToken) -> Result<Self>;
}

/// Heap abstraction.
pub trait HeapDomain: SemanticDomain + Lattice {
    /// Rewrites `expr` into heap-free expressions, one per alternative object.
    fn rewrite(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<ExpressionSet>;

    /// Replacements produced by the last operation.
    fn substitution(&self) -> &[HeapReplacement];

    /// Removes and returns the pending replacements.
    fn take_substitution(&mut self) -> Vec<HeapReplacement>;

    /// Replacements turning the identifiers of `self` into those of the larger heap
    /// `other`, e.g. a site strong here and weak there.
    fn promotions_towards(&self, _other: &Self) -> Result<Vec<HeapReplacement>> {
        Ok(Vec::new())
    }
}

/// Abstraction of the values of program and heap identifiers.
pub trait ValueDomain: SemanticDomain + Lattice {
    /// Moves what is known about every replacement's sources onto its targets.
    fn apply_substitution(&self, substitution: &[HeapReplacement], pp: &CodeLocation) -> Result<Self>;
}

/// Rewrite of heap identifiers: every source is replaced by all targets.
///
/// A source that is a bare allocation site also covers the field derivations of that
/// site: replacing `heap[s]:p` by `heap[w]:p` turns `heap[s]:p[f]` into `heap[w]:p[f]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReplacement {
    sources: BTreeSet<Identifier>,
    targets: BTreeSet<Identifier>,
}

impl HeapReplacement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, id: Identifier) -> Self {
        self.sources.insert(id);
        self
    }

    pub fn with_target(mut self, id: Identifier) -> Self {
        self.targets.insert(id);
        self
    }

    pub fn sources(&self) -> &BTreeSet<Identifier> {
        &self.sources
    }

    pub fn targets(&self) -> &BTreeSet<Identifier> {
        &self.targets
    }

    /// Targets replacing `id`, or `None` if `id` is not affected.
    pub fn targets_for(&self, id: &Identifier) -> Option<Vec<Identifier>> {
        if self.sources.contains(id) {
            return Some(self.targets.iter().cloned().collect());
        }
        let site = id.as_site()?;
        let field = site.field()?;
        let base = Identifier::Heap(site.base());
        if !self.sources.contains(&base) {
            return None;
        }
        let derived = self
            .targets
            .iter()
            .map(|t| match t {
                Identifier::Heap(target) if target.field().is_none() => {
                    Identifier::Heap(target.with_field(Some(field.to_string())))
                }
                other => other.clone(),
            })
            .collect();
        Some(derived)
    }
}

impl fmt::Display for HeapReplacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ids: &BTreeSet<Identifier>| ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
        write!(f, "{{{}}} -> {{{}}}", join(&self.sources), join(&self.targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::{AllocationSite, Type};
    use test_log::test;

    #[test]
    fn test_replacement_covers_fields() {
        let strong = AllocationSite::new("main:1", false);
        let weak = strong.with_weak(true);
        let r = HeapReplacement::new()
            .with_source(Identifier::Heap(strong.clone()))
            .with_target(Identifier::Heap(weak.clone()));

        assert_eq!(
            r.targets_for(&Identifier::Heap(strong.clone())),
            Some(vec![Identifier::Heap(weak.clone())])
        );
        let field = Some("f".to_string());
        assert_eq!(
            r.targets_for(&Identifier::Heap(strong.with_field(field.clone()))),
            Some(vec![Identifier::Heap(weak.with_field(field))])
        );
        assert_eq!(r.targets_for(&Identifier::Heap(weak)), None);
        assert_eq!(r.targets_for(&Identifier::variable("x", Type::Numeric)), None);
    }
}
