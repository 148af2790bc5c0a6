//! Composition of a heap domain and a value domain.
//!
//! Every transformer first runs on the heap, which may allocate and report
//! [`HeapReplacement`](crate::domain::HeapReplacement)s. The replacements are applied to
//! the value domain *before* it sees the heap-rewritten expressions, so that a value bound
//! to a site turned weak is joined with, never overwritten by, the next write.

use std::fmt;

use log::trace;

use crate::domain::{HeapDomain, SemanticDomain, ValueDomain};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{ExpressionSet, Identifier, ScopeToken, SymbolicExpr};

#[derive(Debug, Clone, PartialEq)]
pub struct AbstractState<H, V> {
    heap: H,
    value: V,
}

impl<H: HeapDomain, V: ValueDomain> AbstractState<H, V> {
    pub fn new(heap: H, value: V) -> Self {
        Self { heap, value }.normalized()
    }

    pub fn heap(&self) -> &H {
        &self.heap
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (H, V) {
        (self.heap, self.value)
    }

    /// An unreachable component makes the whole state unreachable.
    fn normalized(self) -> Self {
        if !self.heap.is_bottom() && self.value.is_bottom() || self.heap.is_bottom() && !self.value.is_bottom() {
            return Self {
                heap: self.heap.bottom(),
                value: self.value.bottom(),
            };
        }
        self
    }

    /// Runs the heap side effects of `expr` and returns the stepped heap, the value
    /// domain with the heap replacements applied and the heap-free rewriting of `expr`.
    fn step(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<(H, V, ExpressionSet)> {
        let mut heap = self.heap.small_step_semantics(expr, pp)?;
        let substitution = heap.take_substitution();
        let value = if substitution.is_empty() {
            self.value.clone()
        } else {
            trace!("{}: applying {} heap replacement(s)", pp, substitution.len());
            self.value.apply_substitution(&substitution, pp)?
        };
        let exprs = heap.rewrite(expr, pp)?;
        Ok((heap, value, exprs))
    }

    /// Joins the states produced for every alternative of a rewritten expression.
    fn join_alternatives(
        &self,
        exprs: &ExpressionSet,
        mut f: impl FnMut(&SymbolicExpr) -> Result<Self>,
    ) -> Result<Option<Self>> {
        let mut result: Option<Self> = None;
        for e in exprs {
            let next = f(e)?;
            result = Some(match result {
                Some(acc) => acc.lub(&next)?,
                None => next,
            });
        }
        Ok(result)
    }

    fn with_heap(heap: H, value: V, pp: &CodeLocation) -> Result<Self> {
        let mut heap = heap;
        let substitution = heap.take_substitution();
        let value = if substitution.is_empty() {
            value
        } else {
            value.apply_substitution(&substitution, pp)?
        };
        Ok(Self { heap, value }.normalized())
    }

    /// Rewrites `expr` into heap-free expressions without running its side effects.
    pub fn rewrite(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<ExpressionSet> {
        self.heap.rewrite(expr, pp)
    }

    /// Writes `expr` into the location(s) denoted by `target`, an identifier or a field
    /// access. A target denoting several locations is updated on each of them separately
    /// and the results are joined.
    pub fn assign_to(&self, target: &SymbolicExpr, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if let SymbolicExpr::Identifier(id) = target {
            return self.assign(id, expr, pp);
        }
        if self.is_bottom() {
            return Ok(self.clone());
        }
        let (heap, value, exprs) = self.step(expr, pp)?;
        let stepped = Self { heap, value };
        let targets = stepped.rewrite(target, pp)?;
        let ids: Vec<&Identifier> = targets.iter().filter_map(|t| t.as_identifier()).collect();
        if ids.is_empty() {
            trace!("{}: write to unknown memory `{}` ignored", pp, target);
            return Ok(stepped);
        }
        // A target that is not an identifier is memory the heap cannot name: the write
        // may miss every named location, which keeps the old state as an alternative.
        let mut result = if ids.len() < targets.len() { Some(stepped.clone()) } else { None };
        for id in ids {
            let next = stepped.assign_rewritten(id, &exprs, pp)?;
            result = Some(match result {
                Some(acc) => acc.lub(&next)?,
                None => next,
            });
        }
        Ok(result.unwrap_or(stepped))
    }

    fn assign_rewritten(&self, id: &Identifier, exprs: &ExpressionSet, pp: &CodeLocation) -> Result<Self> {
        let joined = self.join_alternatives(exprs, |e| {
            let heap = self.heap.assign(id, e, pp)?;
            let value = self.value.assign(id, e, pp)?;
            Self::with_heap(heap, value, pp)
        })?;
        match joined {
            Some(state) => Ok(state),
            None => Ok(Self {
                heap: self.heap.forget_identifier(id)?,
                value: self.value.forget_identifier(id)?,
            }),
        }
    }
}

impl<H: HeapDomain, V: ValueDomain> SemanticDomain for AbstractState<H, V> {
    fn assign(&self, id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if self.is_bottom() {
            return Ok(self.clone());
        }
        let (heap, value, exprs) = self.step(expr, pp)?;
        Self { heap, value }.assign_rewritten(id, &exprs, pp)
    }

    fn small_step_semantics(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if self.is_bottom() {
            return Ok(self.clone());
        }
        let (heap, value, exprs) = self.step(expr, pp)?;
        let stepped = Self { heap, value };
        let joined = stepped.join_alternatives(&exprs, |e| {
            Ok(Self {
                heap: stepped.heap.clone(),
                value: stepped.value.small_step_semantics(e, pp)?,
            }
            .normalized())
        })?;
        Ok(joined.unwrap_or(stepped))
    }

    fn assume(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if self.is_bottom() {
            return Ok(self.clone());
        }
        let mut heap = self.heap.assume(expr, pp)?;
        let substitution = heap.take_substitution();
        let value = self.value.apply_substitution(&substitution, pp)?;
        let exprs = heap.rewrite(expr, pp)?;
        let stepped = Self { heap, value }.normalized();
        if stepped.is_bottom() {
            return Ok(stepped);
        }
        let joined = stepped.join_alternatives(&exprs, |e| {
            Ok(Self {
                heap: stepped.heap.clone(),
                value: stepped.value.assume(e, pp)?,
            }
            .normalized())
        })?;
        Ok(joined.unwrap_or(stepped))
    }

    fn satisfies(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Satisfiability> {
        if self.is_bottom() {
            return Ok(Satisfiability::Bottom);
        }
        let heap_sat = self.heap.satisfies(expr, pp)?;
        let exprs = self.heap.rewrite(expr, pp)?;
        if exprs.is_empty() {
            return Ok(heap_sat);
        }
        let mut value_sat = Satisfiability::Bottom;
        for e in &exprs {
            value_sat = value_sat.lub(self.value.satisfies(e, pp)?);
        }
        Ok(heap_sat.glb(value_sat))
    }

    fn forget_identifier(&self, id: &Identifier) -> Result<Self> {
        Ok(Self {
            heap: self.heap.forget_identifier(id)?,
            value: self.value.forget_identifier(id)?,
        })
    }

    fn push_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(Self {
            heap: self.heap.push_scope(scope)?,
            value: self.value.push_scope(scope)?,
        })
    }

    fn pop_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(Self {
            heap: self.heap.pop_scope(scope)?,
            value: self.value.pop_scope(scope)?,
        })
    }
}

impl<H: HeapDomain, V: ValueDomain> AbstractState<H, V> {
    /// Joins (or widens) the heaps first and moves the replacements the join reports into
    /// both value components before combining them.
    fn combine(&self, other: &Self, widen: bool) -> Result<Self> {
        let mut heap = if widen {
            self.heap.widening(&other.heap)?
        } else {
            self.heap.lub(&other.heap)?
        };
        let substitution = heap.take_substitution();
        let pp = CodeLocation::new("<join>", 0, 0);
        let (left, right) = if substitution.is_empty() {
            (self.value.clone(), other.value.clone())
        } else {
            (
                self.value.apply_substitution(&substitution, &pp)?,
                other.value.apply_substitution(&substitution, &pp)?,
            )
        };
        let value = if widen { left.widening(&right)? } else { left.lub(&right)? };
        Ok(Self { heap, value }.normalized())
    }
}

impl<H: HeapDomain, V: ValueDomain> Lattice for AbstractState<H, V> {
    fn top(&self) -> Self {
        Self {
            heap: self.heap.top(),
            value: self.value.top(),
        }
    }

    fn bottom(&self) -> Self {
        Self {
            heap: self.heap.bottom(),
            value: self.value.bottom(),
        }
    }

    fn is_top(&self) -> bool {
        self.heap.is_top() && self.value.is_top()
    }

    fn is_bottom(&self) -> bool {
        self.heap.is_bottom() || self.value.is_bottom()
    }

    // Comparable states are still combined component-wise: the heap join may have to
    // report sites turning weak.
    fn lub(&self, other: &Self) -> Result<Self> {
        if other.is_bottom() || self == other {
            return Ok(self.clone());
        }
        if self.is_bottom() {
            return Ok(other.clone());
        }
        self.combine(other, false)
    }

    fn widening(&self, other: &Self) -> Result<Self> {
        if other.is_bottom() || self == other {
            return Ok(self.clone());
        }
        if self.is_bottom() {
            return Ok(other.clone());
        }
        self.combine(other, true)
    }

    fn less_or_equal(&self, other: &Self) -> Result<bool> {
        if self.is_bottom() || self == other {
            return Ok(true);
        }
        if other.is_bottom() {
            return Ok(false);
        }
        self.less_or_equal_aux(other)
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        self.combine(other, false)
    }

    fn widening_aux(&self, other: &Self) -> Result<Self> {
        self.combine(other, true)
    }

    // Values bound to sites that are weak in `other` only are compared under the weak
    // identifier, as the join that produced `other` moved them there.
    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        if !self.heap.less_or_equal(&other.heap)? {
            return Ok(false);
        }
        let substitution = self.heap.promotions_towards(&other.heap)?;
        if substitution.is_empty() {
            return self.value.less_or_equal(&other.value);
        }
        let pp = CodeLocation::new("<order>", 0, 0);
        self.value.apply_substitution(&substitution, &pp)?.less_or_equal(&other.value)
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            heap: self.heap.glb(&other.heap)?,
            value: self.value.glb(&other.value)?,
        }
        .normalized())
    }
}

impl<H: fmt::Display, V: fmt::Display> fmt::Display for AbstractState<H, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "heap: {} | values: {}", self.heap, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::heap::{MonolithicHeap, PointBasedHeap};
    use crate::lattice::laws::check_lattice_laws;
    use crate::numeric::Interval;
    use crate::symbolic::{AllocationSite, BinaryOp, Type};
    use test_log::test;

    type State = AbstractState<PointBasedHeap, Environment<Interval>>;

    fn initial() -> State {
        AbstractState::new(PointBasedHeap::field_sensitive(), Environment::new(Interval::top()))
    }

    fn loc(statement: usize) -> CodeLocation {
        CodeLocation::new("main", statement, 0)
    }

    fn ptr(name: &str) -> SymbolicExpr {
        SymbolicExpr::var(name, Type::Pointer)
    }

    fn field_cell(location: &str, weak: bool, field: &str) -> Identifier {
        Identifier::Heap(AllocationSite::new(location, weak).with_field(Some(field.to_string())))
    }

    #[test]
    fn test_field_write_is_strong_on_single_object() {
        let a = Identifier::variable("a", Type::Pointer);
        let state = initial().assign(&a, &SymbolicExpr::allocation("Obj", loc(0)), &loc(0)).unwrap();
        let target = SymbolicExpr::access(ptr("a"), "f");
        let state = state.assign_to(&target, &SymbolicExpr::int(1), &loc(1)).unwrap();
        let state = state.assign_to(&target, &SymbolicExpr::int(2), &loc(2)).unwrap();
        assert_eq!(state.value().get(&field_cell("main:0", false, "f")), Interval::constant(2));
    }

    #[test]
    fn test_substitution_applied_before_assignment() {
        let a = Identifier::variable("a", Type::Pointer);
        let alloc = SymbolicExpr::allocation("Obj", loc(0));
        let target = SymbolicExpr::access(ptr("a"), "f");

        let state = initial().assign(&a, &alloc, &loc(0)).unwrap();
        let state = state.assign_to(&target, &SymbolicExpr::int(1), &loc(1)).unwrap();
        let state = state.assign(&a, &alloc, &loc(0)).unwrap();
        assert_eq!(state.value().get(&field_cell("main:0", true, "f")), Interval::constant(1));

        let state = state.assign_to(&target, &SymbolicExpr::int(2), &loc(1)).unwrap();
        assert_eq!(state.value().get(&field_cell("main:0", true, "f")), Interval::range(1, 2));
        assert!(state.value().binding(&field_cell("main:0", false, "f")).is_none());
    }

    #[test]
    fn test_join_with_promotion_is_upper_bound() {
        let a = Identifier::variable("a", Type::Pointer);
        let alloc = SymbolicExpr::allocation("Obj", loc(0));
        let target = SymbolicExpr::access(ptr("a"), "f");

        let s1 = initial().assign(&a, &alloc, &loc(0)).unwrap();
        let s1 = s1.assign_to(&target, &SymbolicExpr::int(1), &loc(1)).unwrap();
        let s2 = initial().assign(&a, &alloc, &loc(0)).unwrap();
        let s2 = s2.assign_to(&target, &SymbolicExpr::int(2), &loc(1)).unwrap();
        let s2 = s2.assign(&a, &alloc, &loc(0)).unwrap();

        let widened = s1.widening(&s2).unwrap();
        assert!(s1.less_or_equal(&widened).unwrap());
        assert!(s2.less_or_equal(&widened).unwrap());
        for join in [s1.lub(&s2).unwrap(), s2.lub(&s1).unwrap()] {
            assert_eq!(join.value().get(&field_cell("main:0", true, "f")), Interval::range(1, 2));
            assert!(s1.less_or_equal(&join).unwrap(), "{} is not below {}", s1, join);
            assert!(s2.less_or_equal(&join).unwrap(), "{} is not below {}", s2, join);
            assert!(!join.less_or_equal(&s1).unwrap());
        }
    }

    #[test]
    fn test_satisfies_combines_heap_and_values() {
        let a = Identifier::variable("a", Type::Pointer);
        let b = Identifier::variable("b", Type::Pointer);
        let x = Identifier::variable("x", Type::Numeric);
        let state = initial()
            .assign(&a, &SymbolicExpr::allocation("Obj", loc(0)), &loc(0))
            .unwrap()
            .assign(&b, &SymbolicExpr::allocation("Obj", loc(1)), &loc(1))
            .unwrap()
            .assign(&x, &SymbolicExpr::int(3), &loc(2))
            .unwrap();
        let same = SymbolicExpr::binary(BinaryOp::Eq, ptr("a"), ptr("b"));
        assert_eq!(state.satisfies(&same, &loc(3)).unwrap(), Satisfiability::NotSatisfied);
        let small = SymbolicExpr::binary(BinaryOp::Lt, SymbolicExpr::Identifier(x), SymbolicExpr::int(5));
        assert_eq!(state.satisfies(&small, &loc(3)).unwrap(), Satisfiability::Satisfied);
        assert!(state.assume(&same, &loc(3)).unwrap().is_bottom());
    }

    #[test]
    fn test_bottom_component_normalizes() {
        let x = Identifier::variable("x", Type::Numeric);
        let state = initial().assign(&x, &SymbolicExpr::int(1), &loc(0)).unwrap();
        let impossible = SymbolicExpr::binary(BinaryOp::Gt, SymbolicExpr::Identifier(x), SymbolicExpr::int(1));
        let refuted = state.assume(&impossible, &loc(1)).unwrap();
        assert!(refuted.is_bottom());
        assert!(refuted.heap().is_bottom());
    }

    // The summary cell is weak and starts unconstrained, so writes never narrow it.
    #[test]
    fn test_monolithic_heap_keeps_no_field_values() {
        let x = Identifier::variable("x", Type::Numeric);
        let state = AbstractState::new(MonolithicHeap::new(), Environment::new(Interval::top()));
        let target = SymbolicExpr::access(ptr("a"), "f");
        let state = state.assign_to(&target, &SymbolicExpr::int(1), &loc(0)).unwrap();
        let state = state.assign(&x, &SymbolicExpr::access(ptr("b"), "f"), &loc(1)).unwrap();
        let summary = Identifier::Heap(MonolithicHeap::site());
        assert!(state.value().binding(&summary).is_none());
        assert!(state.value().get(&x).is_top());

        let state = state.assign(&x, &SymbolicExpr::int(5), &loc(2)).unwrap();
        assert_eq!(state.value().get(&x), Interval::constant(5));
    }

    #[test]
    fn test_state_lattice_laws() {
        let x = Identifier::variable("x", Type::Numeric);
        let a = Identifier::variable("a", Type::Pointer);
        let s1 = initial().assign(&x, &SymbolicExpr::int(1), &loc(0)).unwrap();
        let s2 = initial().assign(&x, &SymbolicExpr::int(7), &loc(0)).unwrap();
        let s3 = s1.assign(&a, &SymbolicExpr::allocation("Obj", loc(1)), &loc(1)).unwrap();
        check_lattice_laws(&[initial(), initial().bottom(), s1, s2, s3]);
    }
}
