//! Combination of value domains.

use std::fmt;

use crate::domain::{HeapReplacement, SemanticDomain, ValueDomain};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{Identifier, ScopeToken, SymbolicExpr};

/// Cartesian product of two value domains.
///
/// Both components see every expression independently and never exchange information,
/// except that an unreachable component makes the whole product unreachable.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianProduct<L, R> {
    left: L,
    right: R,
}

impl<L: ValueDomain, R: ValueDomain> CartesianProduct<L, R> {
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }.normalized()
    }

    pub fn left(&self) -> &L {
        &self.left
    }

    pub fn right(&self) -> &R {
        &self.right
    }

    fn normalized(self) -> Self {
        if self.left.is_bottom() != self.right.is_bottom() {
            return Self {
                left: self.left.bottom(),
                right: self.right.bottom(),
            };
        }
        self
    }

    fn map(&self, f: impl FnOnce(&L) -> Result<L>, g: impl FnOnce(&R) -> Result<R>) -> Result<Self> {
        Ok(Self {
            left: f(&self.left)?,
            right: g(&self.right)?,
        }
        .normalized())
    }

    fn zip(
        &self,
        other: &Self,
        f: impl FnOnce(&L, &L) -> Result<L>,
        g: impl FnOnce(&R, &R) -> Result<R>,
    ) -> Result<Self> {
        Ok(Self {
            left: f(&self.left, &other.left)?,
            right: g(&self.right, &other.right)?,
        }
        .normalized())
    }
}

impl<L: ValueDomain, R: ValueDomain> SemanticDomain for CartesianProduct<L, R> {
    fn assign(&self, id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        self.map(|l| l.assign(id, expr, pp), |r| r.assign(id, expr, pp))
    }

    fn small_step_semantics(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        self.map(|l| l.small_step_semantics(expr, pp), |r| r.small_step_semantics(expr, pp))
    }

    fn assume(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        self.map(|l| l.assume(expr, pp), |r| r.assume(expr, pp))
    }

    // Both components describe the same states, so either verdict can be trusted.
    fn satisfies(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Satisfiability> {
        Ok(self.left.satisfies(expr, pp)?.glb(self.right.satisfies(expr, pp)?))
    }

    fn forget_identifier(&self, id: &Identifier) -> Result<Self> {
        self.map(|l| l.forget_identifier(id), |r| r.forget_identifier(id))
    }

    fn push_scope(&self, scope: &ScopeToken) -> Result<Self> {
        self.map(|l| l.push_scope(scope), |r| r.push_scope(scope))
    }

    fn pop_scope(&self, scope: &ScopeToken) -> Result<Self> {
        self.map(|l| l.pop_scope(scope), |r| r.pop_scope(scope))
    }
}

impl<L: ValueDomain, R: ValueDomain> ValueDomain for CartesianProduct<L, R> {
    fn apply_substitution(&self, substitution: &[HeapReplacement], pp: &CodeLocation) -> Result<Self> {
        self.map(
            |l| l.apply_substitution(substitution, pp),
            |r| r.apply_substitution(substitution, pp),
        )
    }
}

impl<L: ValueDomain, R: ValueDomain> Lattice for CartesianProduct<L, R> {
    fn top(&self) -> Self {
        Self {
            left: self.left.top(),
            right: self.right.top(),
        }
    }

    fn bottom(&self) -> Self {
        Self {
            left: self.left.bottom(),
            right: self.right.bottom(),
        }
    }

    fn is_top(&self) -> bool {
        self.left.is_top() && self.right.is_top()
    }

    fn is_bottom(&self) -> bool {
        self.left.is_bottom() || self.right.is_bottom()
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        self.zip(other, |a, b| a.lub(b), |a, b| a.lub(b))
    }

    fn widening_aux(&self, other: &Self) -> Result<Self> {
        self.zip(other, |a, b| a.widening(b), |a, b| a.widening(b))
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        Ok(self.left.less_or_equal(&other.left)? && self.right.less_or_equal(&other.right)?)
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        self.zip(other, |a, b| a.glb(b), |a, b| a.glb(b))
    }
}

impl<L: fmt::Display, R: fmt::Display> fmt::Display for CartesianProduct<L, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::lattice::laws::check_lattice_laws;
    use crate::numeric::{Interval, Parity};
    use crate::symbolic::{BinaryOp, Type};
    use test_log::test;

    type Product = CartesianProduct<Environment<Interval>, Environment<Parity>>;

    fn pp() -> CodeLocation {
        CodeLocation::new("test", 0, 0)
    }

    fn x() -> Identifier {
        Identifier::variable("x", Type::Numeric)
    }

    fn product() -> Product {
        CartesianProduct::new(Environment::new(Interval::top()), Environment::new(Parity::Top))
    }

    #[test]
    fn test_components_evaluate_independently() {
        let state = product().assign(&x(), &SymbolicExpr::int(3), &pp()).unwrap();
        let step = SymbolicExpr::binary(BinaryOp::Add, SymbolicExpr::Identifier(x()), SymbolicExpr::int(2));
        let state = state.assign(&x(), &step, &pp()).unwrap();
        assert_eq!(state.left().get(&x()), Interval::constant(5));
        assert_eq!(state.right().get(&x()), Parity::Odd);
    }

    #[test]
    fn test_either_component_refutes() {
        let unknown = SymbolicExpr::PushAny(Type::Numeric);
        let double = SymbolicExpr::binary(BinaryOp::Mul, SymbolicExpr::int(2), unknown);
        let state = product().assign(&x(), &double, &pp()).unwrap();
        assert!(state.left().get(&x()).is_top());
        assert_eq!(state.right().get(&x()), Parity::Even);

        let seven = SymbolicExpr::binary(BinaryOp::Eq, SymbolicExpr::Identifier(x()), SymbolicExpr::int(7));
        assert_eq!(state.left().satisfies(&seven, &pp()).unwrap(), Satisfiability::Unknown);
        assert_eq!(state.satisfies(&seven, &pp()).unwrap(), Satisfiability::NotSatisfied);

        let refuted = state.assume(&seven, &pp()).unwrap();
        assert!(refuted.is_bottom());
        assert!(refuted.left().is_bottom());
    }

    #[test]
    fn test_product_lattice_laws() {
        let a = product().assign(&x(), &SymbolicExpr::int(1), &pp()).unwrap();
        let b = product().assign(&x(), &SymbolicExpr::int(4), &pp()).unwrap();
        let joined = a.lub(&b).unwrap();
        assert_eq!(joined.left().get(&x()), Interval::range(1, 4));
        assert_eq!(joined.right().get(&x()), Parity::Top);
        check_lattice_laws(&[product(), product().bottom(), a, b]);
    }
}
