//! Parity abstract domain.

use std::fmt;

use crate::environment::{Environment, NonRelationalElement};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{BinaryOp, Constant, SymbolicExpr, UnaryOp};

/// Parity of integers.
///
/// ```text
///       ⊤ (any)
///      / \
///   Even  Odd
///      \ /
///       ⊥
/// ```
///
/// Zero is even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    Bottom,
    Even,
    Odd,
    Top,
}

impl Parity {
    pub fn of(value: i64) -> Self {
        if value % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        match self {
            Parity::Bottom => false,
            Parity::Top => true,
            p => *p == Parity::of(value),
        }
    }

    fn add(self, other: Parity) -> Parity {
        match (self, other) {
            (Parity::Top, _) | (_, Parity::Top) => Parity::Top,
            (a, b) if a == b => Parity::Even,
            _ => Parity::Odd,
        }
    }

    fn mul(self, other: Parity) -> Parity {
        match (self, other) {
            (Parity::Even, _) | (_, Parity::Even) => Parity::Even,
            (Parity::Odd, Parity::Odd) => Parity::Odd,
            _ => Parity::Top,
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Parity::Bottom => "⊥",
            Parity::Even => "even",
            Parity::Odd => "odd",
            Parity::Top => "⊤",
        };
        write!(f, "{}", s)
    }
}

impl Lattice for Parity {
    fn top(&self) -> Self {
        Parity::Top
    }

    fn bottom(&self) -> Self {
        Parity::Bottom
    }

    fn is_top(&self) -> bool {
        *self == Parity::Top
    }

    fn is_bottom(&self) -> bool {
        *self == Parity::Bottom
    }

    // Only Even and Odd reach the hooks, and they are distinct.
    fn lub_aux(&self, _other: &Self) -> Result<Self> {
        Ok(Parity::Top)
    }

    fn less_or_equal_aux(&self, _other: &Self) -> Result<bool> {
        Ok(false)
    }
}

impl NonRelationalElement for Parity {
    fn eval_constant(&self, constant: &Constant, _pp: &CodeLocation) -> Result<Self> {
        match constant {
            Constant::Int(n) => Ok(Parity::of(*n)),
            _ => Ok(Parity::Top),
        }
    }

    fn eval_unary(&self, op: UnaryOp, arg: &Self, _pp: &CodeLocation) -> Result<Self> {
        match op {
            UnaryOp::Neg => Ok(*arg),
            UnaryOp::Not => Ok(Parity::Top),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Self, right: &Self, _pp: &CodeLocation) -> Result<Self> {
        let result = match op {
            BinaryOp::Add | BinaryOp::Sub => left.add(*right),
            BinaryOp::Mul => left.mul(*right),
            _ => Parity::Top,
        };
        Ok(result)
    }

    fn satisfies_binary(&self, op: BinaryOp, left: &Self, right: &Self, _pp: &CodeLocation) -> Result<Satisfiability> {
        let distinct = matches!((left, right), (Parity::Even, Parity::Odd) | (Parity::Odd, Parity::Even));
        let sat = match op {
            BinaryOp::Eq if distinct => Satisfiability::NotSatisfied,
            BinaryOp::Ne if distinct => Satisfiability::Satisfied,
            _ => Satisfiability::Unknown,
        };
        Ok(sat)
    }

    fn assume_binary(
        &self,
        env: &Environment<Self>,
        op: BinaryOp,
        left: &SymbolicExpr,
        right: &SymbolicExpr,
        pp: &CodeLocation,
    ) -> Result<Environment<Self>> {
        if op != BinaryOp::Eq {
            return Ok(env.clone());
        }
        let mut result = env.clone();
        for (side, other) in [(left, right), (right, left)] {
            if let Some(id) = side.as_identifier() {
                let refined = result.get(id).glb(&env.eval(other, pp)?)?;
                if refined.is_bottom() {
                    return Ok(env.bottom());
                }
                result.set(id.clone(), refined);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SemanticDomain;
    use crate::lattice::laws::check_lattice_laws;
    use crate::symbolic::{Identifier, Type};
    use test_log::test;

    fn pp() -> CodeLocation {
        CodeLocation::new("test", 0, 0)
    }

    #[test]
    fn test_parity_lattice_laws() {
        check_lattice_laws(&[Parity::Bottom, Parity::Even, Parity::Odd, Parity::Top]);
    }

    #[test]
    fn test_arithmetic() {
        let p = Parity::Top;
        assert_eq!(p.eval_binary(BinaryOp::Add, &Parity::Odd, &Parity::Odd, &pp()).unwrap(), Parity::Even);
        assert_eq!(p.eval_binary(BinaryOp::Sub, &Parity::Even, &Parity::Odd, &pp()).unwrap(), Parity::Odd);
        assert_eq!(p.eval_binary(BinaryOp::Mul, &Parity::Top, &Parity::Even, &pp()).unwrap(), Parity::Even);
        assert!(Parity::Even.contains(0));
        assert!(!Parity::Odd.contains(0));
    }

    #[test]
    fn test_loop_counter_keeps_parity() {
        let i = Identifier::variable("i", Type::Numeric);
        let env = Environment::new(Parity::Top).with(i.clone(), Parity::Even);
        let step = SymbolicExpr::binary(BinaryOp::Add, SymbolicExpr::Identifier(i.clone()), SymbolicExpr::int(2));
        let next = env.assign(&i, &step, &pp()).unwrap();
        assert_eq!(next.get(&i), Parity::Even);
        assert!(next.less_or_equal(&env).unwrap());
    }

    #[test]
    fn test_assume_equality() {
        let i = Identifier::variable("i", Type::Numeric);
        let env = Environment::new(Parity::Top).with(i.clone(), Parity::Even);
        let eq_odd = SymbolicExpr::binary(BinaryOp::Eq, SymbolicExpr::Identifier(i.clone()), SymbolicExpr::int(3));
        assert!(env.assume(&eq_odd, &pp()).unwrap().is_bottom());

        let top = Environment::new(Parity::Top);
        let refined = top.assume(&eq_odd, &pp()).unwrap();
        assert_eq!(refined.get(&i), Parity::Odd);
    }
}
