//! Interval abstract domain.
//!
//! Tracks lower and upper bounds of numeric values. The lattice has infinite height,
//! so loops are stabilized with the standard interval widening: any unstable bound jumps
//! to infinity.

use std::cmp::{max, min};
use std::fmt;

use crate::environment::{Environment, NonRelationalElement};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{BinaryOp, Constant, SymbolicExpr, UnaryOp};

/// Bound of an interval: -∞, finite value, or +∞.
///
/// Arithmetic overflowing `i64` yields the infinite bound of the overflow's sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bound {
    NegInf,
    Finite(i64),
    PosInf,
}

impl Bound {
    pub fn as_finite(&self) -> Option<i64> {
        match self {
            Bound::Finite(n) => Some(*n),
            _ => None,
        }
    }

    fn signum(&self) -> i64 {
        match self {
            Bound::NegInf => -1,
            Bound::Finite(n) => n.signum(),
            Bound::PosInf => 1,
        }
    }

    fn infinity(sign: i64) -> Bound {
        if sign < 0 {
            Bound::NegInf
        } else {
            Bound::PosInf
        }
    }

    pub fn add(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a.checked_add(*b).map_or(Bound::infinity(a.signum()), Bound::Finite),
            // Only reached for an already unbounded operand: stay unbounded.
            (Bound::NegInf, Bound::PosInf) | (Bound::PosInf, Bound::NegInf) => Bound::PosInf,
            (Bound::NegInf, _) | (_, Bound::NegInf) => Bound::NegInf,
            (Bound::PosInf, _) | (_, Bound::PosInf) => Bound::PosInf,
        }
    }

    pub fn sub(&self, other: &Bound) -> Bound {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => a
                .checked_mul(*b)
                .map_or(Bound::infinity(a.signum() * b.signum()), Bound::Finite),
            (Bound::Finite(0), _) | (_, Bound::Finite(0)) => Bound::Finite(0),
            _ => Bound::infinity(self.signum() * other.signum()),
        }
    }

    /// Truncating division. `other` must not be zero.
    fn div(&self, other: &Bound) -> Bound {
        match (self, other) {
            (Bound::Finite(a), Bound::Finite(b)) => match a.checked_div(*b) {
                Some(q) => Bound::Finite(q),
                None => Bound::PosInf,
            },
            (Bound::Finite(_), _) => Bound::Finite(0),
            _ => Bound::infinity(self.signum() * other.signum()),
        }
    }

    pub fn neg(&self) -> Bound {
        match self {
            Bound::NegInf => Bound::PosInf,
            Bound::Finite(n) => n.checked_neg().map_or(Bound::PosInf, Bound::Finite),
            Bound::PosInf => Bound::NegInf,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::NegInf => write!(f, "-∞"),
            Bound::Finite(n) => write!(f, "{}", n),
            Bound::PosInf => write!(f, "+∞"),
        }
    }
}

/// Interval `[low, high]`. The empty interval is the bottom element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub low: Bound,
    pub high: Bound,
}

impl Interval {
    pub fn new(low: Bound, high: Bound) -> Self {
        if low > high || low == Bound::PosInf || high == Bound::NegInf {
            Self::bottom()
        } else {
            Self { low, high }
        }
    }

    pub fn constant(value: i64) -> Self {
        Self::range(value, value)
    }

    pub fn range(low: i64, high: i64) -> Self {
        Self::new(Bound::Finite(low), Bound::Finite(high))
    }

    pub fn top() -> Self {
        Self {
            low: Bound::NegInf,
            high: Bound::PosInf,
        }
    }

    pub fn bottom() -> Self {
        Self {
            low: Bound::PosInf,
            high: Bound::NegInf,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.low > self.high
    }

    pub fn contains(&self, value: i64) -> bool {
        !self.is_empty() && self.low <= Bound::Finite(value) && Bound::Finite(value) <= self.high
    }

    pub fn as_constant(&self) -> Option<i64> {
        match (self.low, self.high) {
            (Bound::Finite(l), Bound::Finite(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn join(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Interval {
            low: min(self.low, other.low),
            high: max(self.high, other.high),
        }
    }

    pub fn meet(&self, other: &Interval) -> Interval {
        Interval::new(max(self.low, other.low), min(self.high, other.high))
    }

    pub fn widen(&self, other: &Interval) -> Interval {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let low = if other.low < self.low { Bound::NegInf } else { self.low };
        let high = if other.high > self.high { Bound::PosInf } else { self.high };
        Interval { low, high }
    }

    pub fn includes(&self, other: &Interval) -> bool {
        other.is_empty() || (self.low <= other.low && other.high <= self.high)
    }

    /// Interval of computed bounds. A lower bound that overflowed upwards is still at
    /// least `i64::MAX`, an upper bound that overflowed downwards at most `i64::MIN`.
    fn rounded(low: Bound, high: Bound) -> Interval {
        let low = if low == Bound::PosInf { Bound::Finite(i64::MAX) } else { low };
        let high = if high == Bound::NegInf { Bound::Finite(i64::MIN) } else { high };
        Interval::new(low, high)
    }

    fn from_corners(corners: [Bound; 4]) -> Interval {
        let low = corners.iter().min().copied().unwrap_or(Bound::NegInf);
        let high = corners.iter().max().copied().unwrap_or(Bound::PosInf);
        Interval::rounded(low, high)
    }

    pub fn add(&self, other: &Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::bottom();
        }
        Interval::rounded(self.low.add(&other.low), self.high.add(&other.high))
    }

    pub fn sub(&self, other: &Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::bottom();
        }
        Interval::rounded(self.low.sub(&other.high), self.high.sub(&other.low))
    }

    pub fn mul(&self, other: &Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::bottom();
        }
        Interval::from_corners([
            self.low.mul(&other.low),
            self.low.mul(&other.high),
            self.high.mul(&other.low),
            self.high.mul(&other.high),
        ])
    }

    pub fn div(&self, other: &Interval) -> Interval {
        if self.is_empty() || other.is_empty() {
            return Interval::bottom();
        }
        if other.contains(0) {
            return Interval::top();
        }
        Interval::from_corners([
            self.low.div(&other.low),
            self.low.div(&other.high),
            self.high.div(&other.low),
            self.high.div(&other.high),
        ])
    }

    pub fn neg(&self) -> Interval {
        if self.is_empty() {
            return Interval::bottom();
        }
        Interval::rounded(self.high.neg(), self.low.neg())
    }

    /// Values `v` for which `v op w` holds for at least one `w` in `other`.
    fn constraint(op: BinaryOp, other: &Interval) -> Interval {
        let one = Bound::Finite(1);
        match op {
            BinaryOp::Eq => *other,
            BinaryOp::Lt => Interval::rounded(Bound::NegInf, other.high.sub(&one)),
            BinaryOp::Le => Interval::new(Bound::NegInf, other.high),
            BinaryOp::Gt => Interval::rounded(other.low.add(&one), Bound::PosInf),
            BinaryOp::Ge => Interval::new(other.low, Bound::PosInf),
            _ => Interval::top(),
        }
    }

    /// Refines `self` under `self op other`.
    fn refine(&self, op: BinaryOp, other: &Interval) -> Interval {
        let refined = self.meet(&Interval::constraint(op, other));
        match (op, other.as_constant()) {
            (BinaryOp::Ne, Some(c)) if refined.low == Bound::Finite(c) => {
                Interval::rounded(Bound::Finite(c).add(&Bound::Finite(1)), refined.high)
            }
            (BinaryOp::Ne, Some(c)) if refined.high == Bound::Finite(c) => {
                Interval::rounded(refined.low, Bound::Finite(c).sub(&Bound::Finite(1)))
            }
            _ => refined,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "⊥");
        }
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

impl Lattice for Interval {
    fn top(&self) -> Self {
        Interval::top()
    }

    fn bottom(&self) -> Self {
        Interval::bottom()
    }

    fn is_top(&self) -> bool {
        self.low == Bound::NegInf && self.high == Bound::PosInf
    }

    fn is_bottom(&self) -> bool {
        self.is_empty()
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        Ok(self.join(other))
    }

    fn widening_aux(&self, other: &Self) -> Result<Self> {
        Ok(self.widen(other))
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        Ok(other.includes(self))
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        Ok(self.meet(other))
    }
}

impl NonRelationalElement for Interval {
    fn eval_constant(&self, constant: &Constant, _pp: &CodeLocation) -> Result<Self> {
        match constant {
            Constant::Int(n) => Ok(Interval::constant(*n)),
            _ => Ok(Interval::top()),
        }
    }

    fn eval_unary(&self, op: UnaryOp, arg: &Self, _pp: &CodeLocation) -> Result<Self> {
        match op {
            UnaryOp::Neg => Ok(arg.neg()),
            UnaryOp::Not => Ok(Interval::top()),
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Self, right: &Self, _pp: &CodeLocation) -> Result<Self> {
        let result = match op {
            BinaryOp::Add => left.add(right),
            BinaryOp::Sub => left.sub(right),
            BinaryOp::Mul => left.mul(right),
            BinaryOp::Div => left.div(right),
            BinaryOp::Mod => match (left.as_constant(), right.as_constant()) {
                (Some(a), Some(b)) if b != 0 => a.checked_rem(b).map_or(Interval::top(), Interval::constant),
                _ => Interval::top(),
            },
            _ => Interval::top(),
        };
        Ok(result)
    }

    fn satisfies_binary(&self, op: BinaryOp, left: &Self, right: &Self, pp: &CodeLocation) -> Result<Satisfiability> {
        let sat = match op {
            BinaryOp::Eq => {
                if left.as_constant().is_some() && left == right {
                    Satisfiability::Satisfied
                } else if left.meet(right).is_empty() {
                    Satisfiability::NotSatisfied
                } else {
                    Satisfiability::Unknown
                }
            }
            BinaryOp::Ne => return Ok(self.satisfies_binary(BinaryOp::Eq, left, right, pp)?.negate()),
            BinaryOp::Lt => {
                if left.high < right.low {
                    Satisfiability::Satisfied
                } else if left.low >= right.high {
                    Satisfiability::NotSatisfied
                } else {
                    Satisfiability::Unknown
                }
            }
            BinaryOp::Le => {
                if left.high <= right.low {
                    Satisfiability::Satisfied
                } else if left.low > right.high {
                    Satisfiability::NotSatisfied
                } else {
                    Satisfiability::Unknown
                }
            }
            BinaryOp::Gt => return self.satisfies_binary(BinaryOp::Lt, right, left, pp),
            BinaryOp::Ge => return self.satisfies_binary(BinaryOp::Le, right, left, pp),
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
        let mut result = env.clone();
        if let Some(id) = left.as_identifier() {
            let other = env.eval(right, pp)?;
            let refined = env.get(id).refine(op, &other);
            if refined.is_empty() {
                return Ok(env.bottom());
            }
            result.set(id.clone(), refined);
        }
        if let Some(id) = right.as_identifier() {
            let other = env.eval(left, pp)?;
            let refined = result.get(id).refine(op.flip(), &other);
            if refined.is_empty() {
                return Ok(env.bottom());
            }
            result.set(id.clone(), refined);
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
    fn test_interval_operations() {
        let i1 = Interval::range(0, 10);
        let i2 = Interval::range(5, 15);

        assert_eq!(i1.join(&i2), Interval::range(0, 15));
        assert_eq!(i1.meet(&i2), Interval::range(5, 10));
        assert_eq!(i1.widen(&i2), Interval::new(Bound::Finite(0), Bound::PosInf));
        assert!(Interval::range(3, 1).is_empty());
    }

    #[test]
    fn test_overflow_goes_to_infinity() {
        let max = Interval::constant(i64::MAX);
        let min = Interval::constant(i64::MIN);
        let one = Interval::constant(1);
        assert_eq!(max.add(&one), Interval::new(Bound::Finite(i64::MAX), Bound::PosInf));
        assert_eq!(min.sub(&one), Interval::new(Bound::NegInf, Bound::Finite(i64::MIN)));
        assert_eq!(max.mul(&Interval::constant(-2)), Interval::new(Bound::NegInf, Bound::Finite(i64::MIN)));
        assert_eq!(min.neg(), Interval::new(Bound::Finite(i64::MAX), Bound::PosInf));
        assert_eq!(min.div(&Interval::constant(-1)), Interval::new(Bound::Finite(i64::MAX), Bound::PosInf));
        assert_eq!(Interval::range(0, i64::MAX).add(&one), Interval::new(Bound::Finite(1), Bound::PosInf));
        assert!(max.add(&Interval::bottom()).is_empty());
        assert_eq!(Bound::Finite(i64::MAX).add(&Bound::Finite(1)), Bound::PosInf);
        assert_eq!(Bound::Finite(i64::MIN).mul(&Bound::Finite(2)), Bound::NegInf);
    }

    #[test]
    fn test_arithmetic() {
        let a = Interval::range(-2, 3);
        let b = Interval::range(4, 5);
        assert_eq!(a.add(&b), Interval::range(2, 8));
        assert_eq!(a.sub(&b), Interval::range(-7, -1));
        assert_eq!(a.mul(&b), Interval::range(-10, 15));
        assert_eq!(b.div(&Interval::constant(2)), Interval::range(2, 2));
        assert!(b.div(&a).is_top());
        let unbounded = Interval::new(Bound::Finite(1), Bound::PosInf);
        assert_eq!(unbounded.mul(&Interval::constant(-2)), Interval::new(Bound::NegInf, Bound::Finite(-2)));
    }

    #[test]
    fn test_interval_lattice_laws() {
        let samples = vec![
            Interval::bottom(),
            Interval::top(),
            Interval::constant(0),
            Interval::constant(5),
            Interval::range(0, 10),
            Interval::range(-5, 5),
            Interval::range(10, 20),
            Interval::new(Bound::Finite(0), Bound::PosInf),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn test_widening_reaches_infinity() {
        let mut x = Interval::constant(0);
        for i in 1..4 {
            x = x.widening(&Interval::range(0, i)).unwrap();
        }
        assert_eq!(x, Interval::new(Bound::Finite(0), Bound::PosInf));
    }

    #[test]
    fn test_satisfies() {
        let t = Interval::top();
        let sat = |op, a: Interval, b: Interval| t.satisfies_binary(op, &a, &b, &pp()).unwrap();
        assert_eq!(sat(BinaryOp::Lt, Interval::range(0, 3), Interval::range(4, 9)), Satisfiability::Satisfied);
        assert_eq!(sat(BinaryOp::Lt, Interval::range(4, 9), Interval::range(0, 4)), Satisfiability::NotSatisfied);
        assert_eq!(sat(BinaryOp::Gt, Interval::range(4, 9), Interval::range(0, 3)), Satisfiability::Satisfied);
        assert_eq!(sat(BinaryOp::Eq, Interval::constant(2), Interval::constant(2)), Satisfiability::Satisfied);
        assert_eq!(sat(BinaryOp::Ne, Interval::constant(2), Interval::range(3, 5)), Satisfiability::Satisfied);
        assert_eq!(sat(BinaryOp::Le, Interval::range(0, 5), Interval::range(3, 9)), Satisfiability::Unknown);
    }

    #[test]
    fn test_assume_refines_both_sides() {
        let x = Identifier::variable("x", Type::Numeric);
        let y = Identifier::variable("y", Type::Numeric);
        let env = Environment::new(Interval::top())
            .with(x.clone(), Interval::range(0, 100))
            .with(y.clone(), Interval::range(10, 20));

        let cond = SymbolicExpr::binary(BinaryOp::Lt, SymbolicExpr::Identifier(x.clone()), SymbolicExpr::Identifier(y.clone()));
        let refined = env.assume(&cond, &pp()).unwrap();
        assert_eq!(refined.get(&x), Interval::range(0, 19));
        assert_eq!(refined.get(&y), Interval::range(10, 20));

        let negated = env.assume(&SymbolicExpr::not(cond), &pp()).unwrap();
        assert_eq!(negated.get(&x), Interval::range(10, 100));

        let ne = SymbolicExpr::binary(BinaryOp::Ne, SymbolicExpr::Identifier(x.clone()), SymbolicExpr::int(0));
        assert_eq!(env.assume(&ne, &pp()).unwrap().get(&x), Interval::range(1, 100));
    }
}
