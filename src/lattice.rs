//! Lattice algebra.
//!
//! Every abstract value of the framework implements [`Lattice`]. Domain authors
//! implement the `*_aux` hooks only; the provided [`lub`](Lattice::lub),
//! [`widening`](Lattice::widening), [`less_or_equal`](Lattice::less_or_equal) and
//! [`glb`](Lattice::glb) resolve the degenerate cases (top, bottom, identical or
//! already comparable operands) before the hooks are ever invoked, so hooks may assume
//! both operands are "ordinary" elements.
//!
//! # Lattice Structure
//!
//! ```text
//!        ⊤
//!      / | \
//!     .  .  .     lub (⊔) goes up, glb (⊓) goes down
//!      \ | /
//!        ⊥
//! ```
//!
//! For infinite-height lattices the widening operator (`∇`) must over-approximate the
//! join and forbid infinite strictly ascending chains. The default widening is the lub,
//! which is only correct for lattices of finite height.

use std::fmt;

use crate::error::Result;

/// Abstract value with a partial order, join and widening.
///
/// Operations take `&self` and return new values: abstract values are immutable
/// snapshots and never mutated in place by the algebra.
pub trait Lattice: Clone + fmt::Debug + PartialEq + Sized {
    /// Greatest element of the lattice this value belongs to.
    fn top(&self) -> Self;

    /// Least element of the lattice this value belongs to.
    fn bottom(&self) -> Self;

    fn is_top(&self) -> bool;

    fn is_bottom(&self) -> bool;

    /// Join of two ordinary elements.
    fn lub_aux(&self, other: &Self) -> Result<Self>;

    /// Widening of two ordinary elements. Defaults to the join.
    fn widening_aux(&self, other: &Self) -> Result<Self> {
        self.lub_aux(other)
    }

    /// Partial order on two ordinary elements.
    fn less_or_equal_aux(&self, other: &Self) -> Result<bool>;

    /// Meet of two ordinary incomparable elements. Defaults to bottom.
    fn glb_aux(&self, _other: &Self) -> Result<Self> {
        Ok(self.bottom())
    }

    /// Least upper bound (`⊔`).
    fn lub(&self, other: &Self) -> Result<Self> {
        if other.is_bottom() || self.is_top() || self == other {
            return Ok(self.clone());
        }
        if self.is_bottom() || other.is_top() {
            return Ok(other.clone());
        }
        if self.less_or_equal_aux(other)? {
            return Ok(other.clone());
        }
        if other.less_or_equal_aux(self)? {
            return Ok(self.clone());
        }
        self.lub_aux(other)
    }

    /// Widening (`∇`): `self` is the previous approximation, `other` the new one.
    ///
    /// Only "the new value is already covered" short-circuits here: returning `other`
    /// when `self ⊑ other` would turn the widening back into a plain join.
    fn widening(&self, other: &Self) -> Result<Self> {
        if other.is_bottom() || self.is_top() || self == other {
            return Ok(self.clone());
        }
        if self.is_bottom() || other.is_top() {
            return Ok(other.clone());
        }
        if other.less_or_equal_aux(self)? {
            return Ok(self.clone());
        }
        self.widening_aux(other)
    }

    /// Partial order (`⊑`).
    fn less_or_equal(&self, other: &Self) -> Result<bool> {
        if self.is_bottom() || other.is_top() || self == other {
            return Ok(true);
        }
        if self.is_top() || other.is_bottom() {
            return Ok(false);
        }
        self.less_or_equal_aux(other)
    }

    /// Greatest lower bound (`⊓`).
    fn glb(&self, other: &Self) -> Result<Self> {
        if other.is_top() || self.is_bottom() || self == other {
            return Ok(self.clone());
        }
        if self.is_top() || other.is_bottom() {
            return Ok(other.clone());
        }
        if self.less_or_equal_aux(other)? {
            return Ok(self.clone());
        }
        if other.less_or_equal_aux(self)? {
            return Ok(other.clone());
        }
        self.glb_aux(other)
    }
}

/// Joins all elements of an iterator, starting from `start`.
pub fn lub_all<'a, L, I>(start: L, items: I) -> Result<L>
where
    L: Lattice + 'a,
    I: IntoIterator<Item = &'a L>,
{
    let mut acc = start;
    for item in items {
        acc = acc.lub(item)?;
    }
    Ok(acc)
}

/// Law checks for domain authors.
///
/// These helpers panic on the first violated law, which makes them suitable for unit
/// and integration tests of custom domains.
pub mod laws {
    use super::Lattice;

    /// Asserts the partial-order, join and widening laws over all pairs of `samples`.
    pub fn check_lattice_laws<L: Lattice>(samples: &[L]) {
        for x in samples {
            let top = x.top();
            let bottom = x.bottom();
            assert!(x.less_or_equal(x).unwrap(), "reflexivity failed for {:?}", x);
            assert!(bottom.less_or_equal(x).unwrap(), "bottom ⊑ {:?} failed", x);
            assert!(x.less_or_equal(&top).unwrap(), "{:?} ⊑ top failed", x);
            assert_eq!(&x.lub(x).unwrap(), x, "lub idempotence failed for {:?}", x);
            assert_eq!(&x.lub(&bottom).unwrap(), x, "bottom is not neutral for {:?}", x);
            assert!(x.lub(&top).unwrap().is_top(), "top is not absorbing for {:?}", x);

            for y in samples {
                let join = x.lub(y).unwrap();
                assert!(x.less_or_equal(&join).unwrap(), "{:?} ⋢ {:?} ⊔ {:?}", x, x, y);
                assert!(y.less_or_equal(&join).unwrap(), "{:?} ⋢ {:?} ⊔ {:?}", y, x, y);

                let widened = x.widening(y).unwrap();
                assert!(x.less_or_equal(&widened).unwrap(), "{:?} ⋢ {:?} ∇ {:?}", x, x, y);
                assert!(y.less_or_equal(&widened).unwrap(), "{:?} ⋢ {:?} ∇ {:?}", y, x, y);

                let meet = x.glb(y).unwrap();
                assert!(meet.less_or_equal(x).unwrap(), "{:?} ⊓ {:?} ⋢ {:?}", x, y, x);
                assert!(meet.less_or_equal(y).unwrap(), "{:?} ⊓ {:?} ⋢ {:?}", x, y, y);

                if x.less_or_equal(y).unwrap() && y.less_or_equal(x).unwrap() {
                    assert_eq!(x, y, "antisymmetry failed for {:?} and {:?}", x, y);
                }
            }
        }
    }
}
