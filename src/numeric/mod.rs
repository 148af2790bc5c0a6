//! Sample non-relational numeric domains.
//!
//! | Domain | Height | Widening | Refines on `assume` |
//! |--------|--------|----------|---------------------|
//! | [`Interval`] | infinite | bounds jump to ±∞ | comparisons against identifiers |
//! | [`Parity`] | finite (4 elements) | lub | equalities |
//!
//! Both implement [`NonRelationalElement`](crate::environment::NonRelationalElement) and are
//! used through [`Environment`](crate::environment::Environment).

mod interval;
mod parity;

pub use interval::{Bound, Interval};
pub use parity::Parity;
