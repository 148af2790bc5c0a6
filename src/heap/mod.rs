//! Heap abstractions.
//!
//! | Domain | Objects | Updates |
//! |--------|---------|---------|
//! | [`PointBasedHeap`] | one site per allocating program point (and field) | strong until a site is allocated twice |
//! | [`MonolithicHeap`] | a single summary location | always weak |

mod monolithic;
mod point_based;
mod sites;

pub use monolithic::MonolithicHeap;
pub use point_based::{FieldSensitivity, PointBasedHeap};
pub use sites::AllocationSites;

use crate::error::Result;
use crate::symbolic::{ExpressionSet, SymbolicExpr};

/// Rewrites the operands of a compound expression with `leaf` and rebuilds every
/// combination of the alternatives.
pub(crate) fn rewrite_compound(
    expr: &SymbolicExpr,
    leaf: &dyn Fn(&SymbolicExpr) -> Result<ExpressionSet>,
) -> Result<ExpressionSet> {
    let result = match expr {
        SymbolicExpr::Unary(op, arg) => rewrite_compound(arg, leaf)?
            .into_iter()
            .map(|a| SymbolicExpr::unary(*op, a))
            .collect(),
        SymbolicExpr::Binary(op, left, right) => {
            let left = rewrite_compound(left, leaf)?;
            let right = rewrite_compound(right, leaf)?;
            let mut result = ExpressionSet::new();
            for l in &left {
                for r in &right {
                    result.insert(SymbolicExpr::binary(*op, l.clone(), r.clone()));
                }
            }
            result
        }
        SymbolicExpr::Ternary(op, first, second, third) => {
            let first = rewrite_compound(first, leaf)?;
            let second = rewrite_compound(second, leaf)?;
            let third = rewrite_compound(third, leaf)?;
            let mut result = ExpressionSet::new();
            for a in &first {
                for b in &second {
                    for c in &third {
                        result.insert(SymbolicExpr::ternary(*op, a.clone(), b.clone(), c.clone()));
                    }
                }
            }
            result
        }
        other => leaf(other)?,
    };
    Ok(result)
}
