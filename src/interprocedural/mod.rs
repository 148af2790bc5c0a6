//! Interprocedural analysis.
//!
//! The statement semantics hand every resolved call to an [`InterproceduralAnalysis`],
//! which decides how the callee is analyzed:
//!
//! - [`IntraproceduralAnalysis`] resolves nothing: every call is open and erases the state.
//! - [`ContextSensitiveAnalysis`] analyzes callees on demand, caching one fixpoint result
//!   per `(CFG, context token)` in [`CfgResults`] and growing cached entries monotonically.

mod call_graph;
mod context;
mod intraprocedural;
mod results;
mod token;

pub use call_graph::{CallGraph, NameCallGraph};
pub use context::ContextSensitiveAnalysis;
pub use intraprocedural::IntraproceduralAnalysis;
pub use results::CfgResults;
pub use token::{CallStringToken, ContextInsensitiveToken, ContextToken};

use crate::domain::{HeapDomain, ValueDomain};
use crate::error::Result;
use crate::program::{Call, CfgId, CodeLocation, Program};
use crate::state::AbstractState;

pub trait InterproceduralAnalysis<H: HeapDomain, V: ValueDomain> {
    type Token: ContextToken;

    /// CFGs `call` may invoke. Empty for open calls.
    fn resolve(&self, program: &Program, call: &Call) -> Result<Vec<CfgId>>;

    /// Exit state of `callee` invoked at `site` from context `caller`, given its entry
    /// state (callee scope, formals already bound).
    fn call_semantics(
        &self,
        program: &Program,
        caller: &Self::Token,
        site: &CodeLocation,
        callee: CfgId,
        entry: &AbstractState<H, V>,
    ) -> Result<AbstractState<H, V>>;
}
