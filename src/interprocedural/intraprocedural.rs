use crate::domain::{HeapDomain, ValueDomain};
use crate::error::Result;
use crate::fixpoint::FixpointEngine;
use crate::lattice::Lattice;
use crate::program::{Call, CfgId, CodeLocation, Program};
use crate::results::AnalyzedCfg;
use crate::state::AbstractState;

use super::{ContextInsensitiveToken, InterproceduralAnalysis};

/// Analysis of single CFGs in isolation. No call is resolved, so every call is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntraproceduralAnalysis {
    engine: FixpointEngine,
}

impl IntraproceduralAnalysis {
    pub fn new(engine: FixpointEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &FixpointEngine {
        &self.engine
    }

    pub fn analyze<H: HeapDomain, V: ValueDomain>(
        &self,
        program: &Program,
        cfg: CfgId,
        entry: &AbstractState<H, V>,
    ) -> Result<AnalyzedCfg<H, V>> {
        self.engine.run(program, cfg, entry, self, &ContextInsensitiveToken)
    }
}

impl<H: HeapDomain, V: ValueDomain> InterproceduralAnalysis<H, V> for IntraproceduralAnalysis {
    type Token = ContextInsensitiveToken;

    fn resolve(&self, _program: &Program, _call: &Call) -> Result<Vec<CfgId>> {
        Ok(Vec::new())
    }

    fn call_semantics(
        &self,
        _program: &Program,
        _caller: &ContextInsensitiveToken,
        _site: &CodeLocation,
        _callee: CfgId,
        entry: &AbstractState<H, V>,
    ) -> Result<AbstractState<H, V>> {
        Ok(entry.top())
    }
}
