use crate::error::Result;
use crate::program::{Call, CfgId, Program};

/// Resolution of call expressions to the CFGs they may invoke.
///
/// An empty resolution is an *open* call: its target is not part of the program.
pub trait CallGraph {
    fn resolve(&self, program: &Program, call: &Call) -> Result<Vec<CfgId>>;
}

/// Resolves a call to every CFG with the called name and as many parameters as the call
/// has arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameCallGraph;

impl CallGraph for NameCallGraph {
    fn resolve(&self, program: &Program, call: &Call) -> Result<Vec<CfgId>> {
        Ok(program
            .cfgs()
            .iter()
            .enumerate()
            .filter(|(_, cfg)| cfg.name() == call.target && cfg.parameters().len() == call.args.len())
            .map(|(id, _)| id)
            .collect())
    }
}
