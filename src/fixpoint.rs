//! Intraprocedural fixpoint.
//!
//! [`FixpointEngine`] computes a post-fixpoint of the statement semantics over one CFG with
//! a worklist ordered by reverse postorder. States only grow: the new state after a
//! statement is the join of the previous one and the freshly computed one. At loop heads
//! (targets of back edges) the join is replaced by widening once the statement has been
//! visited `widening_threshold` times.
//!
//! # Example
//!
//! ```rust
//! use absint_rs::environment::Environment;
//! use absint_rs::fixpoint::FixpointEngine;
//! use absint_rs::heap::MonolithicHeap;
//! use absint_rs::interprocedural::IntraproceduralAnalysis;
//! use absint_rs::numeric::Interval;
//! use absint_rs::program::{CfgBuilder, Expression, Program, Statement};
//! use absint_rs::state::AbstractState;
//! use absint_rs::symbolic::{BinaryOp, Identifier, Type};
//!
//! let x = || Expression::var("x", Type::Numeric);
//! let mut b = CfgBuilder::new("main");
//! b.sequence([
//!     Statement::assign(x(), Expression::int(3)),
//!     Statement::assign(x(), Expression::binary(BinaryOp::Add, x(), Expression::int(4))),
//! ]);
//! let mut program = Program::new();
//! let main = program.add_cfg(b.build());
//!
//! let analysis = IntraproceduralAnalysis::new(FixpointEngine::default());
//! let initial = AbstractState::new(MonolithicHeap::new(), Environment::new(Interval::top()));
//! let result = analysis.analyze(&program, main, &initial).unwrap();
//! let exit = result.exit_state().unwrap();
//! assert_eq!(exit.value().get(&Identifier::variable("x", Type::Numeric)), Interval::constant(7));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, trace, warn};

use crate::domain::{HeapDomain, ValueDomain};
use crate::error::{Result, SemanticError};
use crate::interprocedural::InterproceduralAnalysis;
use crate::lattice::Lattice;
use crate::program::{Cfg, CfgId, EdgeKind, Program, StatementId};
use crate::results::{AnalyzedCfg, StatementStore};
use crate::semantics::Interpreter;
use crate::state::AbstractState;
use crate::symbolic::{ExpressionSet, Identifier};

/// Worklist solver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixpointEngine {
    widening_threshold: usize,
    max_iterations: Option<usize>,
}

impl Default for FixpointEngine {
    fn default() -> Self {
        Self {
            widening_threshold: 5,
            max_iterations: None,
        }
    }
}

impl FixpointEngine {
    /// Number of visits of a loop head before joins turn into widenings.
    pub fn with_widening_threshold(mut self, threshold: usize) -> Self {
        self.widening_threshold = threshold;
        self
    }

    /// Caps the number of statement evaluations of one run.
    pub fn with_max_iterations(mut self, limit: usize) -> Self {
        self.max_iterations = Some(limit);
        self
    }

    pub fn widening_threshold(&self) -> usize {
        self.widening_threshold
    }

    pub fn max_iterations(&self) -> Option<usize> {
        self.max_iterations
    }

    /// Analyzes `cfg` starting every entry point from `entry`.
    pub fn run<H, V, I>(
        &self,
        program: &Program,
        cfg: CfgId,
        entry: &AbstractState<H, V>,
        interproc: &I,
        token: &I::Token,
    ) -> Result<AnalyzedCfg<H, V>>
    where
        H: HeapDomain,
        V: ValueDomain,
        I: InterproceduralAnalysis<H, V>,
    {
        let entries = program
            .cfg(cfg)?
            .entrypoints()
            .iter()
            .map(|&id| (id, entry.clone()))
            .collect();
        self.run_with_entries(program, cfg, &entries, entry, interproc, token)
    }

    /// Analyzes `cfg` with one initial state per entry point. The entry state of the
    /// result is the join of all of them; `template` provides the lattice when `entries`
    /// is empty.
    pub fn run_with_entries<H, V, I>(
        &self,
        program: &Program,
        cfg_id: CfgId,
        entries: &BTreeMap<StatementId, AbstractState<H, V>>,
        template: &AbstractState<H, V>,
        interproc: &I,
        token: &I::Token,
    ) -> Result<AnalyzedCfg<H, V>>
    where
        H: HeapDomain,
        V: ValueDomain,
        I: InterproceduralAnalysis<H, V>,
    {
        let interpreter = Interpreter::new(program, cfg_id, interproc, token)?;
        let cfg = interpreter.cfg();
        debug!("analyzing {} under {}", cfg.name(), token);

        let mut entry_state = template.bottom();
        for state in entries.values() {
            entry_state = entry_state.lub(state)?;
        }

        let order = reverse_postorder(cfg, entries.keys().copied());
        let mut rank = vec![usize::MAX; cfg.len()];
        for (i, &id) in order.iter().enumerate() {
            rank[id] = i;
        }
        let loop_heads: BTreeSet<StatementId> = cfg
            .edges()
            .iter()
            .filter(|e| rank[e.source] != usize::MAX && rank[e.source] >= rank[e.destination])
            .map(|e| e.destination)
            .collect();

        let mut before = StatementStore::new(template);
        let mut after = StatementStore::new(template);
        let mut conditions: BTreeMap<StatementId, (ExpressionSet, Vec<Identifier>)> = BTreeMap::new();
        let mut visits: BTreeMap<StatementId, usize> = BTreeMap::new();
        let mut worklist: BTreeSet<(usize, StatementId)> = entries
            .keys()
            .filter(|&&id| id < cfg.len())
            .map(|&id| (rank[id], id))
            .collect();
        let mut iterations = 0usize;

        while let Some((_, id)) = worklist.pop_first() {
            iterations += 1;
            if let Some(limit) = self.max_iterations {
                if iterations > limit {
                    warn!("{}: no fixpoint after {} iterations", cfg.name(), limit);
                    return Err(SemanticError::IterationLimit {
                        cfg: cfg.name().to_string(),
                        limit,
                    });
                }
            }

            let mut entry = match entries.get(&id) {
                Some(state) => state.clone(),
                None => template.bottom(),
            };
            for edge in cfg.predecessors(id) {
                if !after.contains(edge.source) {
                    continue;
                }
                let post = after.get(edge.source);
                let flowing = match (edge.kind, conditions.get(&edge.source)) {
                    (EdgeKind::Sequential, _) | (_, None) => post.clone(),
                    (kind, Some((condition, metas))) => interpreter.branch(
                        post,
                        condition,
                        metas,
                        kind == EdgeKind::TrueBranch,
                        &cfg.location(edge.source, 0),
                    )?,
                };
                entry = entry.lub(&flowing)?;
            }

            let outcome = interpreter.statement(id, &entry)?;
            match outcome.condition {
                Some(condition) => {
                    conditions.insert(id, (condition, outcome.metas));
                }
                None => {
                    conditions.remove(&id);
                }
            }
            before.put(id, entry);

            let count = visits.entry(id).or_insert(0);
            *count += 1;
            let changed = if after.contains(id) {
                let previous = after.get(id);
                let next = if loop_heads.contains(&id) && *count > self.widening_threshold {
                    trace!("{}: widening at {}", cfg.name(), id);
                    previous.widening(&outcome.state)?
                } else {
                    previous.lub(&outcome.state)?
                };
                if next.less_or_equal(previous)? {
                    None
                } else {
                    Some(next)
                }
            } else {
                Some(outcome.state)
            };

            if let Some(state) = changed {
                trace!("{}: state after {} changed: {:?}", cfg.name(), id, state);
                after.put(id, state);
                for edge in cfg.successors(id) {
                    worklist.insert((rank[edge.destination], edge.destination));
                }
            }
        }
        debug!("{}: fixpoint reached after {} iterations", cfg.name(), iterations);

        Ok(AnalyzedCfg::new(cfg_id, cfg, entry_state, before, after))
    }
}

/// Frame on the exploration stack.
struct StackFrame {
    node: StatementId,
    pending: Vec<StatementId>,
}

/// Statements reachable from `roots`, in reverse postorder.
fn reverse_postorder(cfg: &Cfg, roots: impl IntoIterator<Item = StatementId>) -> Vec<StatementId> {
    let frame = |node: StatementId| {
        let mut pending: Vec<StatementId> = cfg.successors(node).map(|e| e.destination).collect();
        pending.reverse();
        StackFrame { node, pending }
    };
    let mut visited = vec![false; cfg.len()];
    let mut postorder = Vec::with_capacity(cfg.len());
    for root in roots {
        if root >= cfg.len() || visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![frame(root)];
        while let Some(top) = stack.last_mut() {
            match top.pending.pop() {
                Some(next) => {
                    if !visited[next] {
                        visited[next] = true;
                        stack.push(frame(next));
                    }
                }
                None => {
                    postorder.push(top.node);
                    stack.pop();
                }
            }
        }
    }
    postorder.reverse();
    postorder
}
