//! Fixpoint results of one CFG.

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{HeapDomain, ValueDomain};
use crate::error::{Result, SemanticError};
use crate::lattice::Lattice;
use crate::program::{Cfg, CfgId, StatementId};
use crate::state::AbstractState;

/// Per-statement states. A statement without a stored state was never reached.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementStore<H, V> {
    states: BTreeMap<StatementId, AbstractState<H, V>>,
    bottom: AbstractState<H, V>,
}

impl<H: HeapDomain, V: ValueDomain> StatementStore<H, V> {
    /// Empty store; `template` only provides the lattice of the states.
    pub fn new(template: &AbstractState<H, V>) -> Self {
        Self {
            states: BTreeMap::new(),
            bottom: template.bottom(),
        }
    }

    pub fn get(&self, id: StatementId) -> &AbstractState<H, V> {
        self.states.get(&id).unwrap_or(&self.bottom)
    }

    pub fn contains(&self, id: StatementId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn put(&mut self, id: StatementId, state: AbstractState<H, V>) {
        self.states.insert(id, state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (StatementId, &AbstractState<H, V>)> {
        self.states.iter().map(|(id, s)| (*id, s))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn combine(
        &self,
        other: &Self,
        op: impl Fn(&AbstractState<H, V>, &AbstractState<H, V>) -> Result<AbstractState<H, V>>,
    ) -> Result<Self> {
        let mut result = self.clone();
        for (id, state) in &other.states {
            let merged = match self.states.get(id) {
                Some(mine) => op(mine, state)?,
                None => state.clone(),
            };
            result.states.insert(*id, merged);
        }
        Ok(result)
    }

    pub fn lub(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a.lub(b))
    }

    pub fn widening(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a.widening(b))
    }

    pub fn less_or_equal(&self, other: &Self) -> Result<bool> {
        for (id, state) in &self.states {
            if !state.less_or_equal(other.get(*id))? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Result of the fixpoint computation over one CFG.
///
/// Answers, for every statement, the state before and after it, and the overall entry and
/// exit states of the CFG. Results of the same CFG can be joined, widened and compared;
/// doing so with the results of another CFG is an error.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedCfg<H, V> {
    cfg: CfgId,
    name: String,
    size: usize,
    normal_exits: Vec<StatementId>,
    entry: AbstractState<H, V>,
    before: StatementStore<H, V>,
    after: StatementStore<H, V>,
}

impl<H: HeapDomain, V: ValueDomain> AnalyzedCfg<H, V> {
    pub fn new(
        id: CfgId,
        cfg: &Cfg,
        entry: AbstractState<H, V>,
        before: StatementStore<H, V>,
        after: StatementStore<H, V>,
    ) -> Self {
        Self {
            cfg: id,
            name: cfg.name().to_string(),
            size: cfg.len(),
            normal_exits: cfg.normal_exitpoints(),
            entry,
            before,
            after,
        }
    }

    pub fn cfg(&self) -> CfgId {
        self.cfg
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// State the analysis of the CFG started from.
    pub fn entry_state(&self) -> &AbstractState<H, V> {
        &self.entry
    }

    /// Join of the states after every normal exit point; bottom if no exit is reached.
    pub fn exit_state(&self) -> Result<AbstractState<H, V>> {
        let mut result = self.entry.bottom();
        for &id in &self.normal_exits {
            result = result.lub(self.after.get(id))?;
        }
        Ok(result)
    }

    pub fn state_before(&self, id: StatementId) -> &AbstractState<H, V> {
        self.before.get(id)
    }

    pub fn state_after(&self, id: StatementId) -> &AbstractState<H, V> {
        self.after.get(id)
    }

    pub fn is_reached(&self, id: StatementId) -> bool {
        self.after.contains(id)
    }

    /// Statements with a post-state, in increasing id order.
    pub fn post_states(&self) -> impl Iterator<Item = (StatementId, &AbstractState<H, V>)> {
        self.after.iter()
    }

    fn check_shape(&self, other: &Self) -> Result<()> {
        if self.cfg != other.cfg || self.size != other.size {
            return Err(SemanticError::IncompatibleResults {
                left: self.name.clone(),
                right: other.name.clone(),
            });
        }
        Ok(())
    }

    pub fn lub(&self, other: &Self) -> Result<Self> {
        self.check_shape(other)?;
        Ok(Self {
            entry: self.entry.lub(&other.entry)?,
            before: self.before.lub(&other.before)?,
            after: self.after.lub(&other.after)?,
            ..self.clone()
        })
    }

    pub fn widening(&self, other: &Self) -> Result<Self> {
        self.check_shape(other)?;
        Ok(Self {
            entry: self.entry.widening(&other.entry)?,
            before: self.before.widening(&other.before)?,
            after: self.after.widening(&other.after)?,
            ..self.clone()
        })
    }

    pub fn less_or_equal(&self, other: &Self) -> Result<bool> {
        self.check_shape(other)?;
        Ok(self.entry.less_or_equal(&other.entry)?
            && self.before.less_or_equal(&other.before)?
            && self.after.less_or_equal(&other.after)?)
    }
}

impl<H: HeapDomain + fmt::Display, V: ValueDomain + fmt::Display> fmt::Display for AnalyzedCfg<H, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for (id, state) in self.after.iter() {
            writeln!(f, "  {:>3}: {}", id, state)?;
        }
        Ok(())
    }
}
