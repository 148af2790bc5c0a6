use std::collections::BTreeMap;
use std::rc::Rc;

use log::debug;

use super::ContextToken;
use crate::domain::{HeapDomain, ValueDomain};
use crate::error::{Result, SemanticError};
use crate::lattice::Lattice;
use crate::results::AnalyzedCfg;

/// Results of one CFG, one per context token.
///
/// Results only grow: storing a result for a token that already has one merges the two
/// (join, then widening once a token has been updated more than `widening_threshold`
/// times), and a result whose entry state does not cover the recorded one is rejected.
#[derive(Debug, Clone)]
pub struct CfgResults<H, V, T> {
    widening_threshold: usize,
    results: BTreeMap<T, Rc<AnalyzedCfg<H, V>>>,
    updates: BTreeMap<T, usize>,
}

impl<H: HeapDomain, V: ValueDomain, T: ContextToken> CfgResults<H, V, T> {
    pub fn new(widening_threshold: usize) -> Self {
        Self {
            widening_threshold,
            results: BTreeMap::new(),
            updates: BTreeMap::new(),
        }
    }

    pub fn get(&self, token: &T) -> Option<&Rc<AnalyzedCfg<H, V>>> {
        self.results.get(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, &Rc<AnalyzedCfg<H, V>>)> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Number of times the result of `token` was merged with a new one.
    pub fn updates(&self, token: &T) -> usize {
        self.updates.get(token).copied().unwrap_or(0)
    }

    /// Whether the next merge for `token` widens.
    pub fn widens(&self, token: &T) -> bool {
        self.updates(token) >= self.widening_threshold
    }

    /// Stores `result` under `token`, merging it with the previous result, and returns
    /// the stored result.
    pub fn put_result(&mut self, token: T, result: AnalyzedCfg<H, V>) -> Result<Rc<AnalyzedCfg<H, V>>> {
        let Some(previous) = self.results.get(&token) else {
            let stored = Rc::new(result);
            self.results.insert(token, Rc::clone(&stored));
            return Ok(stored);
        };
        if !previous.entry_state().less_or_equal(result.entry_state())? {
            return Err(SemanticError::NonMonotoneEntry {
                cfg: result.name().to_string(),
                token: token.to_string(),
            });
        }
        if result.less_or_equal(previous)? {
            return Ok(Rc::clone(previous));
        }
        let merged = if previous.less_or_equal(&result)? {
            result
        } else if self.widens(&token) {
            debug!("widening results of {} under {}", result.name(), token);
            previous.widening(&result)?
        } else {
            previous.lub(&result)?
        };
        *self.updates.entry(token.clone()).or_insert(0) += 1;
        let stored = Rc::new(merged);
        self.results.insert(token, Rc::clone(&stored));
        Ok(stored)
    }

    /// Join of the results of every context, if any.
    pub fn join_all(&self) -> Result<Option<AnalyzedCfg<H, V>>> {
        let mut joined: Option<AnalyzedCfg<H, V>> = None;
        for result in self.results.values() {
            joined = Some(match joined {
                Some(acc) => acc.lub(result)?,
                None => (**result).clone(),
            });
        }
        Ok(joined)
    }
}
