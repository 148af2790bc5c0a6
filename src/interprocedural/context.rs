use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use log::{debug, info};

use crate::domain::{HeapDomain, SemanticDomain, ValueDomain};
use crate::error::Result;
use crate::fixpoint::FixpointEngine;
use crate::lattice::Lattice;
use crate::program::{Call, CfgId, CodeLocation, Program};
use crate::results::AnalyzedCfg;
use crate::state::AbstractState;
use crate::symbolic::{Identifier, SymbolicExpr};

use super::{CallGraph, CfgResults, ContextToken, InterproceduralAnalysis, NameCallGraph};

type Key<T> = (CfgId, T);

/// Whole-program analysis with one cached fixpoint result per `(CFG, context token)`.
///
/// Callees are analyzed on demand, when a call reaches them with an entry state that the
/// cached result of their context does not cover. The cache only grows.
///
/// A call to a `(CFG, token)` whose analysis is still running (recursion) does not enter
/// the solver again: its entry state is recorded as pending and the current cached exit
/// state (bottom on the first round) is handed out. When the running analysis ends, it is
/// repeated as long as a pending entry is not covered by the stored entry, or the stored
/// exit is not covered by what recursive calls were given.
///
/// Interior mutability keeps the cache behind `&self`: the solver of a callee runs while
/// the solver of its caller holds a shared reference to the analysis.
#[derive(Debug)]
pub struct ContextSensitiveAnalysis<H, V, T, G = NameCallGraph> {
    engine: FixpointEngine,
    call_graph: G,
    token: T,
    results: RefCell<BTreeMap<CfgId, CfgResults<H, V, T>>>,
    in_progress: RefCell<BTreeSet<Key<T>>>,
    pending: RefCell<BTreeMap<Key<T>, AbstractState<H, V>>>,
    handed_out: RefCell<BTreeMap<Key<T>, AbstractState<H, V>>>,
    hits: Cell<usize>,
    misses: Cell<usize>,
}

impl<H: HeapDomain, V: ValueDomain, T: ContextToken> ContextSensitiveAnalysis<H, V, T, NameCallGraph> {
    pub fn new(engine: FixpointEngine, token: T) -> Self {
        Self::with_call_graph(engine, NameCallGraph, token)
    }
}

impl<H, V, T, G> ContextSensitiveAnalysis<H, V, T, G>
where
    H: HeapDomain,
    V: ValueDomain,
    T: ContextToken,
    G: CallGraph,
{
    /// `token` only selects the token family; the program entry points are analyzed
    /// under `token.empty()`.
    pub fn with_call_graph(engine: FixpointEngine, call_graph: G, token: T) -> Self {
        Self {
            engine,
            call_graph,
            token,
            results: RefCell::new(BTreeMap::new()),
            in_progress: RefCell::new(BTreeSet::new()),
            pending: RefCell::new(BTreeMap::new()),
            handed_out: RefCell::new(BTreeMap::new()),
            hits: Cell::new(0),
            misses: Cell::new(0),
        }
    }

    pub fn engine(&self) -> &FixpointEngine {
        &self.engine
    }

    /// Get the number of calls answered from the cache.
    pub fn hits(&self) -> usize {
        self.hits.get()
    }

    /// Get the number of calls that (re-)ran the solver.
    pub fn misses(&self) -> usize {
        self.misses.get()
    }

    /// Analyzes every entry point of `program` from `initial`, with unconstrained
    /// parameters.
    pub fn run(&self, program: &Program, initial: &AbstractState<H, V>) -> Result<()> {
        for &id in program.entrypoints() {
            let cfg = program.cfg(id)?;
            info!("analyzing entry point {}", cfg.name());
            let pp = cfg.location(0, 0);
            let mut entry = initial.clone();
            for param in cfg.parameters() {
                let formal = Identifier::Variable(param.clone());
                entry = entry.assign(&formal, &SymbolicExpr::PushAny(param.ty()), &pp)?;
            }
            self.analyze(program, id, self.token.empty(), entry)?;
        }
        Ok(())
    }

    /// All results of `cfg`, one per context.
    pub fn results(&self, cfg: CfgId) -> Option<CfgResults<H, V, T>> {
        self.results.borrow().get(&cfg).cloned()
    }

    pub fn result(&self, cfg: CfgId, token: &T) -> Option<Rc<AnalyzedCfg<H, V>>> {
        self.results.borrow().get(&cfg)?.get(token).cloned()
    }

    /// CFGs with at least one result.
    pub fn analyzed_cfgs(&self) -> Vec<CfgId> {
        self.results.borrow().keys().copied().collect()
    }

    /// Join of the results of `cfg` over all its contexts.
    pub fn joined_result(&self, cfg: CfgId) -> Result<Option<AnalyzedCfg<H, V>>> {
        match self.results.borrow().get(&cfg) {
            Some(results) => results.join_all(),
            None => Ok(None),
        }
    }

    fn widens(&self, cfg: CfgId, token: &T) -> bool {
        self.results.borrow().get(&cfg).is_some_and(|r| r.widens(token))
    }

    /// Entry covering both the recorded entry and `incoming`.
    fn grow(&self, cfg: CfgId, token: &T, recorded: &AbstractState<H, V>, incoming: &AbstractState<H, V>) -> Result<AbstractState<H, V>> {
        if self.widens(cfg, token) {
            recorded.widening(incoming)
        } else {
            recorded.lub(incoming)
        }
    }

    fn store(&self, token: &T, result: AnalyzedCfg<H, V>) -> Result<Rc<AnalyzedCfg<H, V>>> {
        let threshold = self.engine.widening_threshold();
        self.results
            .borrow_mut()
            .entry(result.cfg())
            .or_insert_with(|| CfgResults::new(threshold))
            .put_result(token.clone(), result)
    }

    fn analyze(&self, program: &Program, cfg: CfgId, token: T, entry: AbstractState<H, V>) -> Result<Rc<AnalyzedCfg<H, V>>> {
        let entry = match self.result(cfg, &token) {
            Some(cached) => self.grow(cfg, &token, cached.entry_state(), &entry)?,
            None => entry,
        };
        let key = (cfg, token);
        self.in_progress.borrow_mut().insert(key.clone());
        let result = self.analyze_in_progress(program, &key, entry);
        self.in_progress.borrow_mut().remove(&key);
        self.pending.borrow_mut().remove(&key);
        self.handed_out.borrow_mut().remove(&key);
        result
    }

    fn analyze_in_progress(&self, program: &Program, key: &Key<T>, mut entry: AbstractState<H, V>) -> Result<Rc<AnalyzedCfg<H, V>>> {
        let (cfg, token) = key;
        loop {
            self.misses.set(self.misses.get() + 1);
            let result = self.engine.run(program, *cfg, &entry, self, token)?;
            let stored = self.store(token, result)?;

            let pending = self.pending.borrow_mut().remove(key);
            let handed_out = self.handed_out.borrow_mut().remove(key);
            let mut again = false;
            entry = stored.entry_state().clone();
            if let Some(pending) = pending {
                if !pending.less_or_equal(&entry)? {
                    entry = self.grow(*cfg, token, &entry, &pending)?;
                    again = true;
                }
            }
            if let Some(handed_out) = handed_out {
                if !stored.exit_state()?.less_or_equal(&handed_out)? {
                    again = true;
                }
            }
            if !again {
                return Ok(stored);
            }
            debug!("re-analyzing recursive {} under {}", stored.name(), token);
        }
    }

    /// Exit handed to a recursive call of `key`: the current approximation.
    fn recursive_call(&self, key: Key<T>, entry: &AbstractState<H, V>) -> Result<AbstractState<H, V>> {
        let pending = match self.pending.borrow().get(&key) {
            Some(previous) => previous.lub(entry)?,
            None => entry.clone(),
        };
        self.pending.borrow_mut().insert(key.clone(), pending);

        let exit = match self.result(key.0, &key.1) {
            Some(cached) => cached.exit_state()?,
            None => entry.bottom(),
        };
        let handed_out = match self.handed_out.borrow().get(&key) {
            Some(previous) => previous.lub(&exit)?,
            None => exit.clone(),
        };
        self.handed_out.borrow_mut().insert(key, handed_out);
        Ok(exit)
    }
}

impl<H, V, T, G> InterproceduralAnalysis<H, V> for ContextSensitiveAnalysis<H, V, T, G>
where
    H: HeapDomain,
    V: ValueDomain,
    T: ContextToken,
    G: CallGraph,
{
    type Token = T;

    fn resolve(&self, program: &Program, call: &Call) -> Result<Vec<CfgId>> {
        self.call_graph.resolve(program, call)
    }

    fn call_semantics(
        &self,
        program: &Program,
        caller: &T,
        site: &CodeLocation,
        callee: CfgId,
        entry: &AbstractState<H, V>,
    ) -> Result<AbstractState<H, V>> {
        let token = caller.push_call(site);
        let key = (callee, token);
        if self.in_progress.borrow().contains(&key) {
            debug!("{}: recursive call to #{} under {}", site, callee, key.1);
            return self.recursive_call(key, entry);
        }

        let (callee, token) = key;
        if let Some(cached) = self.result(callee, &token) {
            if entry.less_or_equal(cached.entry_state())? {
                debug!("{}: cache hit for {} under {}", site, cached.name(), token);
                self.hits.set(self.hits.get() + 1);
                return cached.exit_state();
            }
        }
        debug!("{}: analyzing #{} under {}", site, callee, token);
        self.analyze(program, callee, token, entry.clone())?.exit_state()
    }
}
