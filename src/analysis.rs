//! Analysis runner.
//!
//! [`Analysis`] wires a program, an initial abstract state and a context token family
//! into one run:
//!
//! 1. the setup is validated (the program has entry points, the working directory exists),
//! 2. every [`SyntacticCheck`] visits every statement,
//! 3. the whole-program fixpoint is computed by a [`ContextSensitiveAnalysis`],
//! 4. every [`SemanticCheck`] visits every analyzed statement with its per-context results.
//!
//! Checks report [`Warning`]s into a [`CheckTool`]. A failure after the setup is wrapped
//! into [`AnalysisError::Execution`] together with the warnings reported so far.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::domain::{HeapDomain, ValueDomain};
use crate::error::{AnalysisError, Result, SemanticError};
use crate::fixpoint::FixpointEngine;
use crate::interprocedural::{CfgResults, ContextSensitiveAnalysis, ContextToken};
use crate::program::{Cfg, CodeLocation, Program, StatementId};
use crate::state::AbstractState;

/// Issue reported by a check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Warning {
    location: Option<CodeLocation>,
    message: String,
}

impl Warning {
    pub fn new(location: Option<CodeLocation>, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
        }
    }

    pub fn location(&self) -> Option<&CodeLocation> {
        self.location.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "[{}] {}", location, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Sink of the warnings reported by checks.
#[derive(Debug, Clone, Default)]
pub struct CheckTool {
    warnings: Vec<Warning>,
    discard: bool,
}

impl CheckTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tool dropping every warning.
    pub fn discarding() -> Self {
        Self {
            warnings: Vec::new(),
            discard: true,
        }
    }

    pub fn warn_on(&mut self, location: CodeLocation, message: impl Into<String>) {
        self.push(Warning::new(Some(location), message));
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Warning::new(None, message));
    }

    fn push(&mut self, warning: Warning) {
        if !self.discard {
            self.warnings.push(warning);
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// Check over the program text, run before the fixpoint.
pub trait SyntacticCheck {
    fn before_execution(&mut self, _tool: &mut CheckTool) {}

    fn visit(&mut self, tool: &mut CheckTool, cfg: &Cfg, statement: StatementId);

    fn after_execution(&mut self, _tool: &mut CheckTool) {}
}

/// Check over the fixpoint results, run after the whole-program analysis.
pub trait SemanticCheck<H, V, T> {
    fn before_execution(&mut self, _tool: &mut CheckTool) {}

    /// Visits `statement` of `cfg`, whose results hold one entry per analyzed context.
    fn visit(
        &mut self,
        tool: &mut CheckTool,
        cfg: &Cfg,
        statement: StatementId,
        results: &CfgResults<H, V, T>,
    ) -> Result<()>;

    fn after_execution(&mut self, _tool: &mut CheckTool) {}
}

/// Configuration of an analysis run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    engine: FixpointEngine,
    working_directory: Option<PathBuf>,
    collect_warnings: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            engine: FixpointEngine::default(),
            working_directory: None,
            collect_warnings: true,
        }
    }
}

impl AnalysisConfig {
    pub fn with_engine(mut self, engine: FixpointEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_widening_threshold(mut self, threshold: usize) -> Self {
        self.engine = self.engine.with_widening_threshold(threshold);
        self
    }

    pub fn with_max_iterations(mut self, limit: usize) -> Self {
        self.engine = self.engine.with_max_iterations(limit);
        self
    }

    /// Directory handed to checks that produce files. Must exist when the run starts.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn with_collect_warnings(mut self, collect: bool) -> Self {
        self.collect_warnings = collect;
        self
    }

    pub fn engine(&self) -> &FixpointEngine {
        &self.engine
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    pub fn collect_warnings(&self) -> bool {
        self.collect_warnings
    }
}

/// Outcome of a completed run.
#[derive(Debug)]
pub struct AnalysisReport<H, V, T> {
    warnings: Vec<Warning>,
    analysis: ContextSensitiveAnalysis<H, V, T>,
}

impl<H: HeapDomain, V: ValueDomain, T: ContextToken> AnalysisReport<H, V, T> {
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The interprocedural analysis, holding the per-context results of every CFG.
    pub fn analysis(&self) -> &ContextSensitiveAnalysis<H, V, T> {
        &self.analysis
    }
}

/// Single analysis run over a program.
pub struct Analysis<H, V, T> {
    config: AnalysisConfig,
    syntactic_checks: Vec<Box<dyn SyntacticCheck>>,
    semantic_checks: Vec<Box<dyn SemanticCheck<H, V, T>>>,
}

impl<H: HeapDomain, V: ValueDomain, T: ContextToken> Analysis<H, V, T> {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            syntactic_checks: Vec::new(),
            semantic_checks: Vec::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn add_syntactic_check(&mut self, check: impl SyntacticCheck + 'static) -> &mut Self {
        self.syntactic_checks.push(Box::new(check));
        self
    }

    pub fn add_semantic_check(&mut self, check: impl SemanticCheck<H, V, T> + 'static) -> &mut Self {
        self.semantic_checks.push(Box::new(check));
        self
    }

    fn validate(&self, program: &Program) -> std::result::Result<(), AnalysisError> {
        if program.entrypoints().is_empty() {
            return Err(AnalysisError::setup("the program has no entry points"));
        }
        for &id in program.entrypoints() {
            program.cfg(id).map_err(|e| AnalysisError::setup(e.to_string()))?;
        }
        if let Some(dir) = self.config.working_directory() {
            if !dir.is_dir() {
                return Err(AnalysisError::setup(format!(
                    "working directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }

    /// Analyzes `program` from `initial`, separating contexts with the token family of
    /// `token`.
    pub fn run(
        &mut self,
        program: &Program,
        initial: &AbstractState<H, V>,
        token: T,
    ) -> std::result::Result<AnalysisReport<H, V, T>, AnalysisError> {
        self.validate(program)?;
        let mut tool = if self.config.collect_warnings {
            CheckTool::new()
        } else {
            CheckTool::discarding()
        };

        info!("running {} syntactic check(s)", self.syntactic_checks.len());
        for check in &mut self.syntactic_checks {
            check.before_execution(&mut tool);
            for cfg in program.cfgs() {
                for statement in 0..cfg.len() {
                    check.visit(&mut tool, cfg, statement);
                }
            }
            check.after_execution(&mut tool);
        }

        info!("computing the whole-program fixpoint");
        let analysis = ContextSensitiveAnalysis::new(self.config.engine, token);
        if let Err(source) = analysis.run(program, initial) {
            return Err(abort(source, tool));
        }
        info!(
            "fixpoint reached: {} solver run(s), {} cache hit(s)",
            analysis.misses(),
            analysis.hits()
        );

        info!("running {} semantic check(s)", self.semantic_checks.len());
        if let Err(source) = self.run_semantic_checks(program, &analysis, &mut tool) {
            return Err(abort(source, tool));
        }

        let warnings = tool.into_warnings();
        info!("analysis finished with {} warning(s)", warnings.len());
        Ok(AnalysisReport { warnings, analysis })
    }

    fn run_semantic_checks(
        &mut self,
        program: &Program,
        analysis: &ContextSensitiveAnalysis<H, V, T>,
        tool: &mut CheckTool,
    ) -> Result<()> {
        for check in &mut self.semantic_checks {
            check.before_execution(tool);
            for id in analysis.analyzed_cfgs() {
                let cfg = program.cfg(id)?;
                let Some(results) = analysis.results(id) else {
                    continue;
                };
                for statement in 0..cfg.len() {
                    check.visit(tool, cfg, statement, &results)?;
                }
            }
            check.after_execution(tool);
        }
        Ok(())
    }
}

fn abort(source: SemanticError, tool: CheckTool) -> AnalysisError {
    warn!("analysis aborted: {}", source);
    AnalysisError::Execution {
        source,
        warnings: tool.into_warnings(),
    }
}
