//! Error types.
//!
//! Every core operation returns [`Result`]. Errors are never recovered locally:
//! an abstract value produced by a failing operation is of unknown validity, so the
//! enclosing fixpoint run is aborted and the error travels up to the caller.

use thiserror::Error;

use crate::analysis::Warning;

/// Error raised by a core operation (lattice, domain, solver or interprocedural layer).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    /// A plugged-in domain failed.
    #[error("domain error: {0}")]
    Domain(String),

    /// A domain received an expression it cannot process.
    #[error("{domain} cannot process expression `{expression}`")]
    UnsupportedExpression { domain: &'static str, expression: String },

    /// Two results objects built for different CFG shapes were merged or compared.
    #[error("incompatible results: `{left}` vs `{right}`")]
    IncompatibleResults { left: String, right: String },

    /// A cached entry state for an existing context would have to shrink.
    #[error("cannot reduce the entry state of `{cfg}` under context {token}")]
    NonMonotoneEntry { cfg: String, token: String },

    /// The optional iteration cap of the solver was exceeded.
    #[error("fixpoint of `{cfg}` did not stabilize within {limit} iterations")]
    IterationLimit { cfg: String, limit: usize },

    /// A CFG reference does not resolve in the program.
    #[error("unknown cfg: {0}")]
    UnknownCfg(String),
}

impl SemanticError {
    pub fn domain(msg: impl Into<String>) -> Self {
        SemanticError::Domain(msg.into())
    }

    pub fn unsupported(domain: &'static str, expression: impl ToString) -> Self {
        SemanticError::UnsupportedExpression {
            domain,
            expression: expression.to_string(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, SemanticError>;

/// Top-level failure of a whole analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The run could not start.
    #[error("invalid analysis setup: {0}")]
    Setup(String),

    /// The run started and aborted. Warnings emitted before the failure are kept.
    #[error("analysis aborted: {source}")]
    Execution {
        #[source]
        source: SemanticError,
        warnings: Vec<Warning>,
    },
}

impl AnalysisError {
    pub fn setup(msg: impl Into<String>) -> Self {
        AnalysisError::Setup(msg.into())
    }

    /// Warnings collected before the failure.
    pub fn warnings(&self) -> &[Warning] {
        match self {
            AnalysisError::Setup(_) => &[],
            AnalysisError::Execution { warnings, .. } => warnings,
        }
    }
}
