//! # absint-rs: Abstract Interpretation in Rust
//!
//! **`absint-rs`** is a framework for building static analyses by **abstract interpretation**.
//! It provides the lattice algebra, a heap abstraction, the composition of heap and value domains,
//! an intraprocedural fixpoint solver and a context-sensitive interprocedural analysis.
//! Concrete value domains are plugged in by implementing a handful of traits.
//!
//! ## What is abstract interpretation?
//!
//! An abstract interpreter executes a program over *abstract values* instead of concrete ones.
//! Each abstract value over-approximates a set of concrete states, and abstract values are ordered in a **lattice**.
//! Loops are handled by computing a fixpoint; **widening** guarantees that the computation terminates even on lattices of infinite height.
//!
//! ## Key Features
//!
//! - **Trait-Based Domains**: Every abstract value implements [`Lattice`][crate::lattice::Lattice]. Transformers come from [`SemanticDomain`][crate::domain::SemanticDomain], split into heap and value capabilities.
//! - **Non-Relational Lifting**: Any [`NonRelationalElement`][crate::environment::NonRelationalElement] becomes a full value domain through [`Environment`][crate::environment::Environment].
//! - **Strong and Weak Updates**: The [`PointBasedHeap`][crate::heap::PointBasedHeap] names objects by allocation site and turns a site weak as soon as it may denote more than one object.
//! - **Interprocedural**: [`ContextSensitiveAnalysis`][crate::interprocedural::ContextSensitiveAnalysis] caches one result per procedure and call-string context, and only ever grows it.
//! - **Explicit Errors**: Every core operation returns [`Result`][crate::error::Result]; nothing panics on bad input.
//!
//! ## Quick Start
//!
//! Add `absint-rs` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! absint-rs = "0.1"
//! ```
//!
//! ## Basic Usage
//!
//! ```rust
//! use absint_rs::environment::Environment;
//! use absint_rs::fixpoint::FixpointEngine;
//! use absint_rs::heap::PointBasedHeap;
//! use absint_rs::interprocedural::{ContextInsensitiveToken, ContextSensitiveAnalysis};
//! use absint_rs::numeric::Interval;
//! use absint_rs::program::{CfgBuilder, Expression, Program, Statement};
//! use absint_rs::state::AbstractState;
//! use absint_rs::symbolic::{BinaryOp, Identifier, Type};
//!
//! // 1. Build the program: x = 3; y = x + 4;
//! let x = || Expression::var("x", Type::Numeric);
//! let mut b = CfgBuilder::new("main");
//! b.sequence([
//!     Statement::assign(x(), Expression::int(3)),
//!     Statement::assign(
//!         Expression::var("y", Type::Numeric),
//!         Expression::binary(BinaryOp::Add, x(), Expression::int(4)),
//!     ),
//! ]);
//! let mut program = Program::new();
//! let main = program.add_cfg(b.build());
//! program.add_entrypoint(main);
//!
//! // 2. Choose the domains: point-based heap, intervals for values
//! let initial = AbstractState::new(PointBasedHeap::field_sensitive(), Environment::new(Interval::top()));
//!
//! // 3. Run the whole-program analysis
//! let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
//! analysis.run(&program, &initial).unwrap();
//!
//! // 4. Query the results
//! let result = analysis.result(main, &ContextInsensitiveToken).unwrap();
//! let exit = result.exit_state().unwrap();
//! assert_eq!(exit.value().get(&Identifier::variable("y", Type::Numeric)), Interval::constant(7));
//! ```
//!
//! ## Core Components
//!
//! - **[`lattice`]**: The [`Lattice`][crate::lattice::Lattice] trait and the lattice-law checker.
//! - **[`domain`]**: Capability traits of heap and value domains.
//! - **[`combination`]**: [`CartesianProduct`][crate::combination::CartesianProduct] of two value domains.
//! - **[`inference`]**: [`InferredTypes`][crate::inference::InferredTypes], runtime type inference as a non-relational domain.
//! - **[`state`]**: [`AbstractState`][crate::state::AbstractState], the composition of one heap and one value domain.
//! - **[`fixpoint`]**: The worklist solver over one CFG.
//! - **[`interprocedural`]**: Call resolution, context tokens and the result cache.
//! - **[`analysis`]**: The runner with syntactic and semantic checks.
//!
//! For the order in which the heap and the value domain see an expression, check the [`state`] module documentation.

pub mod analysis;
pub mod combination;
pub mod dataflow;
pub mod domain;
pub mod environment;
pub mod error;
pub mod fixpoint;
pub mod heap;
pub mod inference;
pub mod interprocedural;
pub mod lattice;
pub mod numeric;
pub mod program;
pub mod results;
pub mod satisfiability;
pub mod semantics;
pub mod state;
pub mod symbolic;
