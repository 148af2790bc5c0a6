//! Program model.
//!
//! A [`Program`] is a set of control-flow graphs. Each [`Cfg`] is a directed graph of
//! [`Statement`]s connected by sequential or conditional [`Edge`]s, with designated entry
//! points. Front-ends build CFGs with [`CfgBuilder`].

use std::fmt;

use crate::error::{Result, SemanticError};
use crate::symbolic::{BinaryOp, Constant, Identifier, TernaryOp, Type, UnaryOp, Variable};

/// Index of a statement inside its CFG.
pub type StatementId = usize;

/// Index of a CFG inside its program.
pub type CfgId = usize;

/// Program point: a statement of a CFG, refined by the position of a sub-expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeLocation {
    pub cfg: String,
    pub statement: StatementId,
    pub offset: usize,
}

impl CodeLocation {
    pub fn new(cfg: impl Into<String>, statement: StatementId, offset: usize) -> Self {
        Self {
            cfg: cfg.into(),
            statement,
            offset,
        }
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset == 0 {
            write!(f, "{}:{}", self.cfg, self.statement)
        } else {
            write!(f, "{}:{}.{}", self.cfg, self.statement, self.offset)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: String,
    pub args: Vec<Expression>,
    pub returns: Type,
}

/// Source-level expression. May have side effects (allocations, calls).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(Constant),
    Variable(Variable),
    Unary(UnaryOp, Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Ternary(TernaryOp, Box<Expression>, Box<Expression>, Box<Expression>),
    New(String),
    Field(Box<Expression>, String),
    Call(Call),
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Expression::Literal(Constant::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        Expression::Literal(Constant::Bool(value))
    }

    pub fn null() -> Self {
        Expression::Literal(Constant::Null)
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        Expression::Variable(Variable::new(name, ty))
    }

    pub fn unary(op: UnaryOp, arg: Expression) -> Self {
        Expression::Unary(op, Box::new(arg))
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn ite(cond: Expression, then: Expression, otherwise: Expression) -> Self {
        Expression::Ternary(TernaryOp::Ite, Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    pub fn new_object(type_name: impl Into<String>) -> Self {
        Expression::New(type_name.into())
    }

    pub fn field(receiver: Expression, name: impl Into<String>) -> Self {
        Expression::Field(Box::new(receiver), name.into())
    }

    pub fn call(target: impl Into<String>, args: Vec<Expression>, returns: Type) -> Self {
        Expression::Call(Call {
            target: target.into(),
            args,
            returns,
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(c) => write!(f, "{}", c),
            Expression::Variable(v) => write!(f, "{}", v.name()),
            Expression::Unary(op, e) => write!(f, "{}{}", op, e),
            Expression::Binary(op, l, r) => write!(f, "{} {} {}", l, op, r),
            Expression::Ternary(_, c, a, b) => write!(f, "{} ? {} : {}", c, a, b),
            Expression::New(ty) => write!(f, "new {}()", ty),
            Expression::Field(e, name) => write!(f, "{}.{}", e, name),
            Expression::Call(call) => {
                write!(f, "{}(", call.target)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign { target: Expression, value: Expression },
    Eval(Expression),
    /// Branching condition; its outgoing edges are `TrueBranch`/`FalseBranch`.
    Condition(Expression),
    Return(Option<Expression>),
    Throw(Expression),
    NoOp,
}

impl Statement {
    pub fn assign(target: Expression, value: Expression) -> Self {
        Statement::Assign { target, value }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { target, value } => write!(f, "{} = {}", target, value),
            Statement::Eval(e) => write!(f, "{}", e),
            Statement::Condition(e) => write!(f, "if {}", e),
            Statement::Return(Some(e)) => write!(f, "return {}", e),
            Statement::Return(None) => write!(f, "return"),
            Statement::Throw(e) => write!(f, "throw {}", e),
            Statement::NoOp => write!(f, "nop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Sequential,
    TrueBranch,
    FalseBranch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: StatementId,
    pub destination: StatementId,
    pub kind: EdgeKind,
}

/// Control-flow graph of one procedure.
#[derive(Debug, Clone)]
pub struct Cfg {
    name: String,
    parameters: Vec<Variable>,
    returns: Type,
    statements: Vec<Statement>,
    edges: Vec<Edge>,
    entrypoints: Vec<StatementId>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
}

impl Cfg {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Variable] {
        &self.parameters
    }

    pub fn returns(&self) -> Type {
        self.returns
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn statement(&self, id: StatementId) -> Option<&Statement> {
        self.statements.get(id)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn entrypoints(&self) -> &[StatementId] {
        &self.entrypoints
    }

    pub fn predecessors(&self, id: StatementId) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming.get(id).into_iter().flatten().map(move |&e| &self.edges[e])
    }

    pub fn successors(&self, id: StatementId) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing.get(id).into_iter().flatten().map(move |&e| &self.edges[e])
    }

    pub fn is_exceptional_exit(&self, id: StatementId) -> bool {
        matches!(self.statements.get(id), Some(Statement::Throw(_)))
    }

    /// Statements where execution leaves the CFG normally.
    pub fn is_normal_exit(&self, id: StatementId) -> bool {
        match self.statements.get(id) {
            Some(Statement::Return(_)) => true,
            Some(Statement::Throw(_)) | None => false,
            Some(_) => self.outgoing[id].is_empty(),
        }
    }

    pub fn normal_exitpoints(&self) -> Vec<StatementId> {
        (0..self.len()).filter(|&id| self.is_normal_exit(id)).collect()
    }

    pub fn exceptional_exitpoints(&self) -> Vec<StatementId> {
        (0..self.len()).filter(|&id| self.is_exceptional_exit(id)).collect()
    }

    pub fn location(&self, statement: StatementId, offset: usize) -> CodeLocation {
        CodeLocation::new(self.name.clone(), statement, offset)
    }

    /// Meta-variable holding the value returned by this CFG.
    pub fn return_variable(&self) -> Identifier {
        Identifier::variable(format!("ret_value@{}", self.name), self.returns)
    }

    /// Whether two CFGs have the same shape: same name, statements and edges.
    pub fn same_shape(&self, other: &Cfg) -> bool {
        self.name == other.name && self.statements == other.statements && self.edges == other.edges
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", p.name(), p.ty())?;
        }
        writeln!(f, ") -> {}", self.returns)?;
        for (id, st) in self.statements.iter().enumerate() {
            write!(f, "  {:>3}: {}", id, st)?;
            let succ: Vec<String> = self
                .successors(id)
                .map(|e| match e.kind {
                    EdgeKind::Sequential => format!("{}", e.destination),
                    EdgeKind::TrueBranch => format!("T:{}", e.destination),
                    EdgeKind::FalseBranch => format!("F:{}", e.destination),
                })
                .collect();
            if !succ.is_empty() {
                write!(f, "  -> {}", succ.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Incremental CFG construction.
///
/// ```rust
/// use absint_rs::program::{CfgBuilder, Expression, Statement};
/// use absint_rs::symbolic::Type;
///
/// let mut b = CfgBuilder::new("main");
/// let s0 = b.add(Statement::assign(Expression::var("x", Type::Numeric), Expression::int(3)));
/// let s1 = b.add(Statement::Return(Some(Expression::var("x", Type::Numeric))));
/// b.edge(s0, s1);
/// let cfg = b.build();
/// assert_eq!(cfg.entrypoints(), &[s0]);
/// assert_eq!(cfg.normal_exitpoints(), vec![s1]);
/// ```
#[derive(Debug, Clone)]
pub struct CfgBuilder {
    name: String,
    parameters: Vec<Variable>,
    returns: Type,
    statements: Vec<Statement>,
    edges: Vec<Edge>,
    entrypoints: Vec<StatementId>,
}

impl CfgBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            returns: Type::Void,
            statements: Vec::new(),
            edges: Vec::new(),
            entrypoints: Vec::new(),
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.parameters.push(Variable::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.returns = ty;
        self
    }

    pub fn add(&mut self, statement: Statement) -> StatementId {
        self.statements.push(statement);
        self.statements.len() - 1
    }

    fn push_edge(&mut self, source: StatementId, destination: StatementId, kind: EdgeKind) {
        assert!(source < self.statements.len(), "edge source {} out of range", source);
        assert!(destination < self.statements.len(), "edge destination {} out of range", destination);
        self.edges.push(Edge {
            source,
            destination,
            kind,
        });
    }

    pub fn edge(&mut self, source: StatementId, destination: StatementId) {
        self.push_edge(source, destination, EdgeKind::Sequential);
    }

    /// Adds the two outgoing edges of a condition.
    pub fn branch(&mut self, condition: StatementId, then: StatementId, otherwise: StatementId) {
        self.push_edge(condition, then, EdgeKind::TrueBranch);
        self.push_edge(condition, otherwise, EdgeKind::FalseBranch);
    }

    /// Adds statements connected one after the other, returns their ids.
    pub fn sequence(&mut self, statements: impl IntoIterator<Item = Statement>) -> Vec<StatementId> {
        let ids: Vec<StatementId> = statements.into_iter().map(|s| self.add(s)).collect();
        for w in ids.windows(2) {
            self.edge(w[0], w[1]);
        }
        ids
    }

    pub fn entrypoint(&mut self, id: StatementId) {
        self.entrypoints.push(id);
    }

    /// Finishes the CFG. Without explicit entry points the first statement is the entry.
    pub fn build(self) -> Cfg {
        let n = self.statements.len();
        let mut incoming = vec![Vec::new(); n];
        let mut outgoing = vec![Vec::new(); n];
        for (i, e) in self.edges.iter().enumerate() {
            outgoing[e.source].push(i);
            incoming[e.destination].push(i);
        }
        let entrypoints = if self.entrypoints.is_empty() && n > 0 {
            vec![0]
        } else {
            self.entrypoints
        };
        Cfg {
            name: self.name,
            parameters: self.parameters,
            returns: self.returns,
            statements: self.statements,
            edges: self.edges,
            entrypoints,
            incoming,
            outgoing,
        }
    }
}

/// Whole program: CFGs plus the entry CFGs of the analysis.
#[derive(Debug, Clone, Default)]
pub struct Program {
    cfgs: Vec<Cfg>,
    entrypoints: Vec<CfgId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cfg(&mut self, cfg: Cfg) -> CfgId {
        self.cfgs.push(cfg);
        self.cfgs.len() - 1
    }

    pub fn add_entrypoint(&mut self, id: CfgId) {
        if !self.entrypoints.contains(&id) {
            self.entrypoints.push(id);
        }
    }

    pub fn cfg(&self, id: CfgId) -> Result<&Cfg> {
        self.cfgs.get(id).ok_or_else(|| SemanticError::UnknownCfg(format!("#{}", id)))
    }

    pub fn find(&self, name: &str) -> Option<CfgId> {
        self.cfgs.iter().position(|c| c.name() == name)
    }

    pub fn cfgs(&self) -> &[Cfg] {
        &self.cfgs
    }

    pub fn entrypoints(&self) -> &[CfgId] {
        &self.entrypoints
    }
}
