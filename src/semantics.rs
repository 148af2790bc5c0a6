//! Statement semantics.
//!
//! The [`Interpreter`] evaluates the program expressions of one statement into sets of
//! symbolic expressions, threading the abstract state left to right, and applies the
//! statement to the state. Allocations and calls are numbered inside their statement and
//! get the [`CodeLocation`] `cfg:statement.offset`.
//!
//! Calls bind their result to a meta-variable:
//!
//! - `call_ret@<location>` for resolved calls, copied from the callee's `ret_value@<cfg>`,
//! - `open_call_ret@<location>` for non-void open calls, whose state becomes top,
//! - nothing (the value is [`SymbolicExpr::Skip`]) for void calls.
//!
//! Meta-variables live until the end of their statement. The ones of a condition live
//! until the branch assumption has been made.

use log::debug;

use crate::domain::{HeapDomain, SemanticDomain, ValueDomain};
use crate::error::{Result, SemanticError};
use crate::interprocedural::InterproceduralAnalysis;
use crate::lattice::Lattice;
use crate::program::{Call, Cfg, CfgId, CodeLocation, Expression, Program, Statement, StatementId};
use crate::state::AbstractState;
use crate::symbolic::{singleton, ExpressionSet, Identifier, ScopeToken, SymbolicExpr};

/// Result of one statement.
#[derive(Debug, Clone)]
pub struct StatementOutcome<H, V> {
    pub state: AbstractState<H, V>,
    /// Symbolic forms of the branching expression, for conditions only.
    pub condition: Option<ExpressionSet>,
    /// Meta-variables still alive after the statement.
    pub metas: Vec<Identifier>,
}

/// Sub-expression numbering and meta-variables of the statement being evaluated.
struct Frame {
    statement: StatementId,
    offset: usize,
    metas: Vec<Identifier>,
}

impl Frame {
    fn next_location(&mut self, cfg: &Cfg) -> CodeLocation {
        let location = cfg.location(self.statement, self.offset);
        self.offset += 1;
        location
    }
}

pub struct Interpreter<'a, I: InterproceduralAnalysis<H, V>, H: HeapDomain, V: ValueDomain> {
    program: &'a Program,
    cfg: &'a Cfg,
    interproc: &'a I,
    token: &'a I::Token,
    _domains: std::marker::PhantomData<(H, V)>,
}

impl<'a, I, H, V> Interpreter<'a, I, H, V>
where
    I: InterproceduralAnalysis<H, V>,
    H: HeapDomain,
    V: ValueDomain,
{
    pub fn new(program: &'a Program, cfg_id: CfgId, interproc: &'a I, token: &'a I::Token) -> Result<Self> {
        Ok(Self {
            program,
            cfg: program.cfg(cfg_id)?,
            interproc,
            token,
            _domains: std::marker::PhantomData,
        })
    }

    pub fn cfg(&self) -> &'a Cfg {
        self.cfg
    }

    /// Applies statement `id` to `entry`.
    pub fn statement(&self, id: StatementId, entry: &AbstractState<H, V>) -> Result<StatementOutcome<H, V>> {
        let statement = self
            .cfg
            .statement(id)
            .ok_or_else(|| SemanticError::domain(format!("no statement {} in `{}`", id, self.cfg.name())))?;
        if entry.is_bottom() {
            return Ok(StatementOutcome {
                state: entry.clone(),
                condition: None,
                metas: Vec::new(),
            });
        }
        let mut frame = Frame {
            statement: id,
            offset: 0,
            metas: Vec::new(),
        };
        let pp = self.cfg.location(id, 0);
        let state = match statement {
            Statement::Assign { target, value } => {
                let (state, values) = self.eval(value, entry.clone(), &mut frame)?;
                self.assign(target, state, &values, &mut frame, &pp)?
            }
            Statement::Eval(expr) | Statement::Throw(expr) => self.eval(expr, entry.clone(), &mut frame)?.0,
            Statement::Condition(expr) => {
                let (state, exprs) = self.eval(expr, entry.clone(), &mut frame)?;
                return Ok(StatementOutcome {
                    state,
                    condition: Some(exprs),
                    metas: frame.metas,
                });
            }
            Statement::Return(Some(expr)) => {
                let (state, values) = self.eval(expr, entry.clone(), &mut frame)?;
                assign_all(&state, &self.cfg.return_variable(), &values, &pp)?
            }
            Statement::Return(None) | Statement::NoOp => entry.clone(),
        };
        Ok(StatementOutcome {
            state: state.forget_identifiers(&frame.metas)?,
            condition: None,
            metas: Vec::new(),
        })
    }

    /// State flowing along a conditional edge out of a condition.
    pub fn branch(
        &self,
        state: &AbstractState<H, V>,
        condition: &ExpressionSet,
        metas: &[Identifier],
        taken: bool,
        pp: &CodeLocation,
    ) -> Result<AbstractState<H, V>> {
        let mut result: Option<AbstractState<H, V>> = None;
        for expr in condition {
            let guard = if taken {
                expr.clone()
            } else {
                SymbolicExpr::not(expr.clone())
            };
            let assumed = state.assume(&guard, pp)?;
            result = Some(match result {
                Some(acc) => acc.lub(&assumed)?,
                None => assumed,
            });
        }
        result.unwrap_or_else(|| state.clone()).forget_identifiers(metas)
    }

    fn assign(
        &self,
        target: &Expression,
        state: AbstractState<H, V>,
        values: &ExpressionSet,
        frame: &mut Frame,
        pp: &CodeLocation,
    ) -> Result<AbstractState<H, V>> {
        match target {
            Expression::Variable(v) => assign_all(&state, &Identifier::Variable(v.clone()), values, pp),
            Expression::Field(receiver, field) => {
                let (state, receivers) = self.eval(receiver, state, frame)?;
                let mut result: Option<AbstractState<H, V>> = None;
                for r in &receivers {
                    let lvalue = SymbolicExpr::access(r.clone(), field.clone());
                    for v in values {
                        let next = state.assign_to(&lvalue, v, pp)?;
                        result = Some(match result {
                            Some(acc) => acc.lub(&next)?,
                            None => next,
                        });
                    }
                }
                Ok(result.unwrap_or(state))
            }
            other => Err(SemanticError::domain(format!("`{}` is not assignable", other))),
        }
    }

    fn eval(
        &self,
        expr: &Expression,
        state: AbstractState<H, V>,
        frame: &mut Frame,
    ) -> Result<(AbstractState<H, V>, ExpressionSet)> {
        match expr {
            Expression::Literal(c) => Ok((state, singleton(SymbolicExpr::Constant(c.clone())))),
            Expression::Variable(v) => Ok((state, singleton(SymbolicExpr::Identifier(Identifier::Variable(v.clone()))))),
            Expression::Unary(op, arg) => {
                let (state, args) = self.eval(arg, state, frame)?;
                Ok((state, args.into_iter().map(|a| SymbolicExpr::unary(*op, a)).collect()))
            }
            Expression::Binary(op, left, right) => {
                let (state, lefts) = self.eval(left, state, frame)?;
                let (state, rights) = self.eval(right, state, frame)?;
                let mut exprs = ExpressionSet::new();
                for l in &lefts {
                    for r in &rights {
                        exprs.insert(SymbolicExpr::binary(*op, l.clone(), r.clone()));
                    }
                }
                Ok((state, exprs))
            }
            Expression::Ternary(op, first, second, third) => {
                let (state, firsts) = self.eval(first, state, frame)?;
                let (state, seconds) = self.eval(second, state, frame)?;
                let (state, thirds) = self.eval(third, state, frame)?;
                let mut exprs = ExpressionSet::new();
                for a in &firsts {
                    for b in &seconds {
                        for c in &thirds {
                            exprs.insert(SymbolicExpr::ternary(*op, a.clone(), b.clone(), c.clone()));
                        }
                    }
                }
                Ok((state, exprs))
            }
            Expression::New(type_name) => {
                let location = frame.next_location(self.cfg);
                let allocation = SymbolicExpr::allocation(type_name.clone(), location.clone());
                let state = state.small_step_semantics(&allocation, &location)?;
                let exprs = state.rewrite(&allocation, &location)?;
                Ok((state, exprs))
            }
            Expression::Field(receiver, field) => {
                let (state, receivers) = self.eval(receiver, state, frame)?;
                let exprs = receivers
                    .into_iter()
                    .map(|r| SymbolicExpr::access(r, field.clone()))
                    .collect();
                Ok((state, exprs))
            }
            Expression::Call(call) => {
                let mut state = state;
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    let (next, values) = self.eval(arg, state, frame)?;
                    state = next;
                    args.push(values);
                }
                let location = frame.next_location(self.cfg);
                self.call(call, state, &args, location, frame)
            }
        }
    }

    fn call(
        &self,
        call: &Call,
        state: AbstractState<H, V>,
        args: &[ExpressionSet],
        location: CodeLocation,
        frame: &mut Frame,
    ) -> Result<(AbstractState<H, V>, ExpressionSet)> {
        let targets = self.interproc.resolve(self.program, call)?;
        if targets.is_empty() {
            debug!("{}: open call to `{}`", location, call.target);
            let state = state.top();
            if call.returns.is_void() {
                return Ok((state, singleton(SymbolicExpr::Skip)));
            }
            let meta = Identifier::variable(format!("open_call_ret@{}", location), call.returns);
            frame.metas.push(meta.clone());
            return Ok((state, singleton(SymbolicExpr::Identifier(meta))));
        }

        let meta = Identifier::variable(format!("call_ret@{}", location), call.returns);
        let scope = ScopeToken::new(location.clone());
        let mut result: Option<AbstractState<H, V>> = None;
        for callee_id in targets {
            let callee = self.program.cfg(callee_id)?;
            let callee_entry = callee.location(0, 0);
            let mut entry = state.push_scope(&scope)?;
            for (param, values) in callee.parameters().iter().zip(args) {
                let formal = Identifier::Variable(param.clone());
                let actuals: ExpressionSet = values.iter().map(|v| v.push_scope(&scope)).collect();
                entry = assign_all(&entry, &formal, &actuals, &callee_entry)?;
            }
            let mut exit = self
                .interproc
                .call_semantics(self.program, self.token, &location, callee_id, &entry)?;
            if !call.returns.is_void() {
                let returned = SymbolicExpr::Identifier(callee.return_variable());
                exit = exit.assign(&meta.push_scope(&scope), &returned, &location)?;
            }
            let exit = exit.pop_scope(&scope)?;
            result = Some(match result {
                Some(acc) => acc.lub(&exit)?,
                None => exit,
            });
        }
        let state = result.unwrap_or_else(|| state.bottom());
        if call.returns.is_void() {
            return Ok((state, singleton(SymbolicExpr::Skip)));
        }
        frame.metas.push(meta.clone());
        Ok((state, singleton(SymbolicExpr::Identifier(meta))))
    }
}

/// Joins the assignments of every alternative; no alternative forgets `id`.
fn assign_all<H: HeapDomain, V: ValueDomain>(
    state: &AbstractState<H, V>,
    id: &Identifier,
    values: &ExpressionSet,
    pp: &CodeLocation,
) -> Result<AbstractState<H, V>> {
    let mut result: Option<AbstractState<H, V>> = None;
    for v in values {
        let next = state.assign(id, v, pp)?;
        result = Some(match result {
            Some(acc) => acc.lub(&next)?,
            None => next,
        });
    }
    match result {
        Some(state) => Ok(state),
        None => state.forget_identifier(id),
    }
}
