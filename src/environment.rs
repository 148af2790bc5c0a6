//! Non-relational lifting.
//!
//! An [`Environment<T>`] maps identifiers to elements of one lattice `T`. The map is
//! total: an identifier without binding is `T::top()`. The environment as a whole has its
//! own top (no binding at all) and bottom (no reachable state).
//!
//! Single-value domains implement [`NonRelationalElement`] to provide evaluation hooks;
//! the environment then provides the full [`ValueDomain`] contract: structural evaluation
//! of symbolic expressions, refinement on `assume`, scoping and heap replacements.

use std::collections::HashMap;
use std::fmt;

use crate::domain::{HeapReplacement, SemanticDomain, ValueDomain};
use crate::error::{Result, SemanticError};
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{
    AllocationSite, BinaryOp, Constant, Identifier, ScopeToken, SymbolicExpr, TernaryOp, Type, UnaryOp,
};

/// Evaluation hooks of a single-value abstract domain.
///
/// `self` plays the role of the lattice singleton: hooks build new elements from it
/// (e.g. `self.top()`) and never depend on its value.
pub trait NonRelationalElement: Lattice {
    /// Whether values of `id` belong to this domain.
    fn tracks_identifier(&self, id: &Identifier) -> bool {
        !id.ty().is_pointer()
    }

    /// Whether this domain can evaluate `expr`.
    fn can_process(&self, expr: &SymbolicExpr) -> bool {
        !expr.ty().is_pointer()
    }

    fn eval_constant(&self, _constant: &Constant, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.top())
    }

    fn eval_push_any(&self, _ty: Type, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.top())
    }

    /// Value of a pointer to the objects of `site`.
    fn eval_memory_pointer(&self, _site: &AllocationSite, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.top())
    }

    fn eval_unary(&self, _op: UnaryOp, _arg: &Self, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.top())
    }

    fn eval_binary(&self, _op: BinaryOp, _left: &Self, _right: &Self, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.top())
    }

    fn eval_ternary(&self, op: TernaryOp, _first: &Self, second: &Self, third: &Self, _pp: &CodeLocation) -> Result<Self> {
        match op {
            TernaryOp::Ite => second.lub(third),
        }
    }

    /// Satisfiability of a boolean identifier bound to `value`.
    fn satisfies_abstract_value(&self, _value: &Self, _pp: &CodeLocation) -> Satisfiability {
        Satisfiability::Unknown
    }

    /// Satisfiability of `left op right` where `op` is a comparison.
    fn satisfies_binary(&self, _op: BinaryOp, _left: &Self, _right: &Self, _pp: &CodeLocation) -> Result<Satisfiability> {
        Ok(Satisfiability::Unknown)
    }

    /// Refines `env` assuming the comparison `left op right` holds.
    fn assume_binary(
        &self,
        env: &Environment<Self>,
        _op: BinaryOp,
        _left: &SymbolicExpr,
        _right: &SymbolicExpr,
        _pp: &CodeLocation,
    ) -> Result<Environment<Self>> {
        Ok(env.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Environment<T> {
    lattice: T,
    function: HashMap<Identifier, T>,
    bottom: bool,
}

impl<T: Lattice> Environment<T> {
    /// Top environment over the lattice of `singleton`.
    pub fn new(singleton: T) -> Self {
        Self {
            lattice: singleton.top(),
            function: HashMap::new(),
            bottom: false,
        }
    }

    pub fn lattice(&self) -> &T {
        &self.lattice
    }

    pub fn get(&self, id: &Identifier) -> T {
        if self.bottom {
            return self.lattice.bottom();
        }
        self.function.get(id).cloned().unwrap_or_else(|| self.lattice.top())
    }

    /// Explicit binding of `id`, if any.
    pub fn binding(&self, id: &Identifier) -> Option<&T> {
        self.function.get(id)
    }

    /// Rebinds `id`. Binding to top removes the entry. No-op on the bottom environment.
    pub fn set(&mut self, id: Identifier, value: T) {
        if self.bottom {
            return;
        }
        if value.is_top() {
            self.function.remove(&id);
        } else {
            self.function.insert(id, value);
        }
    }

    pub fn with(mut self, id: Identifier, value: T) -> Self {
        self.set(id, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identifier, &T)> {
        self.function.iter()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.function.keys()
    }

    pub fn forget(&self, id: &Identifier) -> Self {
        let mut result = self.clone();
        result.function.remove(id);
        result
    }

    fn rename(&self, f: impl Fn(&Identifier) -> Option<Identifier>) -> Self {
        if self.bottom {
            return self.clone();
        }
        let function = self
            .function
            .iter()
            .filter_map(|(id, v)| f(id).map(|id| (id, v.clone())))
            .collect();
        Self {
            lattice: self.lattice.clone(),
            function,
            bottom: false,
        }
    }

    pub fn push_scope_keys(&self, scope: &ScopeToken) -> Self {
        self.rename(|id| Some(id.push_scope(scope)))
    }

    pub fn pop_scope_keys(&self, scope: &ScopeToken) -> Self {
        self.rename(|id| id.pop_scope(scope))
    }

    /// Moves the bindings of every replacement's sources onto its targets.
    ///
    /// Targets receive the join of all their sources, joined with their own binding if
    /// they already had one. An unbound target has not been observed yet and simply
    /// takes the incoming value.
    pub fn apply_replacements(&self, substitution: &[HeapReplacement]) -> Result<Self> {
        if self.bottom || substitution.is_empty() {
            return Ok(self.clone());
        }
        let mut result = self.clone();
        for replacement in substitution {
            let mut incoming: HashMap<Identifier, T> = HashMap::new();
            let mut replaced = Vec::new();
            for (id, value) in &result.function {
                let Some(targets) = replacement.targets_for(id) else {
                    continue;
                };
                replaced.push(id.clone());
                for target in targets {
                    let joined = match incoming.remove(&target) {
                        Some(prev) => prev.lub(value)?,
                        None => value.clone(),
                    };
                    incoming.insert(target, joined);
                }
            }
            for id in &replaced {
                result.function.remove(id);
            }
            for (target, value) in incoming {
                let value = match result.function.get(&target) {
                    Some(old) => old.lub(&value)?,
                    None => value,
                };
                result.set(target, value);
            }
        }
        Ok(result)
    }

    fn combine(&self, other: &Self, op: impl Fn(&T, &T) -> Result<T>) -> Result<Self> {
        let mut result = self.top();
        for (id, left) in &self.function {
            if let Some(right) = other.function.get(id) {
                result.set(id.clone(), op(left, right)?);
            }
        }
        Ok(result)
    }
}

impl<T: Lattice> Lattice for Environment<T> {
    fn top(&self) -> Self {
        Self {
            lattice: self.lattice.clone(),
            function: HashMap::new(),
            bottom: false,
        }
    }

    fn bottom(&self) -> Self {
        Self {
            lattice: self.lattice.clone(),
            function: HashMap::new(),
            bottom: true,
        }
    }

    fn is_top(&self) -> bool {
        !self.bottom && self.function.is_empty()
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    // A key bound on one side only is top on the other, so it vanishes from the join.
    fn lub_aux(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a.lub(b))
    }

    fn widening_aux(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a.widening(b))
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        for (id, right) in &other.function {
            if !self.get(id).less_or_equal(right)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        let mut result = self.clone();
        for (id, right) in &other.function {
            let value = self.get(id).glb(right)?;
            if value.is_bottom() {
                return Ok(self.bottom());
            }
            result.set(id.clone(), value);
        }
        Ok(result)
    }
}

impl<T: NonRelationalElement> Environment<T> {
    /// Evaluates a heap-free expression.
    pub fn eval(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<T> {
        if self.bottom {
            return Ok(self.lattice.bottom());
        }
        match expr {
            SymbolicExpr::Constant(c) => self.lattice.eval_constant(c, pp),
            SymbolicExpr::Identifier(id) => Ok(self.get(id)),
            SymbolicExpr::Unary(op, arg) => {
                let arg = self.eval(arg, pp)?;
                if arg.is_bottom() {
                    return Ok(arg);
                }
                self.lattice.eval_unary(*op, &arg, pp)
            }
            SymbolicExpr::Binary(op, left, right) => {
                let left = self.eval(left, pp)?;
                if left.is_bottom() {
                    return Ok(left);
                }
                let right = self.eval(right, pp)?;
                if right.is_bottom() {
                    return Ok(right);
                }
                self.lattice.eval_binary(*op, &left, &right, pp)
            }
            SymbolicExpr::Ternary(op, first, second, third) => {
                let first = self.eval(first, pp)?;
                if first.is_bottom() {
                    return Ok(first);
                }
                let second = self.eval(second, pp)?;
                let third = self.eval(third, pp)?;
                self.lattice.eval_ternary(*op, &first, &second, &third, pp)
            }
            SymbolicExpr::PushAny(ty) => self.lattice.eval_push_any(*ty, pp),
            SymbolicExpr::MemoryPointer(site) => self.lattice.eval_memory_pointer(site, pp),
            SymbolicExpr::Skip => Ok(self.lattice.bottom()),
            SymbolicExpr::HeapAllocation { .. } | SymbolicExpr::AccessChild { .. } => {
                Err(SemanticError::unsupported("environment", expr))
            }
        }
    }
}

impl<T: NonRelationalElement> SemanticDomain for Environment<T> {
    fn assign(&self, id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if self.bottom || !self.lattice.tracks_identifier(id) {
            return Ok(self.clone());
        }
        if !self.lattice.can_process(expr) {
            return Ok(self.forget(id));
        }
        let mut value = self.eval(expr, pp)?;
        if id.is_weak() {
            value = value.lub(&self.get(id))?;
        }
        Ok(self.clone().with(id.clone(), value))
    }

    fn small_step_semantics(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.clone())
    }

    fn assume(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if self.bottom {
            return Ok(self.clone());
        }
        match self.satisfies(expr, pp)? {
            Satisfiability::NotSatisfied | Satisfiability::Bottom => return Ok(self.bottom()),
            Satisfiability::Satisfied => return Ok(self.clone()),
            Satisfiability::Unknown => {}
        }
        match expr {
            SymbolicExpr::Unary(UnaryOp::Not, _) => {
                let simplified = expr.remove_negations();
                if &simplified == expr {
                    Ok(self.clone())
                } else {
                    self.assume(&simplified, pp)
                }
            }
            SymbolicExpr::Binary(BinaryOp::And, left, right) => self.assume(left, pp)?.assume(right, pp),
            SymbolicExpr::Binary(BinaryOp::Or, left, right) => self.assume(left, pp)?.lub(&self.assume(right, pp)?),
            SymbolicExpr::Binary(op, left, right) if op.is_comparison() => {
                self.lattice.assume_binary(self, *op, left, right, pp)
            }
            _ => Ok(self.clone()),
        }
    }

    fn satisfies(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Satisfiability> {
        if self.bottom {
            return Ok(Satisfiability::Bottom);
        }
        match expr {
            SymbolicExpr::Constant(Constant::Bool(b)) => Ok(Satisfiability::from_bool(*b)),
            SymbolicExpr::Identifier(id) => Ok(self.lattice.satisfies_abstract_value(&self.get(id), pp)),
            SymbolicExpr::Unary(UnaryOp::Not, arg) => Ok(self.satisfies(arg, pp)?.negate()),
            SymbolicExpr::Binary(BinaryOp::And, left, right) => {
                Ok(self.satisfies(left, pp)?.and(self.satisfies(right, pp)?))
            }
            SymbolicExpr::Binary(BinaryOp::Or, left, right) => {
                Ok(self.satisfies(left, pp)?.or(self.satisfies(right, pp)?))
            }
            SymbolicExpr::Binary(op, left, right) if op.is_comparison() => {
                if !self.lattice.can_process(left) || !self.lattice.can_process(right) {
                    return Ok(Satisfiability::Unknown);
                }
                let left = self.eval(left, pp)?;
                let right = self.eval(right, pp)?;
                if left.is_bottom() || right.is_bottom() {
                    return Ok(Satisfiability::Bottom);
                }
                self.lattice.satisfies_binary(*op, &left, &right, pp)
            }
            SymbolicExpr::HeapAllocation { .. } | SymbolicExpr::AccessChild { .. } => {
                Err(SemanticError::unsupported("environment", expr))
            }
            _ => Ok(Satisfiability::Unknown),
        }
    }

    fn forget_identifier(&self, id: &Identifier) -> Result<Self> {
        Ok(self.forget(id))
    }

    fn push_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(self.push_scope_keys(scope))
    }

    fn pop_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(self.pop_scope_keys(scope))
    }
}

impl<T: NonRelationalElement> ValueDomain for Environment<T> {
    fn apply_substitution(&self, substitution: &[HeapReplacement], _pp: &CodeLocation) -> Result<Self> {
        self.apply_replacements(substitution)
    }
}

impl<T: fmt::Display> fmt::Display for Environment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "⊥");
        }
        if self.function.is_empty() {
            return write!(f, "⊤");
        }
        let mut entries: Vec<_> = self.function.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (i, (id, value)) in entries.into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", id, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::laws::check_lattice_laws;
    use crate::numeric::Interval;
    use crate::symbolic::AllocationSite;
    use test_log::test;

    fn pp() -> CodeLocation {
        CodeLocation::new("test", 0, 0)
    }

    fn var(name: &str) -> Identifier {
        Identifier::variable(name, Type::Numeric)
    }

    fn env() -> Environment<Interval> {
        Environment::new(Interval::top())
    }

    #[test]
    fn test_missing_binding_is_top() {
        let e = env();
        assert!(e.is_top());
        assert!(e.get(&var("x")).is_top());
        assert!(e.bottom().get(&var("x")).is_bottom());
    }

    #[test]
    fn test_assign_and_eval() {
        let e = env().assign(&var("x"), &SymbolicExpr::int(3), &pp()).unwrap();
        let sum = SymbolicExpr::binary(BinaryOp::Add, SymbolicExpr::Identifier(var("x")), SymbolicExpr::int(4));
        let e = e.assign(&var("y"), &sum, &pp()).unwrap();
        assert_eq!(e.get(&var("x")), Interval::constant(3));
        assert_eq!(e.get(&var("y")), Interval::constant(7));
    }

    #[test]
    fn test_pointer_identifiers_are_ignored() {
        let p = Identifier::variable("p", Type::Pointer);
        let e = env().assign(&p, &SymbolicExpr::int(1), &pp()).unwrap();
        assert!(e.is_top());
    }

    #[test]
    fn test_heap_expressions_are_rejected() {
        let access = SymbolicExpr::access(SymbolicExpr::var("a", Type::Pointer), "f");
        assert!(env().eval(&access, &pp()).is_err());
    }

    #[test]
    fn test_lub_drops_one_sided_keys() {
        let a = env().with(var("x"), Interval::constant(1)).with(var("y"), Interval::constant(5));
        let b = env().with(var("x"), Interval::constant(2));
        let j = a.lub(&b).unwrap();
        assert_eq!(j.get(&var("x")), Interval::range(1, 2));
        assert!(j.get(&var("y")).is_top());
        assert!(a.less_or_equal(&j).unwrap());
        assert!(b.less_or_equal(&j).unwrap());
    }

    #[test]
    fn test_environment_lattice_laws() {
        let samples = vec![
            env(),
            env().bottom(),
            env().with(var("x"), Interval::constant(0)),
            env().with(var("x"), Interval::range(0, 10)),
            env().with(var("x"), Interval::range(-5, 5)).with(var("y"), Interval::constant(1)),
            env().with(var("y"), Interval::range(3, 4)),
        ];
        check_lattice_laws(&samples);
    }

    #[test]
    fn test_weak_identifiers_are_joined() {
        let site = Identifier::Heap(AllocationSite::new("main:1", true).with_field(Some("f".into())));
        let e = env().with(site.clone(), Interval::constant(1));
        let e = e.assign(&site, &SymbolicExpr::int(2), &pp()).unwrap();
        assert_eq!(e.get(&site), Interval::range(1, 2));

        let strong = Identifier::Heap(AllocationSite::new("main:1", false));
        let e = env().with(strong.clone(), Interval::constant(1));
        let e = e.assign(&strong, &SymbolicExpr::int(2), &pp()).unwrap();
        assert_eq!(e.get(&strong), Interval::constant(2));
    }

    #[test]
    fn test_assume_refutation_gives_bottom() {
        let e = env().with(var("x"), Interval::constant(3));
        let cond = SymbolicExpr::binary(BinaryOp::Gt, SymbolicExpr::Identifier(var("x")), SymbolicExpr::int(5));
        assert!(e.assume(&cond, &pp()).unwrap().is_bottom());
        assert!(e.assume(&SymbolicExpr::boolean(false), &pp()).unwrap().is_bottom());
        assert_eq!(e.assume(&SymbolicExpr::not(cond), &pp()).unwrap(), e);
    }

    #[test]
    fn test_empty_meet_is_bottom() {
        let left = env().with(var("x"), Interval::range(0, 3)).with(var("y"), Interval::constant(1));
        let right = env().with(var("x"), Interval::range(5, 9));
        let meet = left.glb(&right).unwrap();
        assert!(meet.is_bottom());
        assert!(meet.less_or_equal(&left).unwrap());

        let overlap = env().with(var("x"), Interval::range(2, 9));
        let meet = left.glb(&overlap).unwrap();
        assert_eq!(meet.get(&var("x")), Interval::range(2, 3));
        assert_eq!(meet.get(&var("y")), Interval::constant(1));
    }

    #[test]
    fn test_scopes() {
        let scope = ScopeToken::new(CodeLocation::new("main", 2, 0));
        let site = Identifier::Heap(AllocationSite::new("main:0", false));
        let e = env().with(var("x"), Interval::constant(1)).with(site.clone(), Interval::constant(9));

        let pushed = e.push_scope(&scope).unwrap();
        assert!(pushed.get(&var("x")).is_top());
        assert_eq!(pushed.get(&var("x").push_scope(&scope)), Interval::constant(1));
        assert_eq!(pushed.get(&site), Interval::constant(9));

        let callee = pushed.with(var("n"), Interval::constant(7));
        let popped = callee.pop_scope(&scope).unwrap();
        assert_eq!(popped, e);
    }

    #[test]
    fn test_apply_replacements_joins_into_target() {
        let strong = AllocationSite::new("main:1", false);
        let weak = strong.with_weak(true);
        let f = Some("f".to_string());
        let e = env()
            .with(Identifier::Heap(strong.with_field(f.clone())), Interval::constant(1))
            .with(Identifier::Heap(weak.with_field(f.clone())), Interval::constant(4));
        let r = HeapReplacement::new()
            .with_source(Identifier::Heap(strong.clone()))
            .with_target(Identifier::Heap(weak.clone()));
        let e = e.apply_substitution(&[r], &pp()).unwrap();
        assert!(e.binding(&Identifier::Heap(strong.with_field(f.clone()))).is_none());
        assert_eq!(e.get(&Identifier::Heap(weak.with_field(f))), Interval::range(1, 4));
    }
}
