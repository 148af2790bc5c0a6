//! Definite forward dataflow analyses.
//!
//! A [`DefiniteDataflow`] holds the facts that hold on *every* path: joining two states
//! keeps the common facts only, so the lattice is the inverse subset order. Analyses plug
//! in their facts through [`DataflowElement`], providing `gen` and `kill` for
//! assignments.

use std::collections::BTreeSet;
use std::fmt;

use crate::domain::{HeapReplacement, SemanticDomain, ValueDomain};
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{BinaryOp, Constant, Identifier, ScopeToken, SymbolicExpr, UnaryOp};

/// A fact about one identifier.
pub trait DataflowElement: Clone + fmt::Debug + Ord {
    fn identifier(&self) -> &Identifier;

    /// Same fact about another identifier.
    fn with_identifier(&self, id: Identifier) -> Self;

    fn tracks_identifier(id: &Identifier) -> bool {
        !id.ty().is_pointer()
    }

    fn can_process(expr: &SymbolicExpr) -> bool {
        !expr.ty().is_pointer()
    }

    /// Facts created by `id = expr`.
    fn gen(id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation, domain: &DefiniteDataflow<Self>) -> Result<Vec<Self>>;

    /// Identifiers whose facts are invalidated by `id = expr`.
    fn kill(id: &Identifier, _expr: &SymbolicExpr, _pp: &CodeLocation, _domain: &DefiniteDataflow<Self>) -> Result<Vec<Identifier>> {
        Ok(vec![id.clone()])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefiniteDataflow<E> {
    elements: BTreeSet<E>,
    bottom: bool,
}

impl<E: DataflowElement> Default for DefiniteDataflow<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DataflowElement> DefiniteDataflow<E> {
    /// State without any fact.
    pub fn new() -> Self {
        Self {
            elements: BTreeSet::new(),
            bottom: false,
        }
    }

    pub fn elements(&self) -> &BTreeSet<E> {
        &self.elements
    }

    /// Facts about `id`.
    pub fn facts<'a>(&'a self, id: &'a Identifier) -> impl Iterator<Item = &'a E> + 'a {
        self.elements.iter().filter(move |e| e.identifier() == id)
    }

    fn from_elements(elements: BTreeSet<E>) -> Self {
        Self { elements, bottom: false }
    }

    fn without(&self, ids: &[Identifier]) -> BTreeSet<E> {
        self.elements
            .iter()
            .filter(|e| !ids.contains(e.identifier()))
            .cloned()
            .collect()
    }

    fn rename(&self, f: impl Fn(&Identifier) -> Option<Identifier>) -> Self {
        if self.bottom {
            return self.clone();
        }
        let elements = self
            .elements
            .iter()
            .filter_map(|e| f(e.identifier()).map(|id| e.with_identifier(id)))
            .collect();
        Self::from_elements(elements)
    }
}

impl<E: DataflowElement> Lattice for DefiniteDataflow<E> {
    fn top(&self) -> Self {
        Self::new()
    }

    fn bottom(&self) -> Self {
        Self {
            elements: BTreeSet::new(),
            bottom: true,
        }
    }

    fn is_top(&self) -> bool {
        !self.bottom && self.elements.is_empty()
    }

    fn is_bottom(&self) -> bool {
        self.bottom
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_elements(self.elements.intersection(&other.elements).cloned().collect()))
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        Ok(self.elements.is_superset(&other.elements))
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        Ok(Self::from_elements(self.elements.union(&other.elements).cloned().collect()))
    }
}

impl<E: DataflowElement> SemanticDomain for DefiniteDataflow<E> {
    fn assign(&self, id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        if self.bottom || !E::tracks_identifier(id) {
            return Ok(self.clone());
        }
        if !E::can_process(expr) {
            return self.forget_identifier(id);
        }
        let killed = E::kill(id, expr, pp, self)?;
        let generated = E::gen(id, expr, pp, self)?;
        let mut elements = self.without(&killed);
        if id.is_weak() {
            // Only the facts holding both before and after the write survive.
            elements.extend(generated.into_iter().filter(|e| self.elements.contains(e)));
        } else {
            elements.extend(generated);
        }
        Ok(Self::from_elements(elements))
    }

    fn small_step_semantics(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.clone())
    }

    fn assume(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        Ok(self.clone())
    }

    fn satisfies(&self, _expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Satisfiability> {
        if self.bottom {
            Ok(Satisfiability::Bottom)
        } else {
            Ok(Satisfiability::Unknown)
        }
    }

    fn forget_identifier(&self, id: &Identifier) -> Result<Self> {
        if self.bottom {
            return Ok(self.clone());
        }
        Ok(Self::from_elements(self.without(std::slice::from_ref(id))))
    }

    fn push_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(self.rename(|id| Some(id.push_scope(scope))))
    }

    fn pop_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(self.rename(|id| id.pop_scope(scope)))
    }
}

impl<E: DataflowElement> ValueDomain for DefiniteDataflow<E> {
    fn apply_substitution(&self, substitution: &[HeapReplacement], _pp: &CodeLocation) -> Result<Self> {
        if self.bottom || substitution.is_empty() {
            return Ok(self.clone());
        }
        let mut elements = self.elements.clone();
        for replacement in substitution {
            let mut moved: BTreeSet<E> = BTreeSet::new();
            let mut replaced = Vec::new();
            for e in &elements {
                if let Some(targets) = replacement.targets_for(e.identifier()) {
                    replaced.push(e.identifier().clone());
                    moved.extend(targets.into_iter().map(|t| e.with_identifier(t)));
                }
            }
            elements.retain(|e| !replaced.contains(e.identifier()));
            for fact in moved {
                let target = fact.identifier();
                let observed = elements.iter().any(|e| e.identifier() == target);
                // A target with facts of its own keeps the common ones only.
                if !observed || elements.contains(&fact) {
                    elements.insert(fact);
                }
            }
        }
        Ok(Self::from_elements(elements))
    }
}

impl<E: fmt::Display> fmt::Display for DefiniteDataflow<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bottom {
            return write!(f, "⊥");
        }
        let facts: Vec<String> = self.elements.iter().map(|e| e.to_string()).collect();
        write!(f, "{{{}}}", facts.join(", "))
    }
}

/// Fact "`identifier` definitely holds the integer `value`".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstantPropagation {
    id: Identifier,
    value: i64,
}

impl ConstantPropagation {
    pub fn new(id: Identifier, value: i64) -> Self {
        Self { id, value }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Constant bound to `id` in `domain`, if any.
    pub fn constant_of(domain: &DefiniteDataflow<Self>, id: &Identifier) -> Option<i64> {
        domain.facts(id).next().map(|e| e.value)
    }

    fn eval(expr: &SymbolicExpr, domain: &DefiniteDataflow<Self>) -> Option<i64> {
        match expr {
            SymbolicExpr::Constant(Constant::Int(n)) => Some(*n),
            SymbolicExpr::Identifier(id) => Self::constant_of(domain, id),
            SymbolicExpr::Unary(UnaryOp::Neg, arg) => Self::eval(arg, domain)?.checked_neg(),
            SymbolicExpr::Binary(op, left, right) => {
                let left = Self::eval(left, domain)?;
                let right = Self::eval(right, domain)?;
                match op {
                    BinaryOp::Add => left.checked_add(right),
                    BinaryOp::Sub => left.checked_sub(right),
                    BinaryOp::Mul => left.checked_mul(right),
                    BinaryOp::Div => left.checked_div(right),
                    BinaryOp::Mod => left.checked_rem(right),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl DataflowElement for ConstantPropagation {
    fn identifier(&self) -> &Identifier {
        &self.id
    }

    fn with_identifier(&self, id: Identifier) -> Self {
        Self { id, value: self.value }
    }

    fn gen(id: &Identifier, expr: &SymbolicExpr, _pp: &CodeLocation, domain: &DefiniteDataflow<Self>) -> Result<Vec<Self>> {
        Ok(Self::eval(expr, domain).map(|v| Self::new(id.clone(), v)).into_iter().collect())
    }
}

impl fmt::Display for ConstantPropagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.id, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::laws::check_lattice_laws;
    use crate::symbolic::{AllocationSite, Type};
    use test_log::test;

    type Constants = DefiniteDataflow<ConstantPropagation>;

    fn pp() -> CodeLocation {
        CodeLocation::new("main", 0, 0)
    }

    fn var(name: &str) -> Identifier {
        Identifier::variable(name, Type::Numeric)
    }

    #[test]
    fn test_propagates_through_arithmetic() {
        let state = Constants::new()
            .assign(&var("x"), &SymbolicExpr::int(4), &pp())
            .unwrap();
        let double = SymbolicExpr::binary(BinaryOp::Mul, SymbolicExpr::Identifier(var("x")), SymbolicExpr::int(2));
        let state = state.assign(&var("y"), &double, &pp()).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&state, &var("y")), Some(8));

        let div_zero = SymbolicExpr::binary(BinaryOp::Div, SymbolicExpr::Identifier(var("x")), SymbolicExpr::int(0));
        let state = state.assign(&var("x"), &div_zero, &pp()).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&state, &var("x")), None);
        assert_eq!(ConstantPropagation::constant_of(&state, &var("y")), Some(8));
    }

    #[test]
    fn test_join_keeps_common_facts() {
        let a = Constants::new()
            .assign(&var("x"), &SymbolicExpr::int(1), &pp())
            .unwrap()
            .assign(&var("y"), &SymbolicExpr::int(2), &pp())
            .unwrap();
        let b = Constants::new()
            .assign(&var("x"), &SymbolicExpr::int(1), &pp())
            .unwrap()
            .assign(&var("y"), &SymbolicExpr::int(3), &pp())
            .unwrap();
        let joined = a.lub(&b).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&joined, &var("x")), Some(1));
        assert_eq!(ConstantPropagation::constant_of(&joined, &var("y")), None);
        check_lattice_laws(&[Constants::new(), Constants::new().bottom(), a, b, joined]);
    }

    #[test]
    fn test_weak_write_keeps_common_fact() {
        let cell = Identifier::Heap(AllocationSite::new("main:1", true));
        let state = Constants::new().assign(&cell, &SymbolicExpr::int(1), &pp()).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&state, &cell), None);

        let strong = Identifier::Heap(AllocationSite::new("main:1", false));
        let state = Constants::new().assign(&strong, &SymbolicExpr::int(1), &pp()).unwrap();
        let substitution = [HeapReplacement::new().with_source(strong).with_target(cell.clone())];
        let promoted = state.apply_substitution(&substitution, &pp()).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&promoted, &cell), Some(1));
        let rewritten = promoted.assign(&cell, &SymbolicExpr::int(1), &pp()).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&rewritten, &cell), Some(1));
        let changed = promoted.assign(&cell, &SymbolicExpr::int(2), &pp()).unwrap();
        assert_eq!(ConstantPropagation::constant_of(&changed, &cell), None);
    }
}
