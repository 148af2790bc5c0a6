use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::trace;

use super::rewrite_compound;
use super::sites::AllocationSites;
use crate::domain::{HeapDomain, HeapReplacement, SemanticDomain};
use crate::environment::Environment;
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::satisfiability::Satisfiability;
use crate::symbolic::{
    singleton, AllocationSite, BinaryOp, Constant, ExpressionSet, Identifier, ScopeToken, SymbolicExpr, TernaryOp,
    Type, UnaryOp,
};

/// Whether field accesses derive one abstract location per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldSensitivity {
    /// `e.f` and `e.g` are distinct locations.
    Sensitive,
    /// All fields of an object share one location, which is always weakly updated.
    Insensitive,
}

/// Point-based heap abstraction.
///
/// Maps pointer (and untyped) identifiers to the [`AllocationSites`] they may refer to.
/// Sites are named after the program point that allocates them and are recorded in a
/// registry of allocated locations:
///
/// - the first allocation at a point creates a **strong** site,
/// - any later allocation at the same point turns it **weak** and emits the replacement
///   `strong → weak`, which other domains must apply before going on,
/// - joining two heaps weakens every site that is weak on either side or allocated on one
///   side only, emitting the corresponding replacements.
#[derive(Debug, Clone)]
pub struct PointBasedHeap {
    env: Environment<AllocationSites>,
    allocated: BTreeMap<String, bool>,
    sensitivity: FieldSensitivity,
    substitution: Vec<HeapReplacement>,
}

impl PartialEq for PointBasedHeap {
    fn eq(&self, other: &Self) -> bool {
        self.env == other.env && self.allocated == other.allocated && self.sensitivity == other.sensitivity
    }
}

impl PointBasedHeap {
    pub fn new(sensitivity: FieldSensitivity) -> Self {
        Self {
            env: Environment::new(AllocationSites::Top),
            allocated: BTreeMap::new(),
            sensitivity,
            substitution: Vec::new(),
        }
    }

    pub fn field_sensitive() -> Self {
        Self::new(FieldSensitivity::Sensitive)
    }

    pub fn field_insensitive() -> Self {
        Self::new(FieldSensitivity::Insensitive)
    }

    pub fn sensitivity(&self) -> FieldSensitivity {
        self.sensitivity
    }

    /// Sites `id` may point to.
    pub fn points_to(&self, id: &Identifier) -> AllocationSites {
        self.env.get(id)
    }

    /// Current site allocated at `location`, if any allocation happened there.
    pub fn site_at(&self, location: &CodeLocation) -> Option<AllocationSite> {
        let name = location.to_string();
        self.allocated.get(&name).map(|&weak| AllocationSite::new(name, weak))
    }

    /// Every allocated site.
    pub fn allocated_sites(&self) -> impl Iterator<Item = AllocationSite> + '_ {
        self.allocated.iter().map(|(name, &weak)| AllocationSite::new(name.clone(), weak))
    }

    fn with_parts(&self, env: Environment<AllocationSites>, allocated: BTreeMap<String, bool>) -> Self {
        Self {
            env,
            allocated,
            sensitivity: self.sensitivity,
            substitution: Vec::new(),
        }
    }

    fn without_substitution(&self) -> Self {
        let mut result = self.clone();
        result.substitution.clear();
        result
    }

    fn tracks(id: &Identifier) -> bool {
        let ty = id.ty();
        ty.is_pointer() || ty.is_untyped()
    }

    fn can_process(expr: &SymbolicExpr) -> bool {
        let ty = expr.ty();
        ty.is_pointer() || ty.is_untyped()
    }

    fn field_of(&self, child: &SymbolicExpr) -> Option<String> {
        match (self.sensitivity, child) {
            (FieldSensitivity::Insensitive, _) => None,
            (FieldSensitivity::Sensitive, SymbolicExpr::Constant(Constant::Str(name))) => Some(name.clone()),
            (FieldSensitivity::Sensitive, other) => Some(other.to_string()),
        }
    }

    /// Abstract location of `field` in the objects of `site`.
    fn field_location(&self, site: &AllocationSite, field: Option<String>) -> AllocationSite {
        match self.sensitivity {
            FieldSensitivity::Sensitive => site.with_field(field),
            FieldSensitivity::Insensitive => site.base().with_weak(true),
        }
    }

    /// Environment where every strong site at one of `locations` is weak, both in keys
    /// and in pointed-to sets.
    fn weakened_env(&self, locations: &BTreeSet<String>) -> Result<Environment<AllocationSites>> {
        if locations.is_empty() || self.env.is_bottom() {
            return Ok(self.env.clone());
        }
        let mut env = self.env.top();
        for (id, value) in self.env.iter() {
            let id = match id {
                Identifier::Heap(site) if !site.is_weak() && locations.contains(site.location()) => {
                    Identifier::Heap(site.with_weak(true))
                }
                other => other.clone(),
            };
            let value = value.weaken(locations);
            let value = match env.binding(&id) {
                Some(old) => old.lub(&value)?,
                None => value,
            };
            env.set(id, value);
        }
        Ok(env)
    }

    fn promotion(location: &str) -> HeapReplacement {
        HeapReplacement::new()
            .with_source(Identifier::Heap(AllocationSite::new(location, false)))
            .with_target(Identifier::Heap(AllocationSite::new(location, true)))
    }

    fn allocate(&mut self, location: &CodeLocation) -> Result<AllocationSite> {
        let name = location.to_string();
        match self.allocated.get(&name).copied() {
            None => {
                self.allocated.insert(name.clone(), false);
                Ok(AllocationSite::new(name, false))
            }
            Some(true) => Ok(AllocationSite::new(name, true)),
            Some(false) => {
                trace!("second allocation at {}: site becomes weak", name);
                self.allocated.insert(name.clone(), true);
                self.env = self.weakened_env(&BTreeSet::from([name.clone()]))?;
                self.substitution.push(Self::promotion(&name));
                Ok(AllocationSite::new(name, true))
            }
        }
    }

    fn allocate_all(&mut self, expr: &SymbolicExpr) -> Result<()> {
        match expr {
            SymbolicExpr::HeapAllocation { location, .. } => {
                self.allocate(location)?;
            }
            SymbolicExpr::Unary(_, e) => self.allocate_all(e)?,
            SymbolicExpr::Binary(_, l, r) => {
                self.allocate_all(l)?;
                self.allocate_all(r)?;
            }
            SymbolicExpr::Ternary(_, a, b, c) => {
                self.allocate_all(a)?;
                self.allocate_all(b)?;
                self.allocate_all(c)?;
            }
            SymbolicExpr::AccessChild { container, child } => {
                self.allocate_all(container)?;
                self.allocate_all(child)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Sites the pointer expression `expr` may refer to.
    fn resolve(&self, expr: &SymbolicExpr) -> Result<AllocationSites> {
        let sites = match expr {
            SymbolicExpr::MemoryPointer(site) => AllocationSites::singleton(site.clone()),
            SymbolicExpr::HeapAllocation { location, .. } => match self.site_at(location) {
                Some(site) => AllocationSites::singleton(site),
                None => AllocationSites::Top,
            },
            SymbolicExpr::Identifier(id) if Self::tracks(id) => self.env.get(id),
            SymbolicExpr::AccessChild { container, child } => match self.resolve(container)? {
                AllocationSites::Top => AllocationSites::Top,
                AllocationSites::Sites(sites) => {
                    let field = self.field_of(child);
                    let mut result = AllocationSites::empty();
                    for site in &sites {
                        let location = Identifier::Heap(self.field_location(site, field.clone()));
                        result = result.lub(&self.env.get(&location))?;
                    }
                    result
                }
            },
            SymbolicExpr::Ternary(TernaryOp::Ite, _, a, b) => self.resolve(a)?.lub(&self.resolve(b)?)?,
            SymbolicExpr::PushAny(ty) if ty.is_pointer() || ty.is_untyped() => AllocationSites::Top,
            _ => AllocationSites::empty(),
        };
        Ok(sites)
    }

    /// Locations of sites strong in `self` and weak in `other`.
    fn promoted_towards(&self, other: &Self) -> BTreeSet<String> {
        self.allocated
            .iter()
            .filter(|&(name, &weak)| !weak && other.allocated.get(name).copied().unwrap_or(false))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn rewrite_leaf(&self, expr: &SymbolicExpr) -> Result<ExpressionSet> {
        let rewritten = match expr {
            SymbolicExpr::HeapAllocation { location, .. } => match self.site_at(location) {
                Some(site) => singleton(SymbolicExpr::MemoryPointer(site)),
                None => singleton(SymbolicExpr::PushAny(Type::Pointer)),
            },
            SymbolicExpr::AccessChild { container, child } => {
                let field = self.field_of(child);
                match self.resolve(container)? {
                    AllocationSites::Top if self.allocated.is_empty() => singleton(SymbolicExpr::PushAny(Type::Untyped)),
                    // An unknown container may also denote an object never seen by the
                    // analysis, so the result always keeps an unknown alternative.
                    AllocationSites::Top => self
                        .allocated_sites()
                        .map(|site| SymbolicExpr::Identifier(Identifier::Heap(self.field_location(&site, field.clone()))))
                        .chain(std::iter::once(SymbolicExpr::PushAny(Type::Untyped)))
                        .collect(),
                    AllocationSites::Sites(sites) => sites
                        .iter()
                        .map(|site| SymbolicExpr::Identifier(Identifier::Heap(self.field_location(site, field.clone()))))
                        .collect(),
                }
            }
            SymbolicExpr::Identifier(id) if id.ty().is_pointer() => match self.env.get(id) {
                AllocationSites::Top => singleton(expr.clone()),
                AllocationSites::Sites(sites) if sites.is_empty() => singleton(SymbolicExpr::Constant(Constant::Null)),
                AllocationSites::Sites(sites) => sites.into_iter().map(SymbolicExpr::MemoryPointer).collect(),
            },
            other => singleton(other.clone()),
        };
        Ok(rewritten)
    }
}

impl SemanticDomain for PointBasedHeap {
    fn assign(&self, id: &Identifier, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        let mut result = self.small_step_semantics(expr, pp)?;
        if result.env.is_bottom() || !Self::tracks(id) {
            return Ok(result);
        }
        if !Self::can_process(expr) {
            result.env = result.env.forget(id);
            return Ok(result);
        }
        let mut value = result.resolve(expr)?;
        if id.is_weak() {
            value = value.lub(&result.env.get(id))?;
        }
        result.env.set(id.clone(), value);
        Ok(result)
    }

    fn small_step_semantics(&self, expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<Self> {
        let mut result = self.without_substitution();
        if !result.env.is_bottom() {
            result.allocate_all(expr)?;
        }
        Ok(result)
    }

    fn assume(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Self> {
        let result = self.small_step_semantics(expr, pp)?;
        match result.satisfies(expr, pp)? {
            Satisfiability::NotSatisfied | Satisfiability::Bottom => Ok(result.bottom()),
            _ => Ok(result),
        }
    }

    fn satisfies(&self, expr: &SymbolicExpr, pp: &CodeLocation) -> Result<Satisfiability> {
        if self.env.is_bottom() {
            return Ok(Satisfiability::Bottom);
        }
        match expr {
            SymbolicExpr::Unary(UnaryOp::Not, arg) => Ok(self.satisfies(arg, pp)?.negate()),
            SymbolicExpr::Binary(op @ (BinaryOp::Eq | BinaryOp::Ne), left, right)
                if left.ty().is_pointer() && right.ty().is_pointer() =>
            {
                let (l, r) = (self.resolve(left)?, self.resolve(right)?);
                let equal = match (l.sites(), r.sites()) {
                    (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() && l.is_disjoint(&r) => {
                        Satisfiability::NotSatisfied
                    }
                    (Some(a), Some(b)) if a.len() == 1 && a == b && a.iter().all(|s| !s.is_weak()) => {
                        Satisfiability::Satisfied
                    }
                    _ => Satisfiability::Unknown,
                };
                Ok(if *op == BinaryOp::Eq { equal } else { equal.negate() })
            }
            _ => Ok(Satisfiability::Unknown),
        }
    }

    fn forget_identifier(&self, id: &Identifier) -> Result<Self> {
        Ok(self.with_parts(self.env.forget(id), self.allocated.clone()))
    }

    fn push_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(self.with_parts(self.env.push_scope_keys(scope), self.allocated.clone()))
    }

    fn pop_scope(&self, scope: &ScopeToken) -> Result<Self> {
        Ok(self.with_parts(self.env.pop_scope_keys(scope), self.allocated.clone()))
    }
}

impl HeapDomain for PointBasedHeap {
    fn rewrite(&self, expr: &SymbolicExpr, _pp: &CodeLocation) -> Result<ExpressionSet> {
        rewrite_compound(expr, &|leaf| self.rewrite_leaf(leaf))
    }

    fn substitution(&self) -> &[HeapReplacement] {
        &self.substitution
    }

    fn take_substitution(&mut self) -> Vec<HeapReplacement> {
        std::mem::take(&mut self.substitution)
    }

    fn promotions_towards(&self, other: &Self) -> Result<Vec<HeapReplacement>> {
        Ok(self.promoted_towards(other).iter().map(|name| Self::promotion(name)).collect())
    }
}

impl Lattice for PointBasedHeap {
    fn top(&self) -> Self {
        self.with_parts(self.env.top(), self.allocated.clone())
    }

    fn bottom(&self) -> Self {
        self.with_parts(self.env.bottom(), BTreeMap::new())
    }

    // The registry only records what has been allocated so far; it does not restrict
    // the represented states.
    fn is_top(&self) -> bool {
        self.env.is_top()
    }

    fn is_bottom(&self) -> bool {
        self.env.is_bottom()
    }

    // Top and comparable heaps still go through `lub_aux`: the registries must be merged
    // and the sites turning weak must be reported.
    fn lub(&self, other: &Self) -> Result<Self> {
        if other.is_bottom() || self == other {
            return Ok(self.without_substitution());
        }
        if self.is_bottom() {
            return Ok(other.without_substitution());
        }
        self.lub_aux(other)
    }

    fn widening(&self, other: &Self) -> Result<Self> {
        self.lub(other)
    }

    // A top heap still carries a registry to compare against.
    fn less_or_equal(&self, other: &Self) -> Result<bool> {
        if self.is_bottom() || self == other {
            return Ok(true);
        }
        if other.is_bottom() {
            return Ok(false);
        }
        self.less_or_equal_aux(other)
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        let mut allocated = BTreeMap::new();
        let mut promoted = BTreeSet::new();
        let names: BTreeSet<&String> = self.allocated.keys().chain(other.allocated.keys()).collect();
        for name in names {
            let left = self.allocated.get(name).copied();
            let right = other.allocated.get(name).copied();
            let weak = match (left, right) {
                (Some(a), Some(b)) => a || b,
                _ => true,
            };
            if weak && (left == Some(false) || right == Some(false)) {
                promoted.insert(name.clone());
            }
            allocated.insert(name.clone(), weak);
        }
        let env = self.weakened_env(&promoted)?.lub(&other.weakened_env(&promoted)?)?;
        let mut result = self.with_parts(env, allocated);
        result.substitution = promoted.iter().map(|name| Self::promotion(name)).collect();
        Ok(result)
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        let registry = self
            .allocated
            .iter()
            .all(|(name, &weak)| matches!(other.allocated.get(name), Some(&w) if w || !weak));
        if !registry {
            return Ok(false);
        }
        // Cells of sites weak in `other` only are compared under their weak name.
        self.weakened_env(&self.promoted_towards(other))?.less_or_equal(&other.env)
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        let allocated = self
            .allocated
            .iter()
            .filter_map(|(name, &weak)| other.allocated.get(name).map(|&w| (name.clone(), weak && w)))
            .collect();
        Ok(self.with_parts(self.env.glb(&other.env)?, allocated))
    }
}

impl fmt::Display for PointBasedHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.env)
    }
}
