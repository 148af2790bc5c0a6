//! Symbolic expressions.
//!
//! Symbolic expressions are the side-effect-free language that abstract domains
//! understand. Program expressions are translated into sets of symbolic expressions by
//! the statement semantics, heap-level forms ([`SymbolicExpr::HeapAllocation`],
//! [`SymbolicExpr::AccessChild`]) are rewritten by the heap domain into value-level
//! forms before they reach a value domain.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::program::CodeLocation;

/// Static type of identifiers and expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Untyped,
    Numeric,
    Boolean,
    Str,
    Pointer,
    Void,
}

impl Type {
    pub fn is_pointer(self) -> bool {
        self == Type::Pointer
    }

    pub fn is_untyped(self) -> bool {
        self == Type::Untyped
    }

    pub fn is_void(self) -> bool {
        self == Type::Void
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Type::Untyped => "untyped",
            Type::Numeric => "num",
            Type::Boolean => "bool",
            Type::Str => "str",
            Type::Pointer => "ptr",
            Type::Void => "void",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(String),
    Null,
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int(_) => Type::Numeric,
            Constant::Bool(_) => Type::Boolean,
            Constant::Str(_) => Type::Str,
            Constant::Null => Type::Pointer,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Str(s) => write!(f, "\"{}\"", s),
            Constant::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn result_type(self) -> Type {
        match self {
            UnaryOp::Neg => Type::Numeric,
            UnaryOp::Not => Type::Boolean,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Comparison holding exactly when `self` does not.
    pub fn negate(self) -> Option<BinaryOp> {
        let op = match self {
            BinaryOp::Eq => BinaryOp::Ne,
            BinaryOp::Ne => BinaryOp::Eq,
            BinaryOp::Lt => BinaryOp::Ge,
            BinaryOp::Le => BinaryOp::Gt,
            BinaryOp::Gt => BinaryOp::Le,
            BinaryOp::Ge => BinaryOp::Lt,
            _ => return None,
        };
        Some(op)
    }

    /// Comparison with swapped operands: `a < b` iff `b > a`.
    pub fn flip(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            op => op,
        }
    }

    pub fn result_type(self) -> Type {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => Type::Numeric,
            _ => Type::Boolean,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Ternary operators. `Ite(c, a, b)` is the conditional choice `c ? a : b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TernaryOp {
    Ite,
}

/// Program variable. Two variables are the same identifier iff their names match.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self { name: name.into(), ty }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Variable {}

impl Hash for Variable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for Variable {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Variable {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Abstract name of the heap objects created at one program point.
///
/// A *strong* site denotes exactly one runtime object and may be overwritten.
/// A *weak* site may denote several objects and is only ever joined into.
/// Field-sensitive heaps derive one site per `(base, field)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationSite {
    location: String,
    field: Option<String>,
    weak: bool,
}

impl AllocationSite {
    pub fn new(location: impl Into<String>, weak: bool) -> Self {
        Self {
            location: location.into(),
            field: None,
            weak,
        }
    }

    /// Site naming the `field` of the objects denoted by `self`.
    pub fn with_field(&self, field: Option<String>) -> Self {
        Self {
            location: self.location.clone(),
            field,
            weak: self.weak,
        }
    }

    pub fn with_weak(&self, weak: bool) -> Self {
        Self {
            location: self.location.clone(),
            field: self.field.clone(),
            weak,
        }
    }

    /// The site without field derivation.
    pub fn base(&self) -> Self {
        self.with_field(None)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Name shared by the weak and strong variants of the site.
    pub fn name(&self) -> String {
        match &self.field {
            Some(field) => format!("{}[{}]", self.location, field),
            None => self.location.clone(),
        }
    }
}

impl fmt::Display for AllocationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.weak { "w" } else { "s" };
        write!(f, "heap[{}]:{}", kind, self.name())
    }
}

/// Scope introduced by a call site. Caller identifiers are hidden behind it while the
/// callee runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeToken(CodeLocation);

impl ScopeToken {
    pub fn new(call_site: CodeLocation) -> Self {
        ScopeToken(call_site)
    }

    pub fn call_site(&self) -> &CodeLocation {
        &self.0
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    Variable(Variable),
    Heap(AllocationSite),
    /// Identifier of an enclosing frame, hidden behind a call scope.
    OutOfScope { inner: Box<Identifier>, scope: ScopeToken },
}

impl Identifier {
    pub fn variable(name: impl Into<String>, ty: Type) -> Self {
        Identifier::Variable(Variable::new(name, ty))
    }

    pub fn ty(&self) -> Type {
        match self {
            Identifier::Variable(v) => v.ty(),
            Identifier::Heap(_) => Type::Untyped,
            Identifier::OutOfScope { inner, .. } => inner.ty(),
        }
    }

    pub fn is_weak(&self) -> bool {
        match self {
            Identifier::Variable(_) => false,
            Identifier::Heap(site) => site.is_weak(),
            Identifier::OutOfScope { inner, .. } => inner.is_weak(),
        }
    }

    pub fn is_heap(&self) -> bool {
        matches!(self, Identifier::Heap(_))
    }

    pub fn as_site(&self) -> Option<&AllocationSite> {
        match self {
            Identifier::Heap(site) => Some(site),
            _ => None,
        }
    }

    /// Hides the identifier behind `scope`. Heap identifiers are global and unchanged.
    pub fn push_scope(&self, scope: &ScopeToken) -> Identifier {
        match self {
            Identifier::Heap(_) => self.clone(),
            _ => Identifier::OutOfScope {
                inner: Box::new(self.clone()),
                scope: scope.clone(),
            },
        }
    }

    /// Reveals identifiers hidden behind `scope`; plain variables are locals of the
    /// frame being left and disappear.
    pub fn pop_scope(&self, scope: &ScopeToken) -> Option<Identifier> {
        match self {
            Identifier::Variable(_) => None,
            Identifier::Heap(_) => Some(self.clone()),
            Identifier::OutOfScope { inner, scope: s } if s == scope => Some((**inner).clone()),
            Identifier::OutOfScope { .. } => Some(self.clone()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Variable(v) => write!(f, "{}", v.name()),
            Identifier::Heap(site) => write!(f, "{}", site),
            Identifier::OutOfScope { inner, scope } => write!(f, "[{}]{}", scope, inner),
        }
    }
}

/// Side-effect-free symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolicExpr {
    Constant(Constant),
    Identifier(Identifier),
    Unary(UnaryOp, Box<SymbolicExpr>),
    Binary(BinaryOp, Box<SymbolicExpr>, Box<SymbolicExpr>),
    Ternary(TernaryOp, Box<SymbolicExpr>, Box<SymbolicExpr>, Box<SymbolicExpr>),
    /// Creation of a fresh object at `location`.
    HeapAllocation { type_name: String, location: CodeLocation },
    /// Access to the `child` of the object(s) denoted by `container`.
    AccessChild {
        container: Box<SymbolicExpr>,
        child: Box<SymbolicExpr>,
    },
    /// Address of the objects named by an allocation site.
    MemoryPointer(AllocationSite),
    /// Any value of the given type.
    PushAny(Type),
    /// No value.
    Skip,
}

impl SymbolicExpr {
    pub fn int(value: i64) -> Self {
        SymbolicExpr::Constant(Constant::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        SymbolicExpr::Constant(Constant::Bool(value))
    }

    pub fn var(name: impl Into<String>, ty: Type) -> Self {
        SymbolicExpr::Identifier(Identifier::variable(name, ty))
    }

    pub fn unary(op: UnaryOp, arg: SymbolicExpr) -> Self {
        SymbolicExpr::Unary(op, Box::new(arg))
    }

    pub fn not(arg: SymbolicExpr) -> Self {
        SymbolicExpr::unary(UnaryOp::Not, arg)
    }

    pub fn binary(op: BinaryOp, left: SymbolicExpr, right: SymbolicExpr) -> Self {
        SymbolicExpr::Binary(op, Box::new(left), Box::new(right))
    }

    pub fn ternary(op: TernaryOp, first: SymbolicExpr, second: SymbolicExpr, third: SymbolicExpr) -> Self {
        SymbolicExpr::Ternary(op, Box::new(first), Box::new(second), Box::new(third))
    }

    pub fn allocation(type_name: impl Into<String>, location: CodeLocation) -> Self {
        SymbolicExpr::HeapAllocation {
            type_name: type_name.into(),
            location,
        }
    }

    pub fn access(container: SymbolicExpr, field: impl Into<String>) -> Self {
        SymbolicExpr::AccessChild {
            container: Box::new(container),
            child: Box::new(SymbolicExpr::Constant(Constant::Str(field.into()))),
        }
    }

    pub fn ty(&self) -> Type {
        match self {
            SymbolicExpr::Constant(c) => c.ty(),
            SymbolicExpr::Identifier(id) => id.ty(),
            SymbolicExpr::Unary(op, _) => op.result_type(),
            SymbolicExpr::Binary(op, _, _) => op.result_type(),
            SymbolicExpr::Ternary(TernaryOp::Ite, _, a, b) => {
                if a.ty() == b.ty() {
                    a.ty()
                } else {
                    Type::Untyped
                }
            }
            SymbolicExpr::HeapAllocation { .. } | SymbolicExpr::MemoryPointer(_) => Type::Pointer,
            SymbolicExpr::AccessChild { .. } => Type::Untyped,
            SymbolicExpr::PushAny(ty) => *ty,
            SymbolicExpr::Skip => Type::Void,
        }
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            SymbolicExpr::Identifier(id) => Some(id),
            _ => None,
        }
    }

    /// Whether the expression is free of heap-level forms and can be handed to a value
    /// domain.
    pub fn is_heap_free(&self) -> bool {
        match self {
            SymbolicExpr::HeapAllocation { .. } | SymbolicExpr::AccessChild { .. } => false,
            SymbolicExpr::Unary(_, e) => e.is_heap_free(),
            SymbolicExpr::Binary(_, l, r) => l.is_heap_free() && r.is_heap_free(),
            SymbolicExpr::Ternary(_, a, b, c) => a.is_heap_free() && b.is_heap_free() && c.is_heap_free(),
            _ => true,
        }
    }

    /// Identifiers occurring in the expression.
    pub fn identifiers(&self) -> BTreeSet<&Identifier> {
        let mut ids = BTreeSet::new();
        self.collect_identifiers(&mut ids);
        ids
    }

    fn collect_identifiers<'a>(&'a self, ids: &mut BTreeSet<&'a Identifier>) {
        match self {
            SymbolicExpr::Identifier(id) => {
                ids.insert(id);
            }
            SymbolicExpr::Unary(_, e) => e.collect_identifiers(ids),
            SymbolicExpr::Binary(_, l, r) => {
                l.collect_identifiers(ids);
                r.collect_identifiers(ids);
            }
            SymbolicExpr::Ternary(_, a, b, c) => {
                a.collect_identifiers(ids);
                b.collect_identifiers(ids);
                c.collect_identifiers(ids);
            }
            SymbolicExpr::AccessChild { container, child } => {
                container.collect_identifiers(ids);
                child.collect_identifiers(ids);
            }
            _ => {}
        }
    }

    /// Applies `f` to every identifier; `None` replaces the identifier by `top` of its type.
    fn map_identifiers(&self, f: &impl Fn(&Identifier) -> Option<Identifier>) -> SymbolicExpr {
        match self {
            SymbolicExpr::Identifier(id) => match f(id) {
                Some(id) => SymbolicExpr::Identifier(id),
                None => SymbolicExpr::PushAny(id.ty()),
            },
            SymbolicExpr::Unary(op, e) => SymbolicExpr::Unary(*op, Box::new(e.map_identifiers(f))),
            SymbolicExpr::Binary(op, l, r) => {
                SymbolicExpr::Binary(*op, Box::new(l.map_identifiers(f)), Box::new(r.map_identifiers(f)))
            }
            SymbolicExpr::Ternary(op, a, b, c) => SymbolicExpr::Ternary(
                *op,
                Box::new(a.map_identifiers(f)),
                Box::new(b.map_identifiers(f)),
                Box::new(c.map_identifiers(f)),
            ),
            SymbolicExpr::AccessChild { container, child } => SymbolicExpr::AccessChild {
                container: Box::new(container.map_identifiers(f)),
                child: Box::new(child.map_identifiers(f)),
            },
            other => other.clone(),
        }
    }

    pub fn push_scope(&self, scope: &ScopeToken) -> SymbolicExpr {
        self.map_identifiers(&|id| Some(id.push_scope(scope)))
    }

    pub fn pop_scope(&self, scope: &ScopeToken) -> SymbolicExpr {
        self.map_identifiers(&|id| id.pop_scope(scope))
    }

    /// Pushes logical negations down to the comparisons, using De Morgan's laws.
    pub fn remove_negations(&self) -> SymbolicExpr {
        let SymbolicExpr::Unary(UnaryOp::Not, inner) = self else {
            return self.clone();
        };
        match inner.as_ref() {
            SymbolicExpr::Unary(UnaryOp::Not, e) => e.remove_negations(),
            SymbolicExpr::Binary(BinaryOp::And, l, r) => SymbolicExpr::binary(
                BinaryOp::Or,
                SymbolicExpr::not((**l).clone()).remove_negations(),
                SymbolicExpr::not((**r).clone()).remove_negations(),
            ),
            SymbolicExpr::Binary(BinaryOp::Or, l, r) => SymbolicExpr::binary(
                BinaryOp::And,
                SymbolicExpr::not((**l).clone()).remove_negations(),
                SymbolicExpr::not((**r).clone()).remove_negations(),
            ),
            SymbolicExpr::Binary(op, l, r) => match op.negate() {
                Some(negated) => SymbolicExpr::Binary(negated, l.clone(), r.clone()),
                None => self.clone(),
            },
            SymbolicExpr::Constant(Constant::Bool(b)) => SymbolicExpr::boolean(!b),
            _ => self.clone(),
        }
    }
}

impl From<Identifier> for SymbolicExpr {
    fn from(id: Identifier) -> Self {
        SymbolicExpr::Identifier(id)
    }
}

impl fmt::Display for SymbolicExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolicExpr::Constant(c) => write!(f, "{}", c),
            SymbolicExpr::Identifier(id) => write!(f, "{}", id),
            SymbolicExpr::Unary(op, e) => write!(f, "{}{}", op, e),
            SymbolicExpr::Binary(op, l, r) => write!(f, "({} {} {})", l, op, r),
            SymbolicExpr::Ternary(TernaryOp::Ite, c, a, b) => write!(f, "({} ? {} : {})", c, a, b),
            SymbolicExpr::HeapAllocation { type_name, location } => write!(f, "new {}@{}", type_name, location),
            SymbolicExpr::AccessChild { container, child } => write!(f, "{}->{}", container, child),
            SymbolicExpr::MemoryPointer(site) => write!(f, "&{}", site),
            SymbolicExpr::PushAny(ty) => write!(f, "any<{}>", ty),
            SymbolicExpr::Skip => write!(f, "skip"),
        }
    }
}

/// Set of alternative symbolic expressions a program expression may evaluate to.
pub type ExpressionSet = BTreeSet<SymbolicExpr>;

pub fn singleton(expr: SymbolicExpr) -> ExpressionSet {
    let mut set = ExpressionSet::new();
    set.insert(expr);
    set
}
