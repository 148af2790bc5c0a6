//! Type inference.
//!
//! [`InferredTypes`] tracks the runtime types a value may have. Lifted through
//! [`Environment`](crate::environment::Environment) it infers, for every identifier, the
//! types it may hold at each program point. Operators applied to operands that cannot
//! have a suitable type evaluate to bottom: the expression never yields a value.

use std::collections::BTreeSet;
use std::fmt;

use crate::environment::NonRelationalElement;
use crate::error::Result;
use crate::lattice::Lattice;
use crate::program::CodeLocation;
use crate::symbolic::{AllocationSite, BinaryOp, Constant, Identifier, SymbolicExpr, TernaryOp, Type, UnaryOp};

/// Types a value can have at runtime.
pub const RUNTIME_TYPES: [Type; 4] = [Type::Numeric, Type::Boolean, Type::Str, Type::Pointer];

/// Set of runtime types. All of [`RUNTIME_TYPES`] is top, the empty set is bottom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InferredTypes {
    types: BTreeSet<Type>,
}

impl Default for InferredTypes {
    fn default() -> Self {
        Self::new()
    }
}

impl InferredTypes {
    /// Top: any runtime type.
    pub fn new() -> Self {
        Self::from_types(RUNTIME_TYPES)
    }

    /// Values of static type `ty`. `Untyped` gives top, `Void` has no value.
    pub fn of(ty: Type) -> Self {
        match ty {
            Type::Untyped => Self::new(),
            Type::Void => Self::from_types([]),
            ty => Self::from_types([ty]),
        }
    }

    pub fn from_types(types: impl IntoIterator<Item = Type>) -> Self {
        Self {
            types: types.into_iter().filter(|ty| RUNTIME_TYPES.contains(ty)).collect(),
        }
    }

    pub fn types(&self) -> &BTreeSet<Type> {
        &self.types
    }

    pub fn may_be(&self, ty: Type) -> bool {
        self.types.contains(&ty)
    }

    /// The only type, if exactly one is possible.
    pub fn exact(&self) -> Option<Type> {
        match self.types.len() {
            1 => self.types.iter().next().copied(),
            _ => None,
        }
    }

    fn require(operands: &[&Self], operand: Type, result: Type) -> Self {
        if operands.iter().all(|o| o.may_be(operand)) {
            Self::of(result)
        } else {
            Self::from_types([])
        }
    }
}

impl fmt::Display for InferredTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_top() {
            return write!(f, "⊤");
        }
        if self.is_bottom() {
            return write!(f, "⊥");
        }
        let names: Vec<String> = self.types.iter().map(|t| t.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl Lattice for InferredTypes {
    fn top(&self) -> Self {
        Self::new()
    }

    fn bottom(&self) -> Self {
        Self::from_types([])
    }

    fn is_top(&self) -> bool {
        self.types.len() == RUNTIME_TYPES.len()
    }

    fn is_bottom(&self) -> bool {
        self.types.is_empty()
    }

    fn lub_aux(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            types: self.types.union(&other.types).copied().collect(),
        })
    }

    fn less_or_equal_aux(&self, other: &Self) -> Result<bool> {
        Ok(self.types.is_subset(&other.types))
    }

    fn glb_aux(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            types: self.types.intersection(&other.types).copied().collect(),
        })
    }
}

impl NonRelationalElement for InferredTypes {
    fn tracks_identifier(&self, _id: &Identifier) -> bool {
        true
    }

    fn can_process(&self, _expr: &SymbolicExpr) -> bool {
        true
    }

    fn eval_constant(&self, constant: &Constant, _pp: &CodeLocation) -> Result<Self> {
        Ok(Self::of(constant.ty()))
    }

    fn eval_push_any(&self, ty: Type, _pp: &CodeLocation) -> Result<Self> {
        Ok(Self::of(ty))
    }

    fn eval_memory_pointer(&self, _site: &AllocationSite, _pp: &CodeLocation) -> Result<Self> {
        Ok(Self::of(Type::Pointer))
    }

    fn eval_unary(&self, op: UnaryOp, arg: &Self, _pp: &CodeLocation) -> Result<Self> {
        let result = match op {
            UnaryOp::Neg => Self::require(&[arg], Type::Numeric, Type::Numeric),
            UnaryOp::Not => Self::require(&[arg], Type::Boolean, Type::Boolean),
        };
        Ok(result)
    }

    fn eval_binary(&self, op: BinaryOp, left: &Self, right: &Self, _pp: &CodeLocation) -> Result<Self> {
        let result = match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                Self::require(&[left, right], Type::Numeric, Type::Numeric)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                Self::require(&[left, right], Type::Numeric, Type::Boolean)
            }
            BinaryOp::And | BinaryOp::Or => Self::require(&[left, right], Type::Boolean, Type::Boolean),
            BinaryOp::Eq | BinaryOp::Ne => Self::of(Type::Boolean),
        };
        Ok(result)
    }

    fn eval_ternary(&self, op: TernaryOp, first: &Self, second: &Self, third: &Self, _pp: &CodeLocation) -> Result<Self> {
        match op {
            TernaryOp::Ite if !first.may_be(Type::Boolean) => Ok(self.bottom()),
            TernaryOp::Ite => second.lub(third),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SemanticDomain;
    use crate::environment::Environment;
    use crate::heap::PointBasedHeap;
    use crate::lattice::laws::check_lattice_laws;
    use crate::state::AbstractState;
    use test_log::test;

    fn pp() -> CodeLocation {
        CodeLocation::new("test", 0, 0)
    }

    fn types(list: &[Type]) -> InferredTypes {
        InferredTypes::from_types(list.iter().copied())
    }

    #[test]
    fn test_inferred_types_lattice_laws() {
        check_lattice_laws(&[
            InferredTypes::new(),
            InferredTypes::of(Type::Void),
            types(&[Type::Numeric]),
            types(&[Type::Boolean]),
            types(&[Type::Numeric, Type::Str]),
            types(&[Type::Str, Type::Pointer, Type::Boolean]),
        ]);
        assert!(InferredTypes::of(Type::Untyped).is_top());
        assert_eq!(types(&[Type::Numeric, Type::Untyped]), types(&[Type::Numeric]));
    }

    #[test]
    fn test_operators_require_operand_types() {
        let d = InferredTypes::new();
        let num = types(&[Type::Numeric]);
        let boolean = types(&[Type::Boolean]);
        let string = types(&[Type::Str]);
        let any = InferredTypes::new();

        assert_eq!(d.eval_binary(BinaryOp::Add, &num, &any, &pp()).unwrap(), num);
        assert!(d.eval_binary(BinaryOp::Add, &num, &string, &pp()).unwrap().is_bottom());
        assert_eq!(d.eval_binary(BinaryOp::Lt, &num, &num, &pp()).unwrap(), boolean);
        assert!(d.eval_binary(BinaryOp::And, &boolean, &num, &pp()).unwrap().is_bottom());
        assert_eq!(d.eval_binary(BinaryOp::Eq, &string, &num, &pp()).unwrap(), boolean);
        assert_eq!(d.eval_unary(UnaryOp::Neg, &any, &pp()).unwrap(), num);
        assert!(d.eval_unary(UnaryOp::Not, &string, &pp()).unwrap().is_bottom());

        let choice = d.eval_ternary(TernaryOp::Ite, &boolean, &num, &string, &pp()).unwrap();
        assert_eq!(choice, types(&[Type::Numeric, Type::Str]));
        assert_eq!(choice.exact(), None);
        assert!(d.eval_ternary(TernaryOp::Ite, &num, &num, &string, &pp()).unwrap().is_bottom());
    }

    #[test]
    fn test_environment_infers_variable_types() {
        let x = Identifier::variable("x", Type::Untyped);
        let y = Identifier::variable("y", Type::Untyped);
        let env = Environment::new(InferredTypes::new())
            .assign(&x, &SymbolicExpr::int(4), &pp())
            .unwrap();
        let test = SymbolicExpr::binary(BinaryOp::Gt, SymbolicExpr::Identifier(x.clone()), SymbolicExpr::int(0));
        let env = env.assign(&y, &test, &pp()).unwrap();
        assert_eq!(env.get(&x).exact(), Some(Type::Numeric));
        assert_eq!(env.get(&y).exact(), Some(Type::Boolean));

        let other = Environment::new(InferredTypes::new())
            .assign(&x, &SymbolicExpr::Constant(Constant::Str("s".into())), &pp())
            .unwrap();
        assert_eq!(env.lub(&other).unwrap().get(&x), types(&[Type::Numeric, Type::Str]));
    }

    #[test]
    fn test_pointers_and_heap_cells() {
        let a = Identifier::variable("a", Type::Pointer);
        let state = AbstractState::new(PointBasedHeap::field_sensitive(), Environment::new(InferredTypes::new()));
        let alloc = SymbolicExpr::allocation("Obj", pp());
        let state = state.assign(&a, &alloc, &pp()).unwrap();
        assert_eq!(state.value().get(&a).exact(), Some(Type::Pointer));

        let target = SymbolicExpr::access(SymbolicExpr::Identifier(a), "name");
        let state = state
            .assign_to(&target, &SymbolicExpr::Constant(Constant::Str("obj".into())), &pp())
            .unwrap();
        let cell = Identifier::Heap(AllocationSite::new("test:0", false).with_field(Some("name".into())));
        assert_eq!(state.value().get(&cell).exact(), Some(Type::Str));
    }
}
