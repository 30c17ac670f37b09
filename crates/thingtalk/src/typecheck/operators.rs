//! Polymorphic operator tables and overload resolution.
//!
//! Each operator is a list of type templates; templates may contain
//! `Type::Var` (single-letter variables), the `Measure("")` unit hole, and
//! the `Entity("")` entity hole. Resolution tries templates in order with a
//! fresh [`TypeScope`] each, so a failed unification cannot poison the next
//! attempt.

use crate::ast::{BinaryOp, ScalarOp};
use crate::error::{TypeError, TypeErrorKind, TypeResult};
use crate::types::{is_assignable, EntitySubtypes, Type, TypeScope};

fn var(name: &str) -> Type {
    Type::Var(name.to_owned())
}

/// One overload of a binary predicate: the template for (lhs, rhs).
pub struct BinaryOverload {
    pub lhs: Type,
    pub rhs: Type,
}

fn binary(lhs: Type, rhs: Type) -> BinaryOverload {
    BinaryOverload { lhs, rhs }
}

/// The overload list of one binary operator.
pub fn binary_overloads(op: BinaryOp) -> Vec<BinaryOverload> {
    let ordered = || {
        vec![
            binary(Type::Number, Type::Number),
            binary(Type::Currency, Type::Currency),
            binary(Type::measure(""), Type::measure("")),
            binary(Type::Date, Type::Date),
            binary(Type::Time, Type::Time),
            binary(Type::String, Type::String),
        ]
    };
    match op {
        BinaryOp::Eq => vec![binary(var("a"), var("a"))],
        BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => ordered(),
        BinaryOp::Like
        | BinaryOp::RevLike
        | BinaryOp::StartsWith
        | BinaryOp::EndsWith
        | BinaryOp::PrefixOf
        | BinaryOp::SuffixOf => vec![binary(Type::String, Type::String)],
        BinaryOp::Contains => vec![binary(Type::array(var("a")), var("a"))],
        BinaryOp::InArray => vec![binary(var("a"), Type::array(var("a")))],
        BinaryOp::ContainsLike | BinaryOp::LikeContains => vec![binary(Type::array(Type::String), Type::String)],
        BinaryOp::InArrayLike | BinaryOp::LikeInArray => vec![binary(Type::String, Type::array(Type::String))],
        BinaryOp::HasMember => vec![binary(Type::entity("tt:contact_group"), Type::entity("tt:contact"))],
        BinaryOp::GroupMember => vec![binary(Type::entity("tt:contact"), Type::entity("tt:contact_group"))],
    }
}

/// Picks the first binary overload both operand types unify with.
///
/// Returns the overload index and the unification scope (with `_unit` /
/// `_entity` / variable bindings) for callers that need the resolved
/// operand types.
pub fn resolve_binary(
    op: BinaryOp,
    lhs: &Type,
    rhs: &Type,
    entities: &EntitySubtypes,
) -> TypeResult<(usize, TypeScope)> {
    for (index, overload) in binary_overloads(op).iter().enumerate() {
        let mut scope = TypeScope::new();
        if is_assignable(lhs, &overload.lhs, &mut scope, entities)
            && is_assignable(rhs, &overload.rhs, &mut scope, entities)
        {
            return Ok((index, scope));
        }
    }
    Err(TypeError::new(
        TypeErrorKind::InvalidOverload,
        format!("operator {op} is not defined on ({lhs}, {rhs})"),
    ))
}

/// One overload of a scalar operator: parameter templates and result.
pub struct ScalarOverload {
    pub params: Vec<Type>,
    pub result: Type,
}

fn scalar(params: Vec<Type>, result: Type) -> ScalarOverload {
    ScalarOverload { params, result }
}

/// The overload list of one scalar operator.
pub fn scalar_overloads(op: ScalarOp) -> Vec<ScalarOverload> {
    match op {
        ScalarOp::Add => vec![
            scalar(vec![Type::Number, Type::Number], Type::Number),
            scalar(vec![Type::Currency, Type::Currency], Type::Currency),
            scalar(vec![Type::measure(""), Type::measure("")], Type::measure("")),
            scalar(vec![Type::Date, Type::measure("ms")], Type::Date),
            scalar(vec![Type::Time, Type::measure("ms")], Type::Time),
            scalar(vec![Type::String, Type::String], Type::String),
        ],
        ScalarOp::Sub => vec![
            scalar(vec![Type::Number, Type::Number], Type::Number),
            scalar(vec![Type::Currency, Type::Currency], Type::Currency),
            scalar(vec![Type::measure(""), Type::measure("")], Type::measure("")),
            scalar(vec![Type::Date, Type::measure("ms")], Type::Date),
            scalar(vec![Type::Time, Type::measure("ms")], Type::Time),
        ],
        ScalarOp::Mul => vec![
            scalar(vec![Type::Number, Type::Number], Type::Number),
            scalar(vec![Type::Currency, Type::Number], Type::Currency),
            scalar(vec![Type::measure(""), Type::Number], Type::measure("")),
        ],
        ScalarOp::Div => vec![
            scalar(vec![Type::Number, Type::Number], Type::Number),
            scalar(vec![Type::Currency, Type::Number], Type::Currency),
            scalar(vec![Type::measure(""), Type::Number], Type::measure("")),
        ],
        ScalarOp::Mod | ScalarOp::Pow => vec![scalar(vec![Type::Number, Type::Number], Type::Number)],
        ScalarOp::Distance => vec![scalar(vec![Type::Location, Type::Location], Type::measure("m"))],
        ScalarOp::Max | ScalarOp::Min | ScalarOp::Sum | ScalarOp::Avg => vec![
            scalar(vec![Type::array(Type::Number)], Type::Number),
            scalar(vec![Type::array(Type::Currency)], Type::Currency),
            scalar(vec![Type::array(Type::measure(""))], Type::measure("")),
        ],
        ScalarOp::Count => vec![scalar(vec![Type::array(var("a"))], Type::Number)],
    }
}

/// Picks the first scalar overload the argument types unify with and returns
/// the fully resolved result type.
pub fn resolve_scalar(op: ScalarOp, args: &[Type], entities: &EntitySubtypes) -> TypeResult<Type> {
    'overloads: for overload in scalar_overloads(op) {
        if overload.params.len() != args.len() {
            continue;
        }
        let mut scope = TypeScope::new();
        for (arg, param) in args.iter().zip(&overload.params) {
            if !is_assignable(arg, param, &mut scope, entities) {
                continue 'overloads;
            }
        }
        if let Some(result) = overload.result.resolve(&scope) {
            return Ok(result);
        }
    }
    let shown: Vec<String> = args.iter().map(ToString::to_string).collect();
    Err(TypeError::new(
        TypeErrorKind::InvalidOverload,
        format!("operator {op} is not defined on ({})", shown.join(", ")),
    ))
}
