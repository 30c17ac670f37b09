//! Filter (boolean) and scalar (computation) expressions.
//!
//! Operator enums live here next to the expressions that carry them, the way
//! the surface language spells them; the overload tables that give them types
//! are in `typecheck::operators`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::invocation::{InputParam, SchemaSlot, Selector};
use crate::value::Value;

/// Binary predicate operators usable in filter atoms.
///
/// The fuzzy array variants have explicit quantifier semantics:
/// `contains~` is ∃x∈a. x =~ b, `~contains` is ∃x∈a. b =~ x, and the
/// `in_array` forms are the same with the array on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum BinaryOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<")]
    Lt,
    /// `a =~ b`: the string `a` contains `b` as a substring.
    #[strum(serialize = "=~")]
    Like,
    /// `a ~= b`: the string `b` contains `a` as a substring.
    #[strum(serialize = "~=")]
    RevLike,
    #[strum(serialize = "starts_with")]
    StartsWith,
    #[strum(serialize = "ends_with")]
    EndsWith,
    #[strum(serialize = "prefix_of")]
    PrefixOf,
    #[strum(serialize = "suffix_of")]
    SuffixOf,
    /// Array membership, array on the left.
    #[strum(serialize = "contains")]
    Contains,
    /// Array membership, array on the right.
    #[strum(serialize = "in_array")]
    InArray,
    #[strum(serialize = "contains~")]
    ContainsLike,
    #[strum(serialize = "~contains")]
    LikeContains,
    #[strum(serialize = "in_array~")]
    InArrayLike,
    #[strum(serialize = "~in_array")]
    LikeInArray,
    /// Contact is a member of a contact group.
    #[strum(serialize = "has_member")]
    HasMember,
    #[strum(serialize = "group_member")]
    GroupMember,
}

impl BinaryOp {
    /// The mirror operator under operand exchange, where one exists. Used by
    /// the optimizer to put constants on the right.
    pub fn flipped(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Eq),
            BinaryOp::Ge => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Ge),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::Like => Some(BinaryOp::RevLike),
            BinaryOp::RevLike => Some(BinaryOp::Like),
            BinaryOp::StartsWith => Some(BinaryOp::PrefixOf),
            BinaryOp::PrefixOf => Some(BinaryOp::StartsWith),
            BinaryOp::EndsWith => Some(BinaryOp::SuffixOf),
            BinaryOp::SuffixOf => Some(BinaryOp::EndsWith),
            BinaryOp::Contains => Some(BinaryOp::InArray),
            BinaryOp::InArray => Some(BinaryOp::Contains),
            BinaryOp::ContainsLike => Some(BinaryOp::InArrayLike),
            BinaryOp::InArrayLike => Some(BinaryOp::ContainsLike),
            BinaryOp::LikeContains => Some(BinaryOp::LikeInArray),
            BinaryOp::LikeInArray => Some(BinaryOp::LikeContains),
            BinaryOp::HasMember => Some(BinaryOp::GroupMember),
            BinaryOp::GroupMember => Some(BinaryOp::HasMember),
        }
    }
}

/// Scalar computation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ScalarOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "**")]
    Pow,
    #[strum(serialize = "distance")]
    Distance,
    #[strum(serialize = "max")]
    Max,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "sum")]
    Sum,
    #[strum(serialize = "avg")]
    Avg,
    #[strum(serialize = "count")]
    Count,
}

/// Aggregation operators over a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum AggregationOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
}

/// A boolean filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BooleanExpression {
    True,
    False,
    And(Vec<BooleanExpression>),
    Or(Vec<BooleanExpression>),
    Not(Box<BooleanExpression>),
    /// `name op value` over an output of the enclosing primitive.
    Atom {
        name: String,
        operator: BinaryOp,
        value: Value,
    },
    /// A sub-query used as a predicate: true if any result of the invocation
    /// satisfies the inner filter.
    External {
        selector: Selector,
        channel: String,
        in_params: Vec<InputParam>,
        filter: Box<BooleanExpression>,
        schema: SchemaSlot,
    },
    /// `expr op value` where the left side is a computation.
    Compute {
        lhs: ScalarExpression,
        operator: BinaryOp,
        rhs: Value,
    },
}

impl BooleanExpression {
    pub fn atom(name: &str, operator: BinaryOp, value: Value) -> Self {
        BooleanExpression::Atom {
            name: name.to_owned(),
            operator,
            value,
        }
    }

    /// True if the expression is the constant `true` (after optimization an
    /// empty `And` never survives, so this is a cheap check).
    pub fn is_true(&self) -> bool {
        matches!(self, BooleanExpression::True)
    }
}

/// A scalar computation expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpression {
    /// A literal or variable reference in scalar position.
    Primary(Value),
    /// An operator applied to sub-expressions.
    Derived {
        op: ScalarOp,
        operands: Vec<ScalarExpression>,
    },
    /// A filter reified as a Boolean scalar.
    Boolean(Box<BooleanExpression>),
}

impl ScalarExpression {
    pub fn var(name: &str) -> Self {
        ScalarExpression::Primary(Value::VarRef(name.to_owned()))
    }

    pub fn derived(op: ScalarOp, operands: Vec<ScalarExpression>) -> Self {
        ScalarExpression::Derived { op, operands }
    }
}
