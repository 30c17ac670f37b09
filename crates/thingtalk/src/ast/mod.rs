//! The ThingTalk abstract syntax tree.
//!
//! Nodes are plain data: owned by their parents, cheap to clone, compared
//! structurally. The one mutable annotation is the `schema` slot every
//! primitive carries ([`SchemaSlot`]); semantic analysis fills it, cloning
//! resets it, and structural equality ignores it.

mod class_def;
mod expression;
mod function_def;
mod invocation;
mod program;
mod stream_table;
pub mod visit;

pub use class_def::{ClassDef, ClassId, ClassPool, ImportStmt, MixinDef};
pub use expression::{AggregationOp, BinaryOp, BooleanExpression, ScalarExpression, ScalarOp};
pub use function_def::{ArgDirection, ArgumentDef, FunctionDef, FunctionKind};
pub use invocation::{InputParam, Invocation, SchemaSlot, Selector};
pub use program::{
    Assignment, Bookkeeping, Dataset, Declaration, DeclarationBody, Example, ExampleKind, ExampleValue, Input,
    Library, PermissionFunction, PermissionRule, Program, Rule, RuleSource,
};
pub use stream_table::{Action, SortDirection, Stream, Table};
pub use visit::{iterate_primitives, Primitive, PrimitiveKind};
