//! Programs, rules, declarations, datasets, and permission rules.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::class_def::ClassDef;
use crate::ast::expression::BooleanExpression;
use crate::ast::invocation::SchemaSlot;
use crate::ast::stream_table::{Action, Stream, Table};
use crate::types::Type;
use crate::value::Value;

/// The stream-or-table source driving a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleSource {
    Stream(Stream),
    Table(Table),
}

/// One rule: an optional source and a non-empty list of actions.
///
/// A rule with a stream source runs forever, firing once per delivered
/// record; a rule with a table source (or none) runs once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub source: Option<RuleSource>,
    pub actions: Vec<Action>,
}

impl Rule {
    pub fn now(table: Table, actions: Vec<Action>) -> Self {
        Self {
            source: Some(RuleSource::Table(table)),
            actions,
        }
    }

    pub fn when(stream: Stream, actions: Vec<Action>) -> Self {
        Self {
            source: Some(RuleSource::Stream(stream)),
            actions,
        }
    }

    pub fn immediate(actions: Vec<Action>) -> Self {
        Self { source: None, actions }
    }
}

/// The body of a named declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclarationBody {
    Stream(Stream),
    Table(Table),
    Action(Action),
}

/// A named, reusable sub-expression with lambda arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub name: String,
    /// Lambda arguments, in declaration order.
    pub args: IndexMap<String, Type>,
    pub body: DeclarationBody,
    pub schema: SchemaSlot,
}

/// A named table expression evaluated once (`let result = ...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub name: String,
    pub value: Table,
    pub schema: SchemaSlot,
}

/// A complete ThingTalk program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    /// The executor: who runs this program. `None` means the local user.
    pub principal: Option<Value>,
    pub classes: Vec<ClassDef>,
    pub declarations: Vec<Declaration>,
    pub assignments: Vec<Assignment>,
    pub rules: Vec<Rule>,
}

impl Program {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }
}

/// Function scope of one side of a permission rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PermissionFunction {
    /// The builtin functions (`notify`).
    Builtin,
    /// Any function of any class.
    Star,
    /// Any function of one class.
    ClassStar { kind: String },
    /// One specific function, further restricted by a filter over its
    /// arguments.
    Specified {
        kind: String,
        channel: String,
        filter: BooleanExpression,
        schema: SchemaSlot,
    },
}

/// A permission rule: who (`principal` filter over the requesting contact)
/// may run what (query precondition, action postcondition).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub principal: BooleanExpression,
    pub query: PermissionFunction,
    pub action: PermissionFunction,
}

/// What kind of expression a dataset example demonstrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum ExampleKind {
    Stream,
    Query,
    Action,
    Program,
}

/// The example's code value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExampleValue {
    Stream(Stream),
    Table(Table),
    Action(Action),
    Program(Box<Program>),
}

/// One natural-language example in a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub id: i64,
    pub kind: ExampleKind,
    /// Lambda arguments usable inside `value`.
    pub args: IndexMap<String, Type>,
    pub value: ExampleValue,
    pub utterances: Vec<String>,
    pub preprocessed: Vec<String>,
    pub annotations: IndexMap<String, Value>,
}

/// A named collection of examples for one language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub language: String,
    pub examples: Vec<Example>,
    pub annotations: IndexMap<String, Value>,
}

/// A meta file: classes plus datasets, checked together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Library {
    pub classes: Vec<ClassDef>,
    pub datasets: Vec<Dataset>,
}

/// Dialogue bookkeeping commands that bypass the rule machinery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Bookkeeping {
    /// `yes`, `no`, `nevermind`, and friends.
    Special(String),
    /// Pick the n-th choice offered by the dialogue agent.
    Choice(u32),
    /// Answer a slot-filling question with a value.
    Answer(Value),
    /// A standalone predicate refining an earlier command.
    Predicate(BooleanExpression),
}

/// A statement that can stand alone at the top level of an input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Input {
    Program(Program),
    Library(Library),
    PermissionRule(PermissionRule),
    Bookkeeping(Bookkeeping),
}
