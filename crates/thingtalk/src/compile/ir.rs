//! The compiled rule representation.
//!
//! A [`CompiledRule`] is language-neutral and serde-serializable; round-
//! tripping through `serde_json` reproduces it exactly, which is the
//! re-parseability contract of the IR. The host executes `main` under a
//! cooperative scheduler: [`Op::Next`] and [`Op::Iterate`] own the body run
//! once per delivered record, so a rule whose `main` starts with an
//! `OpenStream`/`OpenMonitor`/`OpenTimer` and a `Next` is an infinite loop,
//! and a rule with only `InvokeQuery`/`Iterate` runs once.
//!
//! [`Op::AssertFilter`] short-circuits the remainder of the innermost body
//! for the current record when its condition is false.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::{BinaryOp, ScalarOp};
use crate::value::Value;

/// What kind of external endpoint a rule talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum EndpointType {
    Stream,
    Query,
    Action,
    Timer,
    AtTimer,
}

/// One external invocation endpoint of a compiled rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub kind: String,
    pub channel: String,
    #[serde(rename = "type")]
    pub endpoint_type: EndpointType,
}

/// A scalar expression over the rule's bound variables.
///
/// `Apply` with `max`/`min` and two scalar arguments is pairwise (the
/// aggregation accumulator form); with one array argument it is the
/// aggregate form, matching the surface operator table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(Value),
    Variable(String),
    Apply { op: ScalarOp, args: Vec<Expr> },
    /// A filter reified as a Boolean scalar.
    Test(Box<FilterExpr>),
    /// Stable hash of the named variables (all bound fields when `None`);
    /// used by monitor de-duplication.
    TupleHash { args: Option<Vec<String>> },
    /// The triggering record, rendered by the host.
    EventRecord,
    EventProgramId,
    EventType,
}

/// A boolean expression over the rule's bound variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpr {
    True,
    False,
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
    Cmp { lhs: Expr, op: BinaryOp, rhs: Expr },
    /// True if any result of the endpoint, invoked with the given
    /// parameters, satisfies the inner filter (evaluated with that result's
    /// fields bound).
    Exists {
        endpoint: usize,
        in_params: Vec<StaticParam>,
        filter: Box<FilterExpr>,
    },
}

/// A named argument passed to an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticParam {
    pub name: String,
    pub value: Expr,
}

/// Binds a delivered record field to a rule variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub field: String,
    pub var: String,
}

impl Binding {
    pub fn same(name: &str) -> Self {
        Self {
            field: name.to_owned(),
            var: name.to_owned(),
        }
    }
}

/// One step of a compiled rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    OpenStream {
        endpoint: usize,
        into: String,
    },
    OpenMonitor {
        endpoint: usize,
        in_params: Vec<StaticParam>,
        into: String,
    },
    OpenTimer {
        base: Value,
        interval: Value,
        into: String,
    },
    OpenAtTimer {
        times: Vec<Value>,
        expiration: Option<Value>,
        into: String,
    },
    /// Drives the iterator until end-of-stream, running `body` once per
    /// record with `bindings` in effect.
    Next {
        iter: String,
        bindings: Vec<Binding>,
        body: Vec<Op>,
    },
    InvokeQuery {
        endpoint: usize,
        in_params: Vec<StaticParam>,
        into: String,
    },
    /// Iterates a query result set, running `body` once per row.
    Iterate {
        result: String,
        bindings: Vec<Binding>,
        body: Vec<Op>,
    },
    /// Skips the rest of the current body when the condition is false.
    AssertFilter {
        condition: FilterExpr,
    },
    ComputeScalar {
        expr: Expr,
        bind: String,
    },
    /// Reads a durable state cell into a variable (`null` before the first
    /// store).
    LoadState {
        state: u32,
        bind: String,
    },
    StoreState {
        state: u32,
        value: Expr,
    },
    InvokeAction {
        endpoint: usize,
        in_params: Vec<StaticParam>,
    },
    /// Delivers a record to the program owner.
    Output {
        output_type: String,
        record: Vec<StaticParam>,
    },
}

/// The compiled form of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledRule {
    /// Number of durable state cells the runtime must allocate.
    pub states: u32,
    /// External endpoints, indexed by the ops' `endpoint` fields.
    pub functions: Vec<Endpoint>,
    pub main: Vec<Op>,
}

/// The compiled form of a whole program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProgram {
    pub rules: Vec<CompiledRule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_round_trips_through_json() {
        let rule = CompiledRule {
            states: 1,
            functions: vec![Endpoint {
                kind: "com.xkcd".into(),
                channel: "get_comic".into(),
                endpoint_type: EndpointType::Stream,
            }],
            main: vec![
                Op::OpenMonitor {
                    endpoint: 0,
                    in_params: vec![],
                    into: "_t0".into(),
                },
                Op::Next {
                    iter: "_t0".into(),
                    bindings: vec![Binding::same("title")],
                    body: vec![Op::Output {
                        output_type: "com.xkcd:get_comic".into(),
                        record: vec![StaticParam {
                            name: "title".into(),
                            value: Expr::Variable("title".into()),
                        }],
                    }],
                },
            ],
        };
        let json = serde_json::to_string(&rule).expect("IR must serialize");
        let back: CompiledRule = serde_json::from_str(&json).expect("IR must deserialize");
        assert_eq!(back, rule);
    }
}
