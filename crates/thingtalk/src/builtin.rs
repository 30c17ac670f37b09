//! Builtin signatures: `notify`, the timer streams, and the remote broker
//! class the factoring pass targets.

use std::rc::Rc;

use crate::ast::{ArgDirection, ArgumentDef, FunctionDef, FunctionKind};
use crate::types::Type;

/// The reserved class remote factoring extends with its `__dyn_k` classes.
pub const REMOTE_BROKER_KIND: &str = "org.thingpedia.builtin.thingengine.remote";

/// The builtin `notify` action: delivers the triggering record to the
/// program owner. Takes no declared arguments; the compiler passes the
/// merged bindings through `Output`.
pub fn notify() -> Rc<FunctionDef> {
    Rc::new(FunctionDef::new(FunctionKind::Action, "notify", Vec::new()))
}

/// The signature of `timer(base, interval)`: a pure tick source with no
/// outputs.
pub fn timer() -> Rc<FunctionDef> {
    Rc::new(
        FunctionDef::new(FunctionKind::Stream, "timer", Vec::new()).with_flags(true, true),
    )
}

/// The signature of `attimer(time, ...)`.
pub fn at_timer() -> Rc<FunctionDef> {
    Rc::new(
        FunctionDef::new(FunctionKind::Stream, "attimer", Vec::new()).with_flags(true, true),
    )
}

/// The `send` action synthesized on a `__dyn_k` class: principal, flow
/// token, the function being mirrored, then the lifted fields.
pub fn remote_send(fields: &[(String, Type)]) -> FunctionDef {
    let mut args = broker_header();
    for (name, ty) in fields {
        args.push(ArgumentDef::new(ArgDirection::InReq, name, ty.clone()));
    }
    FunctionDef::new(FunctionKind::Action, "send", args)
}

/// The `receive` stream synthesized on a `__dyn_k` class: same header, the
/// lifted fields as outputs.
pub fn remote_receive(fields: &[(String, Type)]) -> FunctionDef {
    let mut args = broker_header();
    for (name, ty) in fields {
        args.push(ArgumentDef::new(ArgDirection::Out, name, ty.clone()));
    }
    FunctionDef::new(FunctionKind::Query, "receive", args).with_flags(true, true)
}

fn broker_header() -> Vec<ArgumentDef> {
    vec![
        ArgumentDef::new(ArgDirection::InReq, "__principal", Type::entity("tt:contact")),
        ArgumentDef::new(ArgDirection::InReq, "__token", Type::entity("tt:flow_token")),
        ArgumentDef::new(ArgDirection::InReq, "__kindChannel", Type::entity("tt:function_name")),
    ]
}
