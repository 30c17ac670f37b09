//! Function signatures: the `FunctionDef` every primitive's `schema` slot
//! resolves to, and the derivation helpers the analyzer uses to build the
//! signatures of filtered, projected, aggregated, computed, and joined
//! expressions.

use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::ast::class_def::ClassId;
use crate::ast::invocation::InputParam;
use crate::types::Type;
use crate::value::Value;

/// The category of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum FunctionKind {
    Stream,
    Query,
    Action,
}

/// Direction and optionality of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ArgDirection {
    /// Required input: the rule must supply it (possibly as a hole).
    #[strum(serialize = "in req")]
    InReq,
    /// Optional input.
    #[strum(serialize = "in opt")]
    InOpt,
    /// Output produced by the function.
    #[strum(serialize = "out")]
    Out,
}

impl ArgDirection {
    pub fn is_input(self) -> bool {
        !matches!(self, ArgDirection::Out)
    }
}

/// One declared argument of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentDef {
    pub direction: ArgDirection,
    pub name: String,
    pub ty: Type,
    /// Natural-language metadata (canonical form, prompts). Opaque to the
    /// core; carried for `get_full_meta` consumers.
    pub metadata: IndexMap<String, String>,
    pub annotations: IndexMap<String, Value>,
}

impl ArgumentDef {
    pub fn new(direction: ArgDirection, name: &str, ty: Type) -> Self {
        Self {
            direction,
            name: name.to_owned(),
            ty,
            metadata: IndexMap::new(),
            annotations: IndexMap::new(),
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction.is_input()
    }

    pub fn is_required(&self) -> bool {
        self.direction == ArgDirection::InReq
    }
}

/// The signature of a stream, query, or action.
///
/// Besides the functions a class declares, the analyzer derives anonymous
/// `FunctionDef`s for composite expressions (filters, projections, joins);
/// those have `parent: None` and keep the flags of the expression they
/// describe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub kind: FunctionKind,
    pub name: String,
    /// Declaration-ordered argument list; inputs and outputs interleaved as
    /// declared.
    pub args: Vec<ArgumentDef>,
    /// Whether the query may return more than one result.
    pub is_list: bool,
    /// Whether the query's results can be subscribed to with `monitor`.
    pub is_monitorable: bool,
    pub metadata: IndexMap<String, String>,
    pub annotations: IndexMap<String, Value>,
    /// Back reference to the owning class as an index into a `ClassPool`;
    /// `None` for derived signatures and free-standing defs.
    pub parent: Option<ClassId>,
}

impl FunctionDef {
    pub fn new(kind: FunctionKind, name: &str, args: Vec<ArgumentDef>) -> Self {
        Self {
            kind,
            name: name.to_owned(),
            args,
            is_list: false,
            is_monitorable: false,
            metadata: IndexMap::new(),
            annotations: IndexMap::new(),
            parent: None,
        }
    }

    pub fn with_flags(mut self, is_list: bool, is_monitorable: bool) -> Self {
        self.is_list = is_list;
        self.is_monitorable = is_monitorable;
        self
    }

    pub fn arg(&self, name: &str) -> Option<&ArgumentDef> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn arg_type(&self, name: &str) -> Option<&Type> {
        self.arg(name).map(|a| &a.ty)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.args.iter().filter(|a| a.is_input())
    }

    pub fn outputs(&self) -> impl Iterator<Item = &ArgumentDef> {
        self.args.iter().filter(|a| !a.is_input())
    }

    pub fn out_names(&self) -> Vec<String> {
        self.outputs().map(|a| a.name.clone()).collect()
    }

    /// The `#[poll_interval]` annotation in milliseconds, if present.
    pub fn poll_interval(&self) -> Option<f64> {
        match self.annotations.get("poll_interval") {
            Some(Value::Measure { value, unit }) if unit == "ms" => Some(*value),
            _ => None,
        }
    }

    /// The `#[require_filter]` annotation; absent means `false`.
    pub fn require_filter(&self) -> bool {
        matches!(self.annotations.get("require_filter"), Some(Value::Boolean(true)))
    }

    /// The `#[default_projection]` annotation as a list of argument names.
    pub fn default_projection(&self) -> Vec<String> {
        match self.annotations.get("default_projection") {
            Some(Value::Array(elements)) => elements
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    // --- signature derivation -------------------------------------------------

    /// Signature after a filter: same shape, but a satisfied `require_filter`
    /// no longer propagates.
    pub fn filtered(self: Rc<Self>) -> Rc<FunctionDef> {
        if !self.require_filter() {
            return self;
        }
        let mut def = (*self).clone();
        def.annotations.insert("require_filter".to_owned(), Value::Boolean(false));
        def.parent = None;
        Rc::new(def)
    }

    /// Signature after projecting onto `args`: inputs survive, outputs are
    /// restricted, and the `default_projection` annotation is cleared because
    /// the projection overrides it.
    pub fn projected(&self, args: &[String]) -> FunctionDef {
        let mut def = self.clone();
        def.args.retain(|a| a.is_input() || args.contains(&a.name));
        def.annotations.shift_remove("default_projection");
        def.parent = None;
        def
    }

    /// Signature after `compute`: one extra output argument.
    pub fn computed(&self, name: &str, ty: Type) -> FunctionDef {
        let mut def = self.clone();
        def.args.retain(|a| a.name != name);
        def.args.push(ArgumentDef::new(ArgDirection::Out, name, ty));
        def.parent = None;
        def
    }

    /// Signature after aggregation: the single aggregated output.
    pub fn aggregated(&self, out_name: &str, out_type: Type) -> FunctionDef {
        let mut def = self.clone();
        def.args.retain(ArgumentDef::is_input);
        def.args.push(ArgumentDef::new(ArgDirection::Out, out_name, out_type));
        def.is_list = false;
        def.parent = None;
        def
    }

    /// The signature of a join: left args union right args, minus the right
    /// inputs already provided by the join's `on` parameters. `is_list` is
    /// disjunctive, `is_monitorable` conjunctive; `default_projection` and
    /// `require_filter` propagate from either side.
    pub fn joined(lhs: &FunctionDef, rhs: &FunctionDef, in_params: &[InputParam]) -> FunctionDef {
        let provided: Vec<&str> = in_params.iter().map(|p| p.name.as_str()).collect();
        let mut args: Vec<ArgumentDef> = lhs.args.clone();
        for arg in &rhs.args {
            if provided.contains(&arg.name.as_str()) {
                continue;
            }
            if args.iter().any(|a| a.name == arg.name) {
                continue;
            }
            args.push(arg.clone());
        }

        let mut annotations = IndexMap::new();
        let projection: Vec<Value> = lhs
            .default_projection()
            .into_iter()
            .chain(rhs.default_projection())
            .map(Value::String)
            .collect();
        if !projection.is_empty() {
            annotations.insert("default_projection".to_owned(), Value::Array(projection));
        }
        if lhs.require_filter() || rhs.require_filter() {
            annotations.insert("require_filter".to_owned(), Value::Boolean(true));
        }

        FunctionDef {
            kind: lhs.kind,
            name: format!("{}+{}", lhs.name, rhs.name),
            args,
            is_list: lhs.is_list || rhs.is_list,
            is_monitorable: lhs.is_monitorable && rhs.is_monitorable,
            metadata: IndexMap::new(),
            annotations,
            parent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xkcd_like() -> FunctionDef {
        FunctionDef::new(
            FunctionKind::Query,
            "get_comic",
            vec![
                ArgumentDef::new(ArgDirection::InOpt, "number", Type::Number),
                ArgumentDef::new(ArgDirection::Out, "title", Type::String),
                ArgumentDef::new(ArgDirection::Out, "link", Type::entity("tt:url")),
            ],
        )
        .with_flags(false, true)
    }

    #[test]
    fn projection_keeps_inputs_and_restricts_outputs() {
        let def = xkcd_like();
        let projected = def.projected(&["title".to_owned()]);
        assert!(projected.arg("number").is_some(), "inputs survive projection");
        assert!(projected.arg("title").is_some());
        assert!(projected.arg("link").is_none());
    }

    #[test]
    fn join_signature_merges_and_drops_provided_inputs() {
        let left = xkcd_like();
        let right = FunctionDef::new(
            FunctionKind::Query,
            "translate",
            vec![
                ArgumentDef::new(ArgDirection::InReq, "text", Type::String),
                ArgumentDef::new(ArgDirection::Out, "translated_text", Type::String),
            ],
        )
        .with_flags(false, false);

        let joined = FunctionDef::joined(
            &left,
            &right,
            &[InputParam::new("text", Value::VarRef("title".to_owned()))],
        );
        assert!(joined.arg("text").is_none(), "provided join inputs disappear");
        assert!(joined.arg("title").is_some());
        assert!(joined.arg("translated_text").is_some());
        assert!(!joined.is_monitorable, "monitorability is conjunctive");
        assert!(!joined.is_list);
    }
}
