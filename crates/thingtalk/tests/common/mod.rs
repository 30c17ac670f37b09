//! Shared test fixtures: a mock schema client with a handful of well-known
//! classes, and a miniature runtime that executes compiled rules against
//! canned stream and query data — just enough of the host runtime protocol
//! to observe `InvokeAction` and `Output` behavior in tests.

#![allow(dead_code, reason = "shared across test binaries with different needs")]

use std::collections::BTreeMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;

use ahash::AHashMap;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde_json::{json, Value as Json};

use thingtalk::ast::{
    ArgDirection, ArgumentDef, ClassDef, FunctionDef, FunctionKind, Invocation, MixinDef, Selector, Table,
};
use thingtalk::ir::{Binding, CompiledProgram, CompiledRule, Endpoint, Expr, FilterExpr, Op, StaticParam};
use thingtalk::{
    type_check_program, CancellationToken, SchemaClient, SchemaRetriever, Type, TypeCheckOptions, TypeResult, Value,
};

fn arg(direction: ArgDirection, name: &str, ty: Type) -> ArgumentDef {
    ArgumentDef::new(direction, name, ty)
}

fn xkcd() -> ClassDef {
    let mut class = ClassDef::new("com.xkcd");
    let mut get_comic = FunctionDef::new(
        FunctionKind::Query,
        "get_comic",
        vec![
            arg(ArgDirection::InOpt, "number", Type::Number),
            arg(ArgDirection::Out, "title", Type::String),
            arg(ArgDirection::Out, "link", Type::entity("tt:url")),
            arg(ArgDirection::Out, "picture_url", Type::entity("tt:picture")),
        ],
    )
    .with_flags(false, true);
    get_comic
        .annotations
        .insert("poll_interval".to_owned(), Value::measure(1.0, "h"));
    class.add_query(get_comic);
    class
}

fn twitter() -> ClassDef {
    let mut class = ClassDef::new("com.twitter");
    class.add_query(
        FunctionDef::new(
            FunctionKind::Query,
            "home_timeline",
            vec![
                arg(ArgDirection::Out, "text", Type::String),
                arg(ArgDirection::Out, "author", Type::entity("tt:username")),
            ],
        )
        .with_flags(true, true),
    );
    class.add_action(FunctionDef::new(
        FunctionKind::Action,
        "post",
        vec![arg(ArgDirection::InReq, "status", Type::String)],
    ));
    class
}

fn yandex() -> ClassDef {
    let mut class = ClassDef::new("com.yandex.translate");
    class.add_query(
        FunctionDef::new(
            FunctionKind::Query,
            "translate",
            vec![
                arg(ArgDirection::InReq, "target_language", Type::entity("tt:iso_lang_code")),
                arg(ArgDirection::InReq, "text", Type::String),
                arg(ArgDirection::Out, "translated_text", Type::String),
            ],
        )
        .with_flags(false, false),
    );
    class
}

fn restricted() -> ClassDef {
    let mut class = ClassDef::new("org.example.restricted");
    let mut search = FunctionDef::new(
        FunctionKind::Query,
        "search",
        vec![
            arg(ArgDirection::InOpt, "query", Type::String),
            arg(ArgDirection::Out, "title", Type::String),
            arg(ArgDirection::Out, "body", Type::String),
        ],
    )
    .with_flags(true, false);
    search
        .annotations
        .insert("require_filter".to_owned(), Value::Boolean(true));
    search.annotations.insert(
        "default_projection".to_owned(),
        Value::Array(vec![Value::string("title")]),
    );
    class.add_query(search);
    class
}

/// A schema client serving the fixture classes. `org.failing` always errors
/// to exercise per-kind failure reification.
pub struct MockSchemaClient;

impl SchemaClient for MockSchemaClient {
    fn get_schemas<'a>(
        &'a self,
        kinds: &'a [String],
        _want_metadata: bool,
    ) -> LocalBoxFuture<'a, AHashMap<String, Result<ClassDef, String>>> {
        async move {
            let mut result = AHashMap::new();
            for kind in kinds {
                let entry = match kind.as_str() {
                    "com.xkcd" => Ok(xkcd()),
                    "com.twitter" => Ok(twitter()),
                    "com.yandex.translate" => Ok(yandex()),
                    "org.example.restricted" => Ok(restricted()),
                    "org.failing" => Err("upstream returned 500".to_owned()),
                    _ => continue,
                };
                result.insert(kind.clone(), entry);
            }
            result
        }
        .boxed_local()
    }

    fn get_mixins<'a>(&'a self, names: &'a [String]) -> LocalBoxFuture<'a, AHashMap<String, MixinDef>> {
        async move {
            let mut result = AHashMap::new();
            for name in names {
                if name == "org.thingpedia.v2" {
                    result.insert(
                        name.clone(),
                        MixinDef {
                            kind: name.clone(),
                            facets: vec!["loader".to_owned()],
                            args: vec![],
                        },
                    );
                }
            }
            result
        }
        .boxed_local()
    }

    fn get_memory_schema<'a>(&'a self, _table: &'a str) -> LocalBoxFuture<'a, Option<FunctionDef>> {
        async move { None }.boxed_local()
    }
}

pub fn retriever() -> SchemaRetriever {
    SchemaRetriever::new(Rc::new(MockSchemaClient))
}

/// Typechecks a program against the fixture classes.
pub fn check(program: &mut thingtalk::ast::Program) -> TypeResult<()> {
    futures::executor::block_on(type_check_program(
        program,
        &retriever(),
        &TypeCheckOptions::default(),
        &CancellationToken::new(),
    ))
}

pub fn invocation(kind: &str, channel: &str, params: Vec<(&str, Value)>) -> Invocation {
    Invocation::new(
        Selector::new(kind),
        channel,
        params
            .into_iter()
            .map(|(name, value)| thingtalk::ast::InputParam::new(name, value))
            .collect(),
    )
}

pub fn query(kind: &str, channel: &str, params: Vec<(&str, Value)>) -> Table {
    Table::Invocation(invocation(kind, channel, params))
}

// ---------------------------------------------------------------------------
// Miniature IR runtime
// ---------------------------------------------------------------------------

type Record = BTreeMap<String, Json>;
type Env = AHashMap<String, Json>;

/// Executes compiled rules against canned data and records every
/// `InvokeAction` and `Output`.
#[derive(Default)]
pub struct TestRuntime {
    /// Records delivered by `OpenStream`/`OpenMonitor`, keyed `kind:channel`.
    pub streams: AHashMap<String, Vec<Record>>,
    /// Result sets returned by `InvokeQuery`, keyed `kind:channel`.
    pub queries: AHashMap<String, Vec<Record>>,
    /// Ticks delivered by timers.
    pub timer_ticks: usize,
    /// Observed `InvokeAction` calls: (`kind:channel`, resolved args).
    pub actions: Vec<(String, Record)>,
    /// Observed `Output` steps: (outputType, record).
    pub outputs: Vec<(String, Record)>,
    states: Vec<Json>,
}

impl TestRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, key: &str, records: Vec<Record>) -> Self {
        self.streams.insert(key.to_owned(), records);
        self
    }

    pub fn query_result(mut self, key: &str, records: Vec<Record>) -> Self {
        self.queries.insert(key.to_owned(), records);
        self
    }

    pub fn run(&mut self, program: &CompiledProgram) {
        for rule in &program.rules {
            self.run_rule(rule);
        }
    }

    pub fn run_rule(&mut self, rule: &CompiledRule) {
        self.states = vec![Json::Null; rule.states as usize];
        let mut env = Env::new();
        let mut iters: AHashMap<String, Vec<Record>> = AHashMap::new();
        let mut results: AHashMap<String, Vec<Record>> = AHashMap::new();
        self.run_ops(&rule.main, &rule.functions, &mut env, &mut iters, &mut results);
    }

    fn endpoint_key(functions: &[Endpoint], endpoint: usize) -> String {
        let f = &functions[endpoint];
        format!("{}:{}", f.kind, f.channel)
    }

    /// Runs a body; returns false when an `AssertFilter` aborted it.
    fn run_ops(
        &mut self,
        ops: &[Op],
        functions: &[Endpoint],
        env: &mut Env,
        iters: &mut AHashMap<String, Vec<Record>>,
        results: &mut AHashMap<String, Vec<Record>>,
    ) -> bool {
        for op in ops {
            match op {
                Op::OpenStream { endpoint, into } | Op::OpenMonitor { endpoint, into, .. } => {
                    let key = Self::endpoint_key(functions, *endpoint);
                    iters.insert(into.clone(), self.streams.get(&key).cloned().unwrap_or_default());
                }
                Op::OpenTimer { into, .. } | Op::OpenAtTimer { into, .. } => {
                    iters.insert(into.clone(), vec![Record::new(); self.timer_ticks]);
                }
                Op::Next { iter, bindings, body } => {
                    let records = iters.get(iter).cloned().unwrap_or_default();
                    for record in records {
                        let mut inner = env.clone();
                        bind(&mut inner, bindings, &record);
                        self.run_ops(body, functions, &mut inner, iters, results);
                    }
                }
                Op::InvokeQuery { endpoint, into, .. } => {
                    let key = Self::endpoint_key(functions, *endpoint);
                    results.insert(into.clone(), self.queries.get(&key).cloned().unwrap_or_default());
                }
                Op::Iterate { result, bindings, body } => {
                    let records = results.get(result).cloned().unwrap_or_default();
                    for record in records {
                        let mut inner = env.clone();
                        bind(&mut inner, bindings, &record);
                        self.run_ops(body, functions, &mut inner, iters, results);
                    }
                }
                Op::AssertFilter { condition } => {
                    if !self.eval_filter(condition, functions, env) {
                        return false;
                    }
                }
                Op::ComputeScalar { expr, bind } => {
                    let value = self.eval(expr, functions, env);
                    env.insert(bind.clone(), value);
                }
                Op::LoadState { state, bind } => {
                    env.insert(bind.clone(), self.states[*state as usize].clone());
                }
                Op::StoreState { state, value } => {
                    self.states[*state as usize] = self.eval(value, functions, env);
                }
                Op::InvokeAction { endpoint, in_params } => {
                    let key = Self::endpoint_key(functions, *endpoint);
                    let record = self.resolve_params(in_params, functions, env);
                    self.actions.push((key, record));
                }
                Op::Output { output_type, record } => {
                    let resolved = self.resolve_params(record, functions, env);
                    self.outputs.push((output_type.clone(), resolved));
                }
            }
        }
        true
    }

    fn resolve_params(&mut self, params: &[StaticParam], functions: &[Endpoint], env: &Env) -> Record {
        params
            .iter()
            .map(|p| (p.name.clone(), self.eval(&p.value, functions, env)))
            .collect()
    }

    fn eval(&mut self, expr: &Expr, functions: &[Endpoint], env: &Env) -> Json {
        match expr {
            Expr::Constant(value) => value.to_json().unwrap_or(Json::Null),
            Expr::Variable(name) => env.get(name).cloned().unwrap_or(Json::Null),
            Expr::Apply { op, args } => {
                let args: Vec<Json> = args.iter().map(|a| self.eval(a, functions, env)).collect();
                let nums: Vec<f64> = args.iter().filter_map(Json::as_f64).collect();
                match (op.to_string().as_str(), nums.as_slice()) {
                    ("+", [a, b]) => json!(a + b),
                    ("-", [a, b]) => json!(a - b),
                    ("*", [a, b]) => json!(a * b),
                    ("/", [a, b]) => json!(a / b),
                    _ => Json::Null,
                }
            }
            Expr::Test(filter) => json!(self.eval_filter(filter, functions, env)),
            Expr::TupleHash { args } => {
                let mut projected = BTreeMap::new();
                match args {
                    Some(names) => {
                        for name in names {
                            projected.insert(name.clone(), env.get(name).cloned().unwrap_or(Json::Null));
                        }
                    }
                    None => {
                        for (name, value) in env {
                            if !name.starts_with('_') {
                                projected.insert(name.clone(), value.clone());
                            }
                        }
                    }
                }
                let mut hasher = DefaultHasher::new();
                serde_json::to_string(&projected).unwrap_or_default().hash(&mut hasher);
                json!(format!("{:016x}", hasher.finish()))
            }
            Expr::EventRecord => {
                let fields: Vec<String> = env
                    .iter()
                    .filter(|(name, _)| !name.starts_with('_'))
                    .map(|(name, value)| format!("{name}: {value}"))
                    .collect();
                json!(fields.join(", "))
            }
            Expr::EventProgramId => json!("uuid-test-program"),
            Expr::EventType => json!("test-output-type"),
        }
    }

    fn eval_filter(&mut self, filter: &FilterExpr, functions: &[Endpoint], env: &Env) -> bool {
        match filter {
            FilterExpr::True => true,
            FilterExpr::False => false,
            FilterExpr::And(operands) => operands.iter().all(|o| self.eval_filter(o, functions, env)),
            FilterExpr::Or(operands) => operands.iter().any(|o| self.eval_filter(o, functions, env)),
            FilterExpr::Not(inner) => !self.eval_filter(inner, functions, env),
            FilterExpr::Cmp { lhs, op, rhs } => {
                let lhs = self.eval(lhs, functions, env);
                let rhs = self.eval(rhs, functions, env);
                match op.to_string().as_str() {
                    "==" => lhs == rhs,
                    ">=" => cmp_nums(&lhs, &rhs, |a, b| a >= b),
                    "<=" => cmp_nums(&lhs, &rhs, |a, b| a <= b),
                    ">" => cmp_nums(&lhs, &rhs, |a, b| a > b),
                    "<" => cmp_nums(&lhs, &rhs, |a, b| a < b),
                    // Soft string match, case-insensitive.
                    "=~" => contains_ci(&lhs, &rhs),
                    "~=" => contains_ci(&rhs, &lhs),
                    "in_array" => rhs.as_array().is_some_and(|a| a.contains(&lhs)),
                    "contains" => lhs.as_array().is_some_and(|a| a.contains(&rhs)),
                    other => panic!("test runtime does not implement operator {other}"),
                }
            }
            FilterExpr::Exists {
                endpoint,
                filter,
                ..
            } => {
                let key = Self::endpoint_key(functions, *endpoint);
                let rows = self.queries.get(&key).cloned().unwrap_or_default();
                rows.iter().any(|row| {
                    let mut inner = env.clone();
                    for (name, value) in row {
                        inner.insert(name.clone(), value.clone());
                    }
                    self.eval_filter(filter, functions, &inner)
                })
            }
        }
    }
}

fn bind(env: &mut Env, bindings: &[Binding], record: &Record) {
    for binding in bindings {
        env.insert(
            binding.var.clone(),
            record.get(&binding.field).cloned().unwrap_or(Json::Null),
        );
    }
}

fn cmp_nums(lhs: &Json, rhs: &Json, f: impl Fn(f64, f64) -> bool) -> bool {
    if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        return f(a, b);
    }
    if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        let ord = match a.cmp(b) {
            std::cmp::Ordering::Less => -1.0,
            std::cmp::Ordering::Equal => 0.0,
            std::cmp::Ordering::Greater => 1.0,
        };
        return f(ord, 0.0);
    }
    false
}

fn contains_ci(haystack: &Json, needle: &Json) -> bool {
    match (haystack.as_str(), needle.as_str()) {
        (Some(h), Some(n)) => h.to_lowercase().contains(&n.to_lowercase()),
        _ => false,
    }
}

/// Builds a record from JSON field pairs.
pub fn record(fields: Vec<(&str, Json)>) -> Record {
    fields.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}
