//! Lowering from the typed AST to the rule IR.
//!
//! Each rule compiles independently: its stream source becomes an open +
//! `Next` loop, queries become `InvokeQuery` + `Iterate` nests, filters
//! become `AssertFilter` steps, and actions land in the innermost body.
//! Monitor de-duplication and edge filters allocate numbered state cells.
//! Declarations and assignments are inlined at their use sites, with lambda
//! arguments substituted into the inlined body.

pub mod ir;

use ahash::AHashMap;

use crate::ast::visit::{walk_rule, AstVisitor, PrimitiveKind};
use crate::ast::{
    AggregationOp, Assignment, BooleanExpression, Declaration, DeclarationBody, FunctionDef, InputParam, Invocation,
    Program, Rule, RuleSource, ScalarExpression, ScalarOp, SchemaSlot, Selector, Stream, Table,
};
use crate::ast::{Action, BinaryOp};
use crate::error::{CompileError, CompileErrorKind, CompileResult};
use crate::typecheck::compute_name;
use crate::value::Value;

use self::ir::{Binding, CompiledProgram, CompiledRule, Endpoint, EndpointType, Expr, FilterExpr, Op, StaticParam};

/// Compiles a typechecked (and optionally optimized) program. Every rule
/// becomes one [`CompiledRule`].
pub fn compile_program(program: &Program) -> CompileResult<CompiledProgram> {
    let mut rules = Vec::with_capacity(program.rules.len());
    for (index, rule) in program.rules.iter().enumerate() {
        let mut compiler = RuleCompiler::new(program, index);
        rules.push(compiler.compile(rule)?);
    }
    Ok(CompiledProgram { rules })
}

struct RuleCompiler<'a> {
    program: &'a Program,
    rule_index: usize,
    functions: Vec<Endpoint>,
    states: u32,
    temps: u32,
    /// Lambda-argument substitutions for inlined declarations, innermost
    /// last.
    subst: Vec<AHashMap<String, Value>>,
}

impl<'a> RuleCompiler<'a> {
    fn new(program: &'a Program, rule_index: usize) -> Self {
        Self {
            program,
            rule_index,
            functions: Vec::new(),
            states: 0,
            temps: 0,
            subst: Vec::new(),
        }
    }

    fn err(&self, kind: CompileErrorKind, message: impl Into<String>) -> CompileError {
        CompileError::new(kind, message, self.rule_index)
    }

    fn unsupported(&self, what: &str) -> CompileError {
        self.err(CompileErrorKind::UnsupportedConstruct, format!("cannot compile {what}"))
    }

    fn alloc_state(&mut self) -> u32 {
        let cell = self.states;
        self.states += 1;
        cell
    }

    fn temp(&mut self, prefix: &str) -> String {
        let n = self.temps;
        self.temps += 1;
        format!("_{prefix}{n}")
    }

    fn endpoint(&mut self, kind: &str, channel: &str, endpoint_type: EndpointType) -> usize {
        let endpoint = Endpoint {
            kind: kind.to_owned(),
            channel: channel.to_owned(),
            endpoint_type,
        };
        if let Some(existing) = self.functions.iter().position(|e| *e == endpoint) {
            return existing;
        }
        self.functions.push(endpoint);
        self.functions.len() - 1
    }

    fn schema_of(&self, slot: &SchemaSlot, what: &str) -> CompileResult<std::rc::Rc<FunctionDef>> {
        slot.get().cloned().ok_or_else(|| {
            self.err(
                CompileErrorKind::UnsupportedConstruct,
                format!("{what} has no resolved schema; run the typechecker first"),
            )
        })
    }

    fn compile(&mut self, rule: &Rule) -> CompileResult<CompiledRule> {
        let actions = self.compile_actions(rule)?;
        let main = match &rule.source {
            Some(RuleSource::Stream(stream)) => self.compile_stream(stream, actions)?,
            Some(RuleSource::Table(table)) => self.compile_table(table, &[], actions)?,
            None => actions,
        };
        Ok(CompiledRule {
            states: self.states,
            functions: std::mem::take(&mut self.functions),
            main,
        })
    }

    // --- values and expressions -----------------------------------------------

    fn resolve_value(&mut self, value: &Value) -> CompileResult<Expr> {
        match value {
            Value::VarRef(name) => {
                let substituted = self
                    .subst
                    .iter()
                    .rev()
                    .find_map(|frame| frame.get(name))
                    .cloned();
                match substituted {
                    Some(inner) => self.resolve_value(&inner),
                    None => Ok(Expr::Variable(name.clone())),
                }
            }
            Value::Event(None) => Ok(Expr::EventRecord),
            Value::Event(Some(crate::value::EventField::ProgramId)) => Ok(Expr::EventProgramId),
            Value::Event(Some(crate::value::EventField::Type)) => Ok(Expr::EventType),
            Value::Computation(expr) => self.scalar_expr(expr),
            other => Ok(Expr::Constant(other.clone())),
        }
    }

    fn scalar_expr(&mut self, expr: &ScalarExpression) -> CompileResult<Expr> {
        match expr {
            ScalarExpression::Primary(value) => self.resolve_value(value),
            ScalarExpression::Derived { op, operands } => {
                let args = operands
                    .iter()
                    .map(|operand| self.scalar_expr(operand))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(Expr::Apply { op: *op, args })
            }
            ScalarExpression::Boolean(filter) => Ok(Expr::Test(Box::new(self.filter_expr(filter)?))),
        }
    }

    fn filter_expr(&mut self, filter: &BooleanExpression) -> CompileResult<FilterExpr> {
        match filter {
            BooleanExpression::True => Ok(FilterExpr::True),
            BooleanExpression::False => Ok(FilterExpr::False),
            BooleanExpression::And(operands) => Ok(FilterExpr::And(
                operands
                    .iter()
                    .map(|operand| self.filter_expr(operand))
                    .collect::<CompileResult<Vec<_>>>()?,
            )),
            BooleanExpression::Or(operands) => Ok(FilterExpr::Or(
                operands
                    .iter()
                    .map(|operand| self.filter_expr(operand))
                    .collect::<CompileResult<Vec<_>>>()?,
            )),
            BooleanExpression::Not(inner) => Ok(FilterExpr::Not(Box::new(self.filter_expr(inner)?))),
            BooleanExpression::Atom { name, operator, value } => Ok(FilterExpr::Cmp {
                lhs: Expr::Variable(name.clone()),
                op: *operator,
                rhs: self.resolve_value(value)?,
            }),
            BooleanExpression::Compute { lhs, operator, rhs } => Ok(FilterExpr::Cmp {
                lhs: self.scalar_expr(lhs)?,
                op: *operator,
                rhs: self.resolve_value(rhs)?,
            }),
            BooleanExpression::External {
                selector,
                channel,
                in_params,
                filter,
                ..
            } => {
                let endpoint = self.endpoint(&selector.kind, channel, EndpointType::Query);
                let in_params = self.params(in_params)?;
                let filter = Box::new(self.filter_expr(filter)?);
                Ok(FilterExpr::Exists {
                    endpoint,
                    in_params,
                    filter,
                })
            }
        }
    }

    fn params(&mut self, in_params: &[InputParam]) -> CompileResult<Vec<StaticParam>> {
        in_params
            .iter()
            .map(|param| {
                Ok(StaticParam {
                    name: param.name.clone(),
                    value: self.resolve_value(&param.value)?,
                })
            })
            .collect()
    }

    // --- dedup and edge filters -----------------------------------------------

    /// Suppresses records whose projection onto `arg_set` equals the previous
    /// record's: one state cell holding the last emitted tuple hash.
    fn dedupe_ops(&mut self, arg_set: Option<Vec<String>>) -> Vec<Op> {
        let cell = self.alloc_state();
        let hash = self.temp("hash");
        let last = self.temp("last");
        vec![
            Op::ComputeScalar {
                expr: Expr::TupleHash { args: arg_set },
                bind: hash.clone(),
            },
            Op::LoadState {
                state: cell,
                bind: last.clone(),
            },
            Op::StoreState {
                state: cell,
                value: Expr::Variable(hash.clone()),
            },
            Op::AssertFilter {
                condition: FilterExpr::Not(Box::new(FilterExpr::Cmp {
                    lhs: Expr::Variable(hash),
                    op: BinaryOp::Eq,
                    rhs: Expr::Variable(last),
                })),
            },
        ]
    }

    /// Passes a record only when the predicate just became true: one state
    /// cell holding the previous truth value.
    fn edge_ops(&mut self, filter: &BooleanExpression) -> CompileResult<Vec<Op>> {
        let cell = self.alloc_state();
        let was = self.temp("was");
        let now = self.temp("now");
        let condition = self.filter_expr(filter)?;
        Ok(vec![
            Op::LoadState {
                state: cell,
                bind: was.clone(),
            },
            Op::ComputeScalar {
                expr: Expr::Test(Box::new(condition)),
                bind: now.clone(),
            },
            Op::StoreState {
                state: cell,
                value: Expr::Variable(now.clone()),
            },
            Op::AssertFilter {
                condition: FilterExpr::And(vec![
                    FilterExpr::Cmp {
                        lhs: Expr::Variable(now),
                        op: BinaryOp::Eq,
                        rhs: Expr::Constant(Value::Boolean(true)),
                    },
                    FilterExpr::Not(Box::new(FilterExpr::Cmp {
                        lhs: Expr::Variable(was),
                        op: BinaryOp::Eq,
                        rhs: Expr::Constant(Value::Boolean(true)),
                    })),
                ]),
            },
        ])
    }

    // --- streams --------------------------------------------------------------

    fn compile_stream(&mut self, stream: &Stream, body: Vec<Op>) -> CompileResult<Vec<Op>> {
        match stream {
            Stream::Timer { base, interval, .. } => {
                self.endpoint("org.thingpedia.builtin.thingengine.builtin", "timer", EndpointType::Timer);
                let iter = self.temp("t");
                Ok(vec![
                    Op::OpenTimer {
                        base: base.clone(),
                        interval: interval.clone(),
                        into: iter.clone(),
                    },
                    Op::Next {
                        iter,
                        bindings: Vec::new(),
                        body,
                    },
                ])
            }
            Stream::AtTimer { times, expiration, .. } => {
                self.endpoint(
                    "org.thingpedia.builtin.thingengine.builtin",
                    "attimer",
                    EndpointType::AtTimer,
                );
                let iter = self.temp("t");
                Ok(vec![
                    Op::OpenAtTimer {
                        times: times.clone(),
                        expiration: expiration.clone(),
                        into: iter.clone(),
                    },
                    Op::Next {
                        iter,
                        bindings: Vec::new(),
                        body,
                    },
                ])
            }
            Stream::Monitor { table, args, .. } => self.compile_monitor(table, args.clone(), Vec::new(), body),
            Stream::EdgeNew { stream, .. } => {
                let mut inner_body = self.dedupe_ops(None);
                inner_body.extend(body);
                self.compile_stream(stream, inner_body)
            }
            Stream::EdgeFilter { stream, filter, .. } => {
                let mut inner_body = self.edge_ops(filter)?;
                inner_body.extend(body);
                self.compile_stream(stream, inner_body)
            }
            Stream::Filter { stream, filter, .. } => {
                let condition = self.filter_expr(filter)?;
                let mut inner_body = vec![Op::AssertFilter { condition }];
                inner_body.extend(body);
                self.compile_stream(stream, inner_body)
            }
            Stream::Projection { stream, .. } | Stream::Alias { stream, .. } => self.compile_stream(stream, body),
            Stream::Join {
                stream, table, in_params, ..
            } => {
                self.check_join_bindings(stream.schema(), table.schema(), in_params)?;
                let inner_body = self.compile_table(table, in_params, body)?;
                self.compile_stream(stream, inner_body)
            }
            Stream::VarRef { name, in_params, .. } => {
                let decl = self.declaration(name)?;
                match &decl.body {
                    DeclarationBody::Stream(inner) => {
                        self.push_subst(decl, in_params)?;
                        let ops = self.compile_stream(inner, body);
                        self.subst.pop();
                        ops
                    }
                    _ => Err(self.err(
                        CompileErrorKind::UnboundVarRef,
                        format!("{name} does not name a stream declaration"),
                    )),
                }
            }
        }
    }

    /// Peels projections, filters, and computes off a monitored table down
    /// to its invocation. Filters become edge filters; projections narrow
    /// the change-detection argument set.
    fn compile_monitor<'b>(
        &mut self,
        table: &'b Table,
        arg_set: Option<Vec<String>>,
        edge_filters: Vec<&'b BooleanExpression>,
        body: Vec<Op>,
    ) -> CompileResult<Vec<Op>>
    where
        'a: 'b,
    {
        match table {
            Table::Invocation(invocation) => {
                let schema = self.schema_of(&invocation.schema, "monitored query")?;
                let endpoint = self.endpoint(&invocation.selector.kind, &invocation.channel, EndpointType::Stream);
                let in_params = self.params(&invocation.in_params)?;
                let iter = self.temp("t");

                let mut inner = self.dedupe_ops(arg_set);
                for filter in edge_filters {
                    inner.extend(self.edge_ops(filter)?);
                }
                inner.extend(body);

                Ok(vec![
                    Op::OpenMonitor {
                        endpoint,
                        in_params,
                        into: iter.clone(),
                    },
                    Op::Next {
                        iter,
                        bindings: schema.out_names().iter().map(|n| Binding::same(n)).collect(),
                        body: inner,
                    },
                ])
            }
            Table::Filter { table, filter, .. } => {
                let mut edge_filters = edge_filters;
                edge_filters.push(filter);
                self.compile_monitor(table, arg_set, edge_filters, body)
            }
            Table::Projection { table, args, .. } => {
                let narrowed = match arg_set {
                    Some(current) => Some(current.into_iter().filter(|a| args.contains(a)).collect()),
                    None => Some(args.clone()),
                };
                self.compile_monitor(table, narrowed, edge_filters, body)
            }
            Table::Alias { table, .. } => self.compile_monitor(table, arg_set, edge_filters, body),
            Table::Compute {
                table,
                expression,
                alias,
                ..
            } => {
                let bind = alias.clone().unwrap_or_else(|| compute_name(expression));
                let expr = self.scalar_expr(expression)?;
                let mut inner = vec![Op::ComputeScalar { expr, bind }];
                inner.extend(body);
                self.compile_monitor(table, arg_set, edge_filters, inner)
            }
            Table::VarRef { name, in_params, .. } => {
                if let Some(decl) = self.program.declarations.iter().find(|d| d.name == *name) {
                    match &decl.body {
                        DeclarationBody::Table(inner) => {
                            self.push_subst(decl, in_params)?;
                            let ops = self.compile_monitor(inner, arg_set, edge_filters, body);
                            self.subst.pop();
                            ops
                        }
                        _ => Err(self.err(
                            CompileErrorKind::UnboundVarRef,
                            format!("{name} does not name a table declaration"),
                        )),
                    }
                } else if let Some(assignment) = self.assignment(name) {
                    self.compile_monitor(&assignment.value, arg_set, edge_filters, body)
                } else {
                    Err(self.err(CompileErrorKind::UnboundVarRef, format!("no declaration named {name}")))
                }
            }
            other => Err(self.unsupported(&format!("monitor of {}", table_kind_name(other)))),
        }
    }

    // --- tables ---------------------------------------------------------------

    fn compile_table(&mut self, table: &Table, extra_params: &[InputParam], body: Vec<Op>) -> CompileResult<Vec<Op>> {
        match table {
            Table::Invocation(invocation) => {
                let schema = self.schema_of(&invocation.schema, "query")?;
                let endpoint = self.endpoint(&invocation.selector.kind, &invocation.channel, EndpointType::Query);
                let mut in_params = self.params(&invocation.in_params)?;
                for param in self.params(extra_params)? {
                    in_params.retain(|p| p.name != param.name);
                    in_params.push(param);
                }
                let result = self.temp("r");
                Ok(vec![
                    Op::InvokeQuery {
                        endpoint,
                        in_params,
                        into: result.clone(),
                    },
                    Op::Iterate {
                        result,
                        bindings: schema.out_names().iter().map(|n| Binding::same(n)).collect(),
                        body,
                    },
                ])
            }
            Table::Filter { table, filter, .. } => {
                let condition = self.filter_expr(filter)?;
                let mut inner = vec![Op::AssertFilter { condition }];
                inner.extend(body);
                self.compile_table(table, extra_params, inner)
            }
            Table::Projection { table, .. } | Table::Alias { table, .. } => {
                self.compile_table(table, extra_params, body)
            }
            Table::Compute {
                table,
                expression,
                alias,
                ..
            } => {
                let bind = alias.clone().unwrap_or_else(|| compute_name(expression));
                let expr = self.scalar_expr(expression)?;
                let mut inner = vec![Op::ComputeScalar { expr, bind }];
                inner.extend(body);
                self.compile_table(table, extra_params, inner)
            }
            Table::Join { lhs, rhs, in_params, .. } => {
                self.check_join_bindings(lhs.schema(), rhs.schema(), in_params)?;
                let inner = self.compile_table(rhs, in_params, body)?;
                self.compile_table(lhs, extra_params, inner)
            }
            Table::Aggregation {
                table,
                field,
                operator,
                alias,
                ..
            } => self.compile_aggregation(table, field, *operator, alias.as_deref(), extra_params, body),
            Table::VarRef { name, in_params, .. } => {
                if let Some(decl) = self.program.declarations.iter().find(|d| d.name == *name) {
                    match &decl.body {
                        DeclarationBody::Table(inner) => {
                            self.push_subst(decl, in_params)?;
                            let ops = self.compile_table(inner, extra_params, body);
                            self.subst.pop();
                            ops
                        }
                        _ => Err(self.err(
                            CompileErrorKind::UnboundVarRef,
                            format!("{name} does not name a table declaration"),
                        )),
                    }
                } else if let Some(assignment) = self.assignment(name) {
                    self.compile_table(&assignment.value, extra_params, body)
                } else {
                    Err(self.err(CompileErrorKind::UnboundVarRef, format!("no declaration named {name}")))
                }
            }
            other => Err(self.unsupported(table_kind_name(other))),
        }
    }

    /// Count, sum, and avg fold through a state cell per accumulator; the
    /// result enters the body as the aggregation's output variable. Min and
    /// max would need a conditional first-row store the instruction set
    /// cannot express.
    fn compile_aggregation(
        &mut self,
        table: &Table,
        field: &str,
        operator: AggregationOp,
        alias: Option<&str>,
        extra_params: &[InputParam],
        body: Vec<Op>,
    ) -> CompileResult<Vec<Op>> {
        let out_name = match (field, alias) {
            (_, Some(alias)) => alias.to_owned(),
            ("*", None) => "count".to_owned(),
            (field, None) => field.to_owned(),
        };
        let acc_var = self.temp("acc");
        match operator {
            AggregationOp::Count => {
                let cell = self.alloc_state();
                let ops = self.fold_ops(cell, &acc_var, Expr::Constant(Value::Number(1.0)));
                let mut main = vec![Op::StoreState {
                    state: cell,
                    value: Expr::Constant(Value::Number(0.0)),
                }];
                main.extend(self.compile_table(table, extra_params, ops)?);
                main.push(Op::LoadState {
                    state: cell,
                    bind: out_name,
                });
                main.extend(body);
                Ok(main)
            }
            AggregationOp::Sum => {
                let cell = self.alloc_state();
                let ops = self.fold_ops(cell, &acc_var, Expr::Variable(field.to_owned()));
                let mut main = vec![Op::StoreState {
                    state: cell,
                    value: Expr::Constant(Value::Number(0.0)),
                }];
                main.extend(self.compile_table(table, extra_params, ops)?);
                main.push(Op::LoadState {
                    state: cell,
                    bind: out_name,
                });
                main.extend(body);
                Ok(main)
            }
            AggregationOp::Avg => {
                let sum_cell = self.alloc_state();
                let count_cell = self.alloc_state();
                let count_var = self.temp("acc");
                let mut per_row = self.fold_ops(sum_cell, &acc_var, Expr::Variable(field.to_owned()));
                per_row.extend(self.fold_ops(count_cell, &count_var, Expr::Constant(Value::Number(1.0))));
                let sum_var = self.temp("sum");
                let n_var = self.temp("n");
                let mut main = vec![
                    Op::StoreState {
                        state: sum_cell,
                        value: Expr::Constant(Value::Number(0.0)),
                    },
                    Op::StoreState {
                        state: count_cell,
                        value: Expr::Constant(Value::Number(0.0)),
                    },
                ];
                main.extend(self.compile_table(table, extra_params, per_row)?);
                main.push(Op::LoadState {
                    state: sum_cell,
                    bind: sum_var.clone(),
                });
                main.push(Op::LoadState {
                    state: count_cell,
                    bind: n_var.clone(),
                });
                main.push(Op::ComputeScalar {
                    expr: Expr::Apply {
                        op: ScalarOp::Div,
                        args: vec![Expr::Variable(sum_var), Expr::Variable(n_var)],
                    },
                    bind: out_name,
                });
                main.extend(body);
                Ok(main)
            }
            AggregationOp::Min | AggregationOp::Max => Err(self.unsupported(&format!("{operator} aggregation"))),
        }
    }

    /// A join binds each side's outputs as rule variables; a field both
    /// sides produce (and the join does not consume) would silently
    /// overwrite the left value.
    fn check_join_bindings(
        &self,
        left: &SchemaSlot,
        right: &SchemaSlot,
        in_params: &[InputParam],
    ) -> CompileResult<()> {
        let (Some(left), Some(right)) = (left.get(), right.get()) else {
            return Ok(());
        };
        let provided: Vec<&str> = in_params.iter().map(|p| p.name.as_str()).collect();
        for arg in right.outputs() {
            if provided.contains(&arg.name.as_str()) {
                continue;
            }
            if left.outputs().any(|l| l.name == arg.name) {
                return Err(self.err(
                    CompileErrorKind::AmbiguousJoin,
                    format!("both sides of the join produce {}", arg.name),
                ));
            }
        }
        Ok(())
    }

    /// `acc ← acc + increment` through one state cell.
    fn fold_ops(&mut self, cell: u32, acc_var: &str, increment: Expr) -> Vec<Op> {
        vec![
            Op::LoadState {
                state: cell,
                bind: acc_var.to_owned(),
            },
            Op::StoreState {
                state: cell,
                value: Expr::Apply {
                    op: ScalarOp::Add,
                    args: vec![Expr::Variable(acc_var.to_owned()), increment],
                },
            },
        ]
    }

    // --- actions --------------------------------------------------------------

    fn compile_actions(&mut self, rule: &Rule) -> CompileResult<Vec<Op>> {
        let mut ops = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            match action {
                Action::Invocation(invocation) => {
                    let endpoint =
                        self.endpoint(&invocation.selector.kind, &invocation.channel, EndpointType::Action);
                    let in_params = self.params(&invocation.in_params)?;
                    ops.push(Op::InvokeAction { endpoint, in_params });
                }
                Action::Notify { .. } => {
                    ops.push(self.notify_op(rule)?);
                }
            }
        }
        Ok(ops)
    }

    fn notify_op(&mut self, rule: &Rule) -> CompileResult<Op> {
        let output_type = output_type_of(rule);
        let record = match &rule.source {
            Some(RuleSource::Stream(stream)) => self.schema_of(stream.schema(), "rule source")?,
            Some(RuleSource::Table(table)) => self.schema_of(table.schema(), "rule source")?,
            None => {
                return Ok(Op::Output {
                    output_type,
                    record: Vec::new(),
                });
            }
        };
        Ok(Op::Output {
            output_type,
            record: record
                .out_names()
                .into_iter()
                .map(|name| StaticParam {
                    name: name.clone(),
                    value: Expr::Variable(name),
                })
                .collect(),
        })
    }

    // --- declarations ---------------------------------------------------------

    fn declaration(&self, name: &str) -> CompileResult<&'a Declaration> {
        self.program
            .declarations
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| self.err(CompileErrorKind::UnboundVarRef, format!("no declaration named {name}")))
    }

    fn assignment(&self, name: &str) -> Option<&'a Assignment> {
        self.program.assignments.iter().find(|a| a.name == name)
    }

    fn push_subst(&mut self, decl: &Declaration, in_params: &[InputParam]) -> CompileResult<()> {
        let mut frame = AHashMap::with_capacity(in_params.len());
        for param in in_params {
            if decl.args.contains_key(&param.name) {
                frame.insert(param.name.clone(), param.value.clone());
            }
        }
        self.subst.push(frame);
        Ok(())
    }
}

/// The `outputType` of a notify: the rule's invoked functions as
/// `kind:channel`, joined with `+`, in source order. `null` when the rule
/// has no source.
fn output_type_of(rule: &Rule) -> String {
    struct Collector {
        parts: Vec<String>,
    }
    impl<'ast> AstVisitor<'ast> for Collector {
        fn visit_invocation(&mut self, kind: PrimitiveKind, invocation: &'ast Invocation) {
            if kind != PrimitiveKind::Action {
                self.parts.push(format!("{}:{}", invocation.selector.kind, invocation.channel));
            }
        }
        fn visit_external(&mut self, _selector: &'ast Selector, _channel: &'ast str) {}
    }
    let mut collector = Collector { parts: Vec::new() };
    walk_rule(&mut collector, rule);
    if collector.parts.is_empty() {
        "null".to_owned()
    } else {
        collector.parts.join("+")
    }
}

fn table_kind_name(table: &Table) -> &'static str {
    match table {
        Table::Invocation(_) => "an invocation",
        Table::VarRef { .. } => "a reference",
        Table::Filter { .. } => "a filter",
        Table::Projection { .. } => "a projection",
        Table::Alias { .. } => "an alias",
        Table::Aggregation { .. } => "an aggregation",
        Table::Sort { .. } => "sort",
        Table::Index { .. } => "index",
        Table::Slice { .. } => "slice",
        Table::Compute { .. } => "compute",
        Table::Join { .. } => "a join",
        Table::Window { .. } => "a window over memory",
        Table::TimeSeries { .. } => "a time series over memory",
        Table::Sequence { .. } => "a sequence over memory",
        Table::History { .. } => "a history over memory",
        Table::ResultRef { .. } => "a result reference",
    }
}
