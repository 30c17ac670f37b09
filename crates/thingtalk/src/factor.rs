//! Remote factoring: splitting a program across principals.
//!
//! A primitive is remote when its selector names a principal other than the
//! program's own executor (or `self`). Every remote primitive is lifted out
//! into a sibling program targeted at that principal, and the two sides are
//! stitched together with synthesized `__dyn_k` classes extending the
//! reserved remote broker class: a `send` action on the producing side and a
//! monitored `receive` query on the consuming side, correlated by a fresh
//! 128-bit flow token.
//!
//! The pass is deterministic: tokens come from a seeded ChaCha stream and
//! `__dyn_k` counters run per pass. The program must be typechecked first —
//! the lifted field lists come from resolved `schema` slots; primitives
//! whose slots are missing are left local.

use rand::RngCore;
use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
use uuid::Uuid;

use crate::ast::visit::{walk_stream, walk_table, AstVisitor, PrimitiveKind};
use crate::ast::{
    Action, ClassDef, FunctionDef, FunctionKind, InputParam, Invocation, Program, Rule, RuleSource, SchemaSlot,
    Selector, Stream, Table,
};
use crate::builtin::{remote_receive, remote_send, REMOTE_BROKER_KIND};
use crate::types::Type;
use crate::value::Value;

/// Configuration of one factoring pass.
#[derive(Debug, Clone)]
pub struct FactorOptions {
    /// Seed of the flow-token stream; the same seed reproduces the same
    /// tokens.
    pub seed: u64,
    /// The identity remote parties reply to. Falls back to the program's
    /// `principal`, then to `"self"^^tt:contact`.
    pub own_principal: Option<Value>,
}

impl Default for FactorOptions {
    fn default() -> Self {
        Self {
            seed: 0,
            own_principal: None,
        }
    }
}

/// A sub-program to ship to another principal.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProgram {
    pub principal: Value,
    pub program: Program,
}

/// The result of factoring: the rewritten local program (if any rules
/// remain) and the outbound sub-programs in first-appearance order.
#[derive(Debug, Clone, PartialEq)]
pub struct FactoredProgram {
    pub local: Option<Program>,
    pub remote: Vec<RemoteProgram>,
}

/// Splits a typechecked program across its principals.
pub fn factor_remote(mut program: Program, options: &FactorOptions) -> FactoredProgram {
    let own = options
        .own_principal
        .clone()
        .or_else(|| program.principal.clone())
        .unwrap_or_else(|| Value::entity("self", "tt:contact"));
    let mut pass = FactorPass {
        own,
        rng: ChaCha20Rng::seed_from_u64(options.seed),
        dyn_count: 0,
        extra_classes: Vec::new(),
        forwards: Vec::new(),
        remote: Vec::new(),
    };

    let mut local_rules = Vec::new();
    for rule in std::mem::take(&mut program.rules) {
        let local = pass.factor_rule(rule);
        local_rules.append(&mut pass.forwards);
        if let Some(local) = local {
            local_rules.push(local);
        }
    }
    program.rules = local_rules;
    program.classes.extend(pass.extra_classes);

    let local = if program.rules.is_empty() && program.assignments.is_empty() && program.declarations.is_empty() {
        None
    } else {
        Some(program)
    };
    FactoredProgram {
        local,
        remote: pass.remote,
    }
}

struct FactorPass {
    own: Value,
    rng: ChaCha20Rng,
    dyn_count: u32,
    /// Synthesized classes the local program uses.
    extra_classes: Vec<ClassDef>,
    /// Pre-query forwarding rules produced while splitting a join; drained
    /// into the local rule list after each rule.
    forwards: Vec<Rule>,
    remote: Vec<RemoteProgram>,
}

impl FactorPass {
    fn flow_token(&mut self) -> Value {
        let mut bits = [0u8; 16];
        self.rng.fill_bytes(&mut bits);
        Value::entity(
            &Uuid::from_u128(u128::from_le_bytes(bits)).hyphenated().to_string(),
            "tt:flow_token",
        )
    }

    fn dyn_kind(&mut self) -> String {
        let kind = format!("__dyn_{}", self.dyn_count);
        self.dyn_count += 1;
        kind
    }

    /// The sibling program for a principal, created on first use.
    fn remote_program(&mut self, principal: &Value) -> &mut Program {
        if let Some(index) = self.remote.iter().position(|r| r.principal == *principal) {
            return &mut self.remote[index].program;
        }
        self.remote.push(RemoteProgram {
            principal: principal.clone(),
            program: Program {
                principal: Some(principal.clone()),
                ..Program::default()
            },
        });
        &mut self.remote.last_mut().expect("just pushed").program
    }

    /// A `send` action invocation plus the class that declares it. The class
    /// lands on the sending program; the caller supplies where.
    fn make_send(
        &mut self,
        destination: &Value,
        token: &Value,
        kind_channel: &str,
        fields: &[(String, Type)],
        field_values: Vec<(String, Value)>,
    ) -> (ClassDef, Invocation) {
        let kind = self.dyn_kind();
        let def = remote_send(fields);
        let mut class = ClassDef::new(&kind);
        class.extends.push(REMOTE_BROKER_KIND.to_owned());
        class.add_action(def);

        let mut in_params = vec![
            InputParam::new("__principal", destination.clone()),
            InputParam::new("__token", token.clone()),
            InputParam::new("__kindChannel", Value::entity(kind_channel, "tt:function_name")),
        ];
        for (name, value) in field_values {
            in_params.push(InputParam::new(&name, value));
        }
        let mut invocation = Invocation::new(Selector::new(&kind), "send", in_params);
        if let Some(def) = class.actions.get("send") {
            invocation.schema = SchemaSlot::resolved(def.clone());
        }
        (class, invocation)
    }

    /// A monitored `receive` stream plus the class that declares it.
    fn make_receive(
        &mut self,
        sender: &Value,
        token: &Value,
        kind_channel: &str,
        fields: &[(String, Type)],
    ) -> (ClassDef, Stream) {
        let kind = self.dyn_kind();
        let def = remote_receive(fields);
        let mut class = ClassDef::new(&kind);
        class.extends.push(REMOTE_BROKER_KIND.to_owned());
        class.add_query(def);

        let in_params = vec![
            InputParam::new("__principal", sender.clone()),
            InputParam::new("__token", token.clone()),
            InputParam::new("__kindChannel", Value::entity(kind_channel, "tt:function_name")),
        ];
        let mut invocation = Invocation::new(Selector::new(&kind), "receive", in_params);
        let receive_def = class.queries.get("receive").expect("just inserted").clone();
        invocation.schema = SchemaSlot::resolved(receive_def.clone());

        let mut monitor_def = (*receive_def).clone();
        monitor_def.kind = FunctionKind::Stream;
        let stream = Stream::Monitor {
            table: Box::new(Table::Invocation(invocation)),
            args: None,
            schema: SchemaSlot::resolved(std::rc::Rc::new(monitor_def)),
        };
        (class, stream)
    }

    fn is_remote(&self, selector: &Selector) -> Option<Value> {
        let principal = selector.principal.as_ref()?;
        if selector.is_local() || *principal == self.own {
            return None;
        }
        Some(principal.clone())
    }

    /// Factors one rule; returns the rule that stays local, if any.
    fn factor_rule(&mut self, mut rule: Rule) -> Option<Rule> {
        let had_source = rule.source.is_some();
        rule.source = match rule.source.take() {
            Some(RuleSource::Stream(stream)) => Some(RuleSource::Stream(self.factor_stream_source(stream))),
            Some(RuleSource::Table(table)) => Some(self.factor_table_source(table)),
            None => None,
        };

        let mut local_actions = Vec::new();
        let actions = std::mem::take(&mut rule.actions);
        for action in actions {
            match action {
                Action::Invocation(invocation) => match self.is_remote(&invocation.selector) {
                    Some(principal) if had_source => {
                        local_actions.push(self.externalize_action(invocation, &principal));
                    }
                    Some(principal) => {
                        // A pure remote action moves wholesale; nothing local
                        // remains of it.
                        let mut invocation = invocation;
                        invocation.selector.principal = None;
                        let remote = self.remote_program(&principal);
                        remote.rules.push(Rule {
                            source: None,
                            actions: vec![Action::Invocation(invocation)],
                        });
                    }
                    None => local_actions.push(Action::Invocation(invocation)),
                },
                Action::Notify { schema } => local_actions.push(Action::Notify { schema }),
            }
        }
        rule.actions = local_actions;

        if rule.actions.is_empty() {
            None
        } else {
            Some(rule)
        }
    }

    /// Rewrites a remote action into a local `send`, mirrored by a
    /// receive-driven rule on the remote side. Undefined parameters stay
    /// holes on the remote side rather than being shipped.
    fn externalize_action(&mut self, mut invocation: Invocation, principal: &Value) -> Action {
        let schema = invocation.schema.get().cloned();
        let Some(schema) = schema else {
            // Not typechecked; leave the action alone.
            return Action::Invocation(invocation);
        };
        let token = self.flow_token();
        let kind_channel = format!("{}:{}", invocation.selector.kind, invocation.channel);

        let mut fields = Vec::new();
        let mut field_values = Vec::new();
        let mut remote_params = Vec::new();
        for param in &invocation.in_params {
            if matches!(param.value, Value::Undefined { .. }) {
                remote_params.push(param.clone());
                continue;
            }
            let ty = schema.arg_type(&param.name).cloned().unwrap_or(Type::Any);
            fields.push((param.name.clone(), ty));
            field_values.push((param.name.clone(), param.value.clone()));
            remote_params.push(InputParam::new(&param.name, Value::VarRef(param.name.clone())));
        }

        let own = self.own.clone();
        let (send_class, send_invocation) = self.make_send(principal, &token, &kind_channel, &fields, field_values);
        self.extra_classes.push(send_class);

        let (receive_class, receive_stream) = self.make_receive(&own, &token, &kind_channel, &fields);
        invocation.selector.principal = None;
        invocation.in_params = remote_params;
        let remote = self.remote_program(principal);
        remote.classes.push(receive_class);
        remote.rules.push(Rule {
            source: Some(RuleSource::Stream(receive_stream)),
            actions: vec![Action::Invocation(invocation)],
        });

        Action::Invocation(send_invocation)
    }

    /// Externalizes a remote stream source: the stream itself runs on the
    /// remote side feeding a `send`; the local rule resumes on the receive.
    fn factor_stream_source(&mut self, stream: Stream) -> Stream {
        // Joins split around the remote side; whole-stream lifting handles
        // the rest.
        if let Stream::Join {
            stream: left,
            table,
            in_params,
            schema,
        } = stream
        {
            return self.factor_stream_join(*left, *table, in_params, schema);
        }

        let Some(principal) = remote_principal_of_stream(&stream) else {
            return stream;
        };
        // Lifting ships the whole expression; a mixed tree stays local
        // rather than dragging foreign primitives along.
        if !uniformly_remote_stream(&stream, &principal) {
            return stream;
        }
        let Some(schema) = stream.schema().get().cloned() else {
            return stream;
        };

        let token = self.flow_token();
        let kind_channel = primitive_name_of_stream(&stream).unwrap_or_else(|| "null".to_owned());
        let fields: Vec<(String, Type)> = schema.outputs().map(|a| (a.name.clone(), a.ty.clone())).collect();
        let field_values: Vec<(String, Value)> = fields
            .iter()
            .map(|(name, _)| (name.clone(), Value::VarRef(name.clone())))
            .collect();

        let own = self.own.clone();
        let (send_class, send_invocation) = self.make_send(&own, &token, &kind_channel, &fields, field_values);
        let mut remote_stream = stream;
        strip_stream_principals(&mut remote_stream);
        let remote = self.remote_program(&principal);
        remote.classes.push(send_class);
        remote.rules.push(Rule {
            source: Some(RuleSource::Stream(remote_stream)),
            actions: vec![Action::Invocation(send_invocation)],
        });

        let (receive_class, receive_stream) = self.make_receive(&principal, &token, &kind_channel, &fields);
        self.extra_classes.push(receive_class);
        receive_stream
    }

    /// Externalizes a remote one-shot query source.
    fn factor_table_source(&mut self, table: Table) -> RuleSource {
        if let Table::Join {
            lhs,
            rhs,
            in_params,
            schema,
        } = table
        {
            return self.factor_table_join(*lhs, *rhs, in_params, schema);
        }

        let Some(principal) = remote_principal_of_table(&table) else {
            return RuleSource::Table(table);
        };
        if !uniformly_remote_table(&table, &principal) {
            return RuleSource::Table(table);
        }
        let Some(schema) = table.schema().get().cloned() else {
            return RuleSource::Table(table);
        };

        let token = self.flow_token();
        let kind_channel = primitive_name_of_table(&table).unwrap_or_else(|| "null".to_owned());
        let fields: Vec<(String, Type)> = schema.outputs().map(|a| (a.name.clone(), a.ty.clone())).collect();
        let field_values: Vec<(String, Value)> = fields
            .iter()
            .map(|(name, _)| (name.clone(), Value::VarRef(name.clone())))
            .collect();

        let own = self.own.clone();
        let (send_class, send_invocation) = self.make_send(&own, &token, &kind_channel, &fields, field_values);
        let mut remote_table = table;
        strip_table_principals(&mut remote_table);
        let remote = self.remote_program(&principal);
        remote.classes.push(send_class);
        remote.rules.push(Rule {
            source: Some(RuleSource::Table(remote_table)),
            actions: vec![Action::Invocation(send_invocation)],
        });

        let (receive_class, receive_stream) = self.make_receive(&principal, &token, &kind_channel, &fields);
        self.extra_classes.push(receive_class);
        RuleSource::Stream(receive_stream)
    }

    /// Splits `stream ⋈ remote-table`: the local stream forwards its
    /// bindings, the remote joins them against the query and sends the
    /// merged record back, and the caller's rule resumes on that receive.
    fn factor_stream_join(
        &mut self,
        left: Stream,
        table: Table,
        in_params: Vec<InputParam>,
        join_schema: SchemaSlot,
    ) -> Stream {
        let table_principal = remote_principal_of_table(&table);
        let left = self.factor_stream_source(left);

        let principal = match table_principal {
            Some(principal) if uniformly_remote_table(&table, &principal) => principal,
            _ => {
                return Stream::Join {
                    stream: Box::new(left),
                    table: Box::new(table),
                    in_params,
                    schema: join_schema,
                };
            }
        };
        let (Some(left_schema), Some(merged_schema)) = (left.schema().get().cloned(), join_schema.get().cloned())
        else {
            return Stream::Join {
                stream: Box::new(left),
                table: Box::new(table),
                in_params,
                schema: join_schema,
            };
        };
        self.split_join_legs(
            &principal,
            RuleSource::Stream(left),
            &left_schema,
            table,
            in_params,
            &join_schema,
            &merged_schema,
        )
    }

    /// The table-sourced counterpart of [`FactorPass::factor_stream_join`]:
    /// `now => (A join B@remote) => ...` forwards A's rows, joins them
    /// remotely, and resumes on the merged receive.
    fn factor_table_join(
        &mut self,
        lhs: Table,
        rhs: Table,
        in_params: Vec<InputParam>,
        join_schema: SchemaSlot,
    ) -> RuleSource {
        let rhs_principal = remote_principal_of_table(&rhs);
        let left_source = self.factor_table_source(lhs);

        let principal = match rhs_principal {
            Some(principal) if uniformly_remote_table(&rhs, &principal) => principal,
            _ => return rebuild_join(left_source, rhs, in_params, join_schema),
        };
        let left_schema = match &left_source {
            RuleSource::Table(table) => table.schema().get().cloned(),
            RuleSource::Stream(stream) => stream.schema().get().cloned(),
        };
        let (Some(left_schema), Some(merged_schema)) = (left_schema, join_schema.get().cloned()) else {
            return rebuild_join(left_source, rhs, in_params, join_schema);
        };
        RuleSource::Stream(self.split_join_legs(
            &principal,
            left_source,
            &left_schema,
            rhs,
            in_params,
            &join_schema,
            &merged_schema,
        ))
    }

    /// The two send/receive legs of a split join: the local side forwards
    /// its accumulated bindings, the remote joins them against its query and
    /// sends the merged record back. Returns the receive the local rule
    /// resumes on; the forwarding rule is parked for the factoring loop.
    fn split_join_legs(
        &mut self,
        principal: &Value,
        left_source: RuleSource,
        left_schema: &FunctionDef,
        remote_table: Table,
        in_params: Vec<InputParam>,
        join_schema: &SchemaSlot,
        merged_schema: &FunctionDef,
    ) -> Stream {
        // Leg one: forward the accumulated bindings.
        let forward_token = self.flow_token();
        let forward_fields: Vec<(String, Type)> =
            left_schema.outputs().map(|a| (a.name.clone(), a.ty.clone())).collect();
        let forward_values: Vec<(String, Value)> = forward_fields
            .iter()
            .map(|(name, _)| (name.clone(), Value::VarRef(name.clone())))
            .collect();
        let own = self.own.clone();
        let (forward_send_class, forward_send) =
            self.make_send(principal, &forward_token, "null", &forward_fields, forward_values);
        self.extra_classes.push(forward_send_class);
        let (forward_receive_class, forward_receive) =
            self.make_receive(&own, &forward_token, "null", &forward_fields);

        // Leg two: the remote joins and sends the merged record back. The
        // channel label names the remote member of the join.
        let return_token = self.flow_token();
        let kind_channel = primitive_name_of_table(&remote_table).unwrap_or_else(|| "null".to_owned());
        let return_fields: Vec<(String, Type)> =
            merged_schema.outputs().map(|a| (a.name.clone(), a.ty.clone())).collect();
        let return_values: Vec<(String, Value)> = return_fields
            .iter()
            .map(|(name, _)| (name.clone(), Value::VarRef(name.clone())))
            .collect();
        let (return_send_class, return_send) =
            self.make_send(&own, &return_token, &kind_channel, &return_fields, return_values);

        let mut remote_table = remote_table;
        strip_table_principals(&mut remote_table);
        let remote_join = Stream::Join {
            stream: Box::new(forward_receive),
            table: Box::new(remote_table),
            in_params,
            schema: join_schema.clone_resolved(),
        };
        let remote = self.remote_program(principal);
        remote.classes.push(forward_receive_class);
        remote.classes.push(return_send_class);
        remote.rules.push(Rule {
            source: Some(RuleSource::Stream(remote_join)),
            actions: vec![Action::Invocation(return_send)],
        });

        let (return_receive_class, return_receive) =
            self.make_receive(principal, &return_token, &kind_channel, &return_fields);
        self.extra_classes.push(return_receive_class);
        self.pending_forward(left_source, forward_send);
        return_receive
    }

    /// Parks the pre-query forwarding rule of a split join; the factoring
    /// loop drains it into the local rule list.
    fn pending_forward(&mut self, source: RuleSource, send: Invocation) {
        self.forwards.push(Rule {
            source: Some(source),
            actions: vec![Action::Invocation(send)],
        });
    }
}

/// Reassembles a join whose remote side turned out not to be liftable.
fn rebuild_join(left: RuleSource, rhs: Table, in_params: Vec<InputParam>, schema: SchemaSlot) -> RuleSource {
    match left {
        RuleSource::Table(lhs) => RuleSource::Table(Table::Join {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            in_params,
            schema,
        }),
        RuleSource::Stream(stream) => RuleSource::Stream(Stream::Join {
            stream: Box::new(stream),
            table: Box::new(rhs),
            in_params,
            schema,
        }),
    }
}

/// True if every primitive the expression touches targets `principal`.
/// Lifting an expression wholesale ships all of it to that principal, so a
/// single foreign (or local) primitive makes the lift unsound. A reference
/// makes the answer unknowable and counts as mixed; the analyzer already
/// rejects remote selectors inside declaration and assignment bodies.
struct UniformityCheck<'v> {
    principal: &'v Value,
    uniform: bool,
}

impl<'ast, 'v> AstVisitor<'ast> for UniformityCheck<'v> {
    fn visit_invocation(&mut self, _kind: PrimitiveKind, invocation: &'ast Invocation) {
        if invocation.selector.principal.as_ref() != Some(self.principal) {
            self.uniform = false;
        }
    }

    fn visit_external(&mut self, selector: &'ast Selector, _channel: &'ast str) {
        if selector.principal.as_ref() != Some(self.principal) {
            self.uniform = false;
        }
    }

    fn visit_var_ref(&mut self, _kind: PrimitiveKind, _name: &'ast str) {
        self.uniform = false;
    }
}

fn uniformly_remote_stream(stream: &Stream, principal: &Value) -> bool {
    let mut check = UniformityCheck { principal, uniform: true };
    walk_stream(&mut check, stream);
    check.uniform
}

fn uniformly_remote_table(table: &Table, principal: &Value) -> bool {
    let mut check = UniformityCheck { principal, uniform: true };
    walk_table(&mut check, table);
    check.uniform
}

// References never carry a principal of their own, and the analyzer rejects
// remote selectors inside the declaration and assignment bodies they point
// at, so `VarRef` is local by construction; `ResultRef` has no selector.
fn remote_principal_of_stream(stream: &Stream) -> Option<Value> {
    match stream {
        Stream::Timer { .. } | Stream::AtTimer { .. } | Stream::VarRef { .. } => None,
        Stream::Monitor { table, .. } => remote_principal_of_table(table),
        Stream::EdgeNew { stream, .. }
        | Stream::EdgeFilter { stream, .. }
        | Stream::Filter { stream, .. }
        | Stream::Projection { stream, .. }
        | Stream::Alias { stream, .. } => remote_principal_of_stream(stream),
        Stream::Join { stream, table, .. } => {
            remote_principal_of_stream(stream).or_else(|| remote_principal_of_table(table))
        }
    }
}

fn remote_principal_of_table(table: &Table) -> Option<Value> {
    match table {
        Table::Invocation(invocation) => match &invocation.selector.principal {
            Some(principal) if !invocation.selector.is_local() => Some(principal.clone()),
            _ => None,
        },
        Table::Filter { table, .. }
        | Table::Projection { table, .. }
        | Table::Alias { table, .. }
        | Table::Aggregation { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Compute { table, .. }
        | Table::Sequence { table, .. }
        | Table::History { table, .. } => remote_principal_of_table(table),
        Table::Join { lhs, rhs, .. } => remote_principal_of_table(lhs).or_else(|| remote_principal_of_table(rhs)),
        Table::Window { stream, .. } | Table::TimeSeries { stream, .. } => remote_principal_of_stream(stream),
        Table::VarRef { .. } | Table::ResultRef { .. } => None,
    }
}

fn strip_stream_principals(stream: &mut Stream) {
    match stream {
        Stream::Timer { .. } | Stream::AtTimer { .. } | Stream::VarRef { .. } => {}
        Stream::Monitor { table, .. } => strip_table_principals(table),
        Stream::EdgeNew { stream, .. }
        | Stream::EdgeFilter { stream, .. }
        | Stream::Filter { stream, .. }
        | Stream::Projection { stream, .. }
        | Stream::Alias { stream, .. } => strip_stream_principals(stream),
        Stream::Join { stream, table, .. } => {
            strip_stream_principals(stream);
            strip_table_principals(table);
        }
    }
}

fn strip_table_principals(table: &mut Table) {
    match table {
        Table::Invocation(invocation) => invocation.selector.principal = None,
        Table::Filter { table, .. }
        | Table::Projection { table, .. }
        | Table::Alias { table, .. }
        | Table::Aggregation { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Compute { table, .. }
        | Table::Sequence { table, .. }
        | Table::History { table, .. } => strip_table_principals(table),
        Table::Join { lhs, rhs, .. } => {
            strip_table_principals(lhs);
            strip_table_principals(rhs);
        }
        Table::Window { stream, .. } | Table::TimeSeries { stream, .. } => strip_stream_principals(stream),
        Table::VarRef { .. } | Table::ResultRef { .. } => {}
    }
}

/// `kind:channel` of the stream's underlying primitive, for `__kindChannel`.
fn primitive_name_of_stream(stream: &Stream) -> Option<String> {
    match stream {
        Stream::Monitor { table, .. } => primitive_name_of_table(table),
        Stream::EdgeNew { stream, .. }
        | Stream::EdgeFilter { stream, .. }
        | Stream::Filter { stream, .. }
        | Stream::Projection { stream, .. }
        | Stream::Alias { stream, .. }
        | Stream::Join { stream, .. } => primitive_name_of_stream(stream),
        Stream::Timer { .. } | Stream::AtTimer { .. } | Stream::VarRef { .. } => None,
    }
}

fn primitive_name_of_table(table: &Table) -> Option<String> {
    match table {
        Table::Invocation(invocation) => Some(format!("{}:{}", invocation.selector.kind, invocation.channel)),
        Table::Filter { table, .. }
        | Table::Projection { table, .. }
        | Table::Alias { table, .. }
        | Table::Aggregation { table, .. }
        | Table::Sort { table, .. }
        | Table::Index { table, .. }
        | Table::Slice { table, .. }
        | Table::Compute { table, .. }
        | Table::Sequence { table, .. }
        | Table::History { table, .. } => primitive_name_of_table(table),
        // Name the side the lift is actually about: the remote member wins
        // when only one side names a principal.
        Table::Join { lhs, rhs, .. } => {
            if remote_principal_of_table(lhs).is_none() && remote_principal_of_table(rhs).is_some() {
                primitive_name_of_table(rhs)
            } else {
                primitive_name_of_table(lhs)
            }
        }
        Table::Window { stream, .. } | Table::TimeSeries { stream, .. } => primitive_name_of_stream(stream),
        Table::VarRef { .. } | Table::ResultRef { .. } => None,
    }
}
