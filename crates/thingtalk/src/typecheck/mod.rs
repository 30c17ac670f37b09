//! The semantic analyzer.
//!
//! Analysis happens in two phases. The async prelude walks the program with
//! `iterate_primitives`, collects every class kind it references, and issues
//! one batched schema load; everything after that is synchronous recursion
//! over the AST using cache-only lookups, filling `schema` slots, resolving
//! operator overloads, and completing missing required inputs with
//! `Undefined` holes.
//!
//! Typechecking is idempotent: checking an already-checked program re-derives
//! the same slots and adds no further holes. Type errors are fatal and
//! propagate out of the entry point; on cancellation the current subtree's
//! slots are left untouched (slots are only written after a node fully
//! checks).

pub mod operators;

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::ast::visit::{self, AstVisitor, PrimitiveKind};
use crate::ast::{
    Action, AggregationOp, ArgDirection, ArgumentDef, Assignment, Bookkeeping, BooleanExpression, ClassDef,
    ClassPool, Dataset, Declaration, DeclarationBody, Example, ExampleKind, ExampleValue, FunctionDef, FunctionKind,
    ImportStmt, InputParam, Invocation, Library, PermissionFunction, PermissionRule, Program, Rule, RuleSource,
    ScalarExpression, ScalarOp, Selector, Stream, Table, iterate_primitives,
};
use crate::builtin;
use crate::error::{TypeError, TypeErrorKind, TypeResult};
use crate::scope::{Scope, ScopeEntry};
use crate::schema::{CancellationToken, SchemaRetriever};
use crate::types::{is_assignable, EntitySubtypes, Type, TypeScope};
use crate::value::Value;

use self::operators::{resolve_binary, resolve_scalar};

/// Configuration for one analysis pass.
#[derive(Debug, Clone, Default)]
pub struct TypeCheckOptions {
    /// The entity subtype relation used by assignability.
    pub entities: EntitySubtypes,
}

/// Typechecks a whole program in place: fills every primitive's `schema`
/// slot, resolves overloads, and completes missing required inputs with
/// holes. Errors are fatal to the program.
pub async fn type_check_program(
    program: &mut Program,
    schemas: &SchemaRetriever,
    options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    if let Some(principal) = &program.principal {
        check_principal(principal)?;
    }

    let mut checker = Checker::new(schemas, options, cancel);
    for class in &program.classes {
        type_check_class(class, schemas, options, cancel).await?;
        checker.register_local_class(class.clone());
    }
    checker.preload_program(program).await?;

    let mut scope = Scope::new();
    for decl in &mut program.declarations {
        cancel.check()?;
        let name = decl.name.clone();
        checker
            .check_declaration(decl, &mut scope)
            .map_err(|e| e.at(format!("declaration {name}")))?;
    }
    for assignment in &mut program.assignments {
        cancel.check()?;
        let name = assignment.name.clone();
        checker
            .check_assignment(assignment, &mut scope)
            .map_err(|e| e.at(format!("assignment {name}")))?;
    }
    for (index, rule) in program.rules.iter_mut().enumerate() {
        cancel.check()?;
        scope.clean();
        checker.check_rule(rule, &mut scope).map_err(|e| e.at(format!("rule {index}")))?;
    }
    Ok(())
}

/// Typechecks a library of classes and datasets (a "meta" file).
pub async fn type_check_meta(
    library: &mut Library,
    schemas: &SchemaRetriever,
    options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    let mut seen = AHashSet::new();
    for class in &library.classes {
        if !seen.insert(class.kind.clone()) {
            return Err(TypeError::new(
                TypeErrorKind::DuplicateDeclaration,
                format!("duplicate class @{}", class.kind),
            ));
        }
        type_check_class(class, schemas, options, cancel).await?;
    }
    let mut dataset_names = AHashSet::new();
    for dataset in &mut library.datasets {
        if !dataset_names.insert(dataset.name.clone()) {
            return Err(TypeError::new(
                TypeErrorKind::DuplicateDeclaration,
                format!("duplicate dataset {}", dataset.name),
            ));
        }
        type_check_dataset(dataset, &library.classes, schemas, options, cancel).await?;
    }
    Ok(())
}

async fn type_check_dataset(
    dataset: &mut Dataset,
    local_classes: &[ClassDef],
    schemas: &SchemaRetriever,
    options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    for example in &mut dataset.examples {
        type_check_example_with_classes(example, local_classes, schemas, options, cancel)
            .await
            .map_err(|e| e.at(format!("dataset {}", dataset.name)))?;
    }
    Ok(())
}

/// Typechecks one dataset example: the lambda arguments enter the lexical
/// scope and the body must match the declared kind.
pub async fn type_check_example(
    example: &mut Example,
    schemas: &SchemaRetriever,
    options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    type_check_example_with_classes(example, &[], schemas, options, cancel).await
}

async fn type_check_example_with_classes(
    example: &mut Example,
    local_classes: &[ClassDef],
    schemas: &SchemaRetriever,
    options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    match (&example.kind, &example.value) {
        (ExampleKind::Stream, ExampleValue::Stream(_))
        | (ExampleKind::Query, ExampleValue::Table(_))
        | (ExampleKind::Action, ExampleValue::Action(_))
        | (ExampleKind::Program, ExampleValue::Program(_)) => {}
        (kind, _) => {
            return Err(TypeError::new(
                TypeErrorKind::TypeMismatch,
                format!("example {} declares kind {kind} but its body is of a different kind", example.id),
            ));
        }
    }

    if let ExampleValue::Program(program) = &mut example.value {
        return type_check_program(program, schemas, options, cancel).await;
    }

    let mut checker = Checker::new(schemas, options, cancel);
    for class in local_classes {
        checker.register_local_class(class.clone());
    }
    let mut scope = Scope::new();
    for (name, ty) in &example.args {
        if scope.has(name) {
            return Err(TypeError::new(
                TypeErrorKind::ScopeShadow,
                format!("example argument {name} shadows an existing name"),
            ));
        }
        scope.add(name.clone(), ScopeEntry::Lexical(ty.clone()));
    }

    let mut kinds = example_kinds(&example.value);
    kinds.retain(|kind| !checker.local_classes.contains_key(kind));
    checker.schemas.ensure_loaded(&kinds, false, cancel).await?;
    match &mut example.value {
        ExampleValue::Stream(stream) => {
            checker.check_stream(stream, &mut scope)?;
        }
        ExampleValue::Table(table) => {
            checker.check_table(table, &mut scope)?;
        }
        ExampleValue::Action(action) => checker.check_action(action, &mut scope)?,
        ExampleValue::Program(_) => unreachable!("handled above"),
    }
    Ok(())
}

fn example_kinds(value: &ExampleValue) -> Vec<String> {
    let mut program = Program::default();
    match value {
        ExampleValue::Stream(stream) => program.rules.push(Rule {
            source: Some(RuleSource::Stream(stream.clone())),
            actions: vec![Action::notify()],
        }),
        ExampleValue::Table(table) => program.rules.push(Rule {
            source: Some(RuleSource::Table(table.clone())),
            actions: vec![Action::notify()],
        }),
        ExampleValue::Action(action) => program.rules.push(Rule {
            source: None,
            actions: vec![action.clone()],
        }),
        ExampleValue::Program(_) => {}
    }
    collect_kinds(&program)
}

/// Typechecks a permission rule. The principal predicate filters the
/// requesting contact (`source`); the query and action scopes are checked
/// against their declared signatures, with the query's outputs visible to
/// the action filter.
pub async fn type_check_permission_rule(
    rule: &mut PermissionRule,
    schemas: &SchemaRetriever,
    options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    let mut kinds = Vec::new();
    for side in [&rule.query, &rule.action] {
        if let PermissionFunction::Specified { kind, .. } | PermissionFunction::ClassStar { kind } = side {
            kinds.push(kind.clone());
        }
    }
    collect_filter_kinds(&rule.principal, &mut kinds);
    schemas.ensure_loaded(&kinds, false, cancel).await?;

    let checker = Checker::new(schemas, options, cancel);
    let mut scope = Scope::new();
    scope.add("source", ScopeEntry::Output(Type::entity("tt:contact")));
    checker
        .check_filter(&mut rule.principal, &mut scope)
        .map_err(|e| e.at("principal"))?;

    let mut scope = Scope::new();
    checker
        .check_permission_function(&mut rule.query, FunctionKind::Query, &mut scope)
        .map_err(|e| e.at("query"))?;
    checker
        .check_permission_function(&mut rule.action, FunctionKind::Action, &mut scope)
        .map_err(|e| e.at("action"))?;
    Ok(())
}

/// Typechecks a bookkeeping command.
pub async fn type_check_bookkeeping(
    bookkeeping: &mut Bookkeeping,
    _schemas: &SchemaRetriever,
    _options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    cancel.check()?;
    match bookkeeping {
        Bookkeeping::Special(_) | Bookkeeping::Choice(_) => Ok(()),
        Bookkeeping::Answer(value) => {
            if matches!(value, Value::VarRef(_) | Value::Event(_)) {
                Err(TypeError::new(
                    TypeErrorKind::TypeMismatch,
                    "a bookkeeping answer must stand on its own",
                ))
            } else {
                Ok(())
            }
        }
        // Standalone predicates are resolved against dialogue state by the
        // host; only their shape is validated here.
        Bookkeeping::Predicate(_) => Ok(()),
    }
}

/// Validates a class definition: argument uniqueness, prescribed
/// annotations, extends resolution, and mixin imports.
pub async fn type_check_class(
    class: &ClassDef,
    schemas: &SchemaRetriever,
    _options: &TypeCheckOptions,
    cancel: &CancellationToken,
) -> TypeResult<()> {
    if class.kind.is_empty() {
        return Err(TypeError::new(TypeErrorKind::UnknownKind, "class kind must not be empty"));
    }

    if !class.extends.is_empty() {
        schemas.ensure_loaded(&class.extends, false, cancel).await?;
        for parent in &class.extends {
            schemas
                .cached_schema(parent)
                .map_err(|e| e.at(format!("class @{}", class.kind)))?;
        }
    }

    let mixin_modules: Vec<String> = class
        .imports
        .iter()
        .filter_map(|import| match import {
            ImportStmt::Mixin { module, .. } => Some(module.clone()),
            ImportStmt::Class { .. } => None,
        })
        .collect();
    schemas.ensure_mixins(&mixin_modules, cancel).await?;
    for import in &class.imports {
        if let ImportStmt::Mixin { facets, module, in_params } = import {
            let mixin = schemas.get_mixins(module, cancel).await?;
            check_mixin_import(&class.kind, facets, &mixin, in_params)?;
        }
    }

    for def in class.queries.values().chain(class.actions.values()) {
        check_function_def(&class.kind, def)?;
    }
    Ok(())
}

fn check_mixin_import(
    class_kind: &str,
    facets: &[String],
    mixin: &crate::ast::MixinDef,
    in_params: &[InputParam],
) -> TypeResult<()> {
    for facet in facets {
        if !mixin.facets.contains(facet) {
            return Err(TypeError::new(
                TypeErrorKind::InvalidAnnotation,
                format!("mixin @{} does not provide {facet} (class @{class_kind})", mixin.kind),
            ));
        }
    }
    let mut seen = AHashSet::new();
    for param in in_params {
        let arg = mixin.args.iter().find(|a| a.name == param.name).ok_or_else(|| {
            TypeError::new(
                TypeErrorKind::UnknownArgument,
                format!("mixin @{} has no parameter {}", mixin.kind, param.name),
            )
        })?;
        if !seen.insert(param.name.clone()) {
            return Err(TypeError::new(
                TypeErrorKind::DuplicateDeclaration,
                format!("duplicate mixin parameter {}", param.name),
            ));
        }
        let ty = param.value.get_type();
        if !matches!(param.value, Value::Undefined { .. })
            && !is_assignable(&ty, &arg.ty, &mut TypeScope::new(), &EntitySubtypes::default())
        {
            return Err(TypeError::new(
                TypeErrorKind::TypeMismatch,
                format!("mixin parameter {} expects {}, got {ty}", param.name, arg.ty),
            ));
        }
    }
    for arg in &mixin.args {
        if arg.is_required() && !in_params.iter().any(|p| p.name == arg.name) {
            return Err(TypeError::new(
                TypeErrorKind::TypeMismatch,
                format!("missing required mixin parameter {}", arg.name),
            ));
        }
    }
    Ok(())
}

fn check_function_def(class_kind: &str, def: &FunctionDef) -> TypeResult<()> {
    let mut names = AHashSet::new();
    for arg in &def.args {
        if !names.insert(arg.name.clone()) {
            return Err(TypeError::new(
                TypeErrorKind::DuplicateDeclaration,
                format!("duplicate argument {} in @{class_kind}.{}", arg.name, def.name),
            ));
        }
    }
    check_annotations(class_kind, def)
}

fn check_annotations(class_kind: &str, def: &FunctionDef) -> TypeResult<()> {
    let place = format!("@{class_kind}.{}", def.name);
    for (name, value) in &def.annotations {
        match name.as_str() {
            "poll_interval" => {
                if def.kind == FunctionKind::Action || !def.is_monitorable {
                    return Err(TypeError::new(
                        TypeErrorKind::InvalidAnnotation,
                        format!("poll_interval on {place}, which is not a monitorable query"),
                    ));
                }
                match value {
                    Value::Measure { value, unit } if unit == "ms" && *value >= 0.0 => {}
                    _ => {
                        return Err(TypeError::new(
                            TypeErrorKind::InvalidAnnotation,
                            format!("poll_interval of {place} must be a nonnegative Measure(ms)"),
                        ));
                    }
                }
            }
            "require_filter" => {
                if !matches!(value, Value::Boolean(_)) {
                    return Err(TypeError::new(
                        TypeErrorKind::InvalidAnnotation,
                        format!("require_filter of {place} must be a Boolean"),
                    ));
                }
            }
            "default_projection" => {
                let names = match value {
                    Value::Array(elements) => elements
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => Ok(s.clone()),
                            _ => Err(TypeError::new(
                                TypeErrorKind::InvalidAnnotation,
                                format!("default_projection of {place} must be an Array(String)"),
                            )),
                        })
                        .collect::<TypeResult<Vec<_>>>()?,
                    _ => {
                        return Err(TypeError::new(
                            TypeErrorKind::InvalidAnnotation,
                            format!("default_projection of {place} must be an Array(String)"),
                        ));
                    }
                };
                for projected in names {
                    if def.arg(&projected).is_none() {
                        return Err(TypeError::new(
                            TypeErrorKind::InvalidAnnotation,
                            format!("default_projection of {place} names unknown argument {projected}"),
                        ));
                    }
                }
            }
            "confirm" => match value {
                Value::Enum(symbol) if ["accepted", "confirmed", "unconfirmed"].contains(&symbol.as_str()) => {}
                _ => {
                    return Err(TypeError::new(
                        TypeErrorKind::InvalidAnnotation,
                        format!("confirm of {place} must be one of accepted, confirmed, unconfirmed"),
                    ));
                }
            },
            "url" | "doc" => {
                if !matches!(value, Value::String(_)) {
                    return Err(TypeError::new(
                        TypeErrorKind::InvalidAnnotation,
                        format!("{name} of {place} must be a String"),
                    ));
                }
            }
            // Unknown annotations pass through untouched.
            _ => {}
        }
    }
    Ok(())
}

fn check_principal(principal: &Value) -> TypeResult<()> {
    match principal {
        Value::Entity { kind, .. } if kind == "tt:contact" || kind == "tt:username" => Ok(()),
        Value::Undefined { .. } => Ok(()),
        other => Err(TypeError::new(
            TypeErrorKind::InvalidPrincipal,
            format!("a principal must be a tt:contact or tt:username entity, got {:?}", other.get_type()),
        )),
    }
}

/// Collects every class kind a program references.
fn collect_kinds(program: &Program) -> Vec<String> {
    let local: AHashSet<&str> = program.classes.iter().map(|c| c.kind.as_str()).collect();
    let mut kinds = Vec::new();
    for (_, primitive) in iterate_primitives(program, false) {
        if let Some(kind) = primitive.kind_name()
            && !local.contains(kind)
            && !kinds.iter().any(|k| k == kind)
        {
            kinds.push(kind.to_owned());
        }
    }
    collect_result_ref_kinds(program, &mut kinds);
    kinds
}

fn collect_result_ref_kinds(program: &Program, kinds: &mut Vec<String>) {
    fn table(t: &Table, kinds: &mut Vec<String>) {
        match t {
            Table::ResultRef { kind, .. } => {
                if !kinds.iter().any(|k| k == kind) {
                    kinds.push(kind.clone());
                }
            }
            Table::Filter { table: inner, .. }
            | Table::Projection { table: inner, .. }
            | Table::Alias { table: inner, .. }
            | Table::Aggregation { table: inner, .. }
            | Table::Sort { table: inner, .. }
            | Table::Index { table: inner, .. }
            | Table::Slice { table: inner, .. }
            | Table::Compute { table: inner, .. }
            | Table::Sequence { table: inner, .. }
            | Table::History { table: inner, .. } => table(inner, kinds),
            Table::Join { lhs, rhs, .. } => {
                table(lhs, kinds);
                table(rhs, kinds);
            }
            Table::Window { stream: s, .. } | Table::TimeSeries { stream: s, .. } => stream(s, kinds),
            Table::Invocation(_) | Table::VarRef { .. } => {}
        }
    }
    fn stream(s: &Stream, kinds: &mut Vec<String>) {
        match s {
            Stream::Monitor { table: t, .. } | Stream::Join { table: t, .. } => table(t, kinds),
            Stream::EdgeNew { stream: inner, .. }
            | Stream::EdgeFilter { stream: inner, .. }
            | Stream::Filter { stream: inner, .. }
            | Stream::Projection { stream: inner, .. }
            | Stream::Alias { stream: inner, .. } => stream(inner, kinds),
            Stream::Timer { .. } | Stream::AtTimer { .. } | Stream::VarRef { .. } => {}
        }
    }
    for decl in &program.declarations {
        match &decl.body {
            DeclarationBody::Stream(s) => stream(s, kinds),
            DeclarationBody::Table(t) => table(t, kinds),
            DeclarationBody::Action(_) => {}
        }
    }
    for rule in &program.rules {
        match &rule.source {
            Some(RuleSource::Stream(s)) => stream(s, kinds),
            Some(RuleSource::Table(t)) => table(t, kinds),
            None => {}
        }
    }
    for assignment in &program.assignments {
        table(&assignment.value, kinds);
    }
}

/// Finds the first primitive of a declaration or assignment body that names
/// another principal. Remote primitives are only legal directly inside
/// rules: the factoring pass splits rules, and a primitive hidden behind a
/// reference would be inlined into the local IR untouched.
#[derive(Default)]
struct RemoteSelectorFinder {
    remote_kind: Option<String>,
}

impl<'ast> AstVisitor<'ast> for RemoteSelectorFinder {
    fn visit_invocation(&mut self, _kind: PrimitiveKind, invocation: &'ast Invocation) {
        if !invocation.selector.is_local() && self.remote_kind.is_none() {
            self.remote_kind = Some(invocation.selector.kind.clone());
        }
    }

    fn visit_external(&mut self, selector: &'ast Selector, _channel: &'ast str) {
        if !selector.is_local() && self.remote_kind.is_none() {
            self.remote_kind = Some(selector.kind.clone());
        }
    }
}

fn collect_filter_kinds(filter: &BooleanExpression, kinds: &mut Vec<String>) {
    match filter {
        BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
            for operand in operands {
                collect_filter_kinds(operand, kinds);
            }
        }
        BooleanExpression::Not(inner) => collect_filter_kinds(inner, kinds),
        BooleanExpression::External { selector, filter, .. } => {
            if !kinds.iter().any(|k| *k == selector.kind) {
                kinds.push(selector.kind.clone());
            }
            collect_filter_kinds(filter, kinds);
        }
        _ => {}
    }
}

struct Checker<'a> {
    schemas: &'a SchemaRetriever,
    entities: &'a EntitySubtypes,
    cancel: &'a CancellationToken,
    local_classes: AHashMap<String, Rc<ClassDef>>,
    pool: ClassPool,
}

impl<'a> Checker<'a> {
    fn new(schemas: &'a SchemaRetriever, options: &'a TypeCheckOptions, cancel: &'a CancellationToken) -> Self {
        Self {
            schemas,
            entities: &options.entities,
            cancel,
            local_classes: AHashMap::new(),
            pool: ClassPool::new(),
        }
    }

    fn register_local_class(&mut self, class: ClassDef) {
        let kind = class.kind.clone();
        let id = self.pool.register(class);
        if let Some(registered) = self.pool.get(id) {
            self.local_classes.insert(kind, Rc::new(registered.clone()));
        }
    }

    async fn preload_program(&self, program: &Program) -> TypeResult<()> {
        let kinds = collect_kinds(program);
        self.schemas.ensure_loaded(&kinds, false, self.cancel).await
    }

    fn function_schema(&self, kind: &str, function_type: FunctionKind, name: &str) -> TypeResult<Rc<FunctionDef>> {
        if let Some(class) = self.local_classes.get(kind) {
            return class.function(function_type, name).cloned().ok_or_else(|| {
                TypeError::new(
                    TypeErrorKind::UnknownFunction,
                    format!("class @{kind} has no {function_type} named {name}"),
                )
            });
        }
        self.schemas.cached_function(kind, function_type, name)
    }

    // --- values ---------------------------------------------------------------

    fn value_type(&self, value: &Value, scope: &Scope) -> TypeResult<Type> {
        match value {
            Value::VarRef(name) => scope
                .get(name)
                .and_then(ScopeEntry::value_type)
                .cloned()
                .ok_or_else(|| {
                    TypeError::new(TypeErrorKind::UnknownArgument, format!("variable {name} is not in scope"))
                }),
            Value::Event(_) => {
                if scope.has_event() {
                    Ok(value.get_type())
                } else {
                    Err(TypeError::new(
                        TypeErrorKind::TypeMismatch,
                        "$event is not available before a stream or query",
                    ))
                }
            }
            Value::Computation(expr) => self.scalar_type(expr, scope),
            Value::Array(elements) => {
                let mut elem_ty = Type::Any;
                for (i, element) in elements.iter().enumerate() {
                    let ty = self.value_type(element, scope)?;
                    if i == 0 {
                        elem_ty = ty;
                    }
                }
                Ok(Type::array(elem_ty))
            }
            other => Ok(other.get_type()),
        }
    }

    /// Input parameters accept String↔Entity conversions that filters do
    /// not.
    fn assignable_lenient(&self, from: &Type, to: &Type) -> bool {
        if is_assignable(from, to, &mut TypeScope::new(), self.entities) {
            return true;
        }
        matches!(
            (from, to),
            (Type::String, Type::Entity(_)) | (Type::Entity(_), Type::String)
        )
    }

    /// Checks supplied input parameters against the signature and completes
    /// missing required ones with local `Undefined` holes.
    fn check_input_params(
        &self,
        in_params: &mut Vec<InputParam>,
        schema: &FunctionDef,
        scope: &Scope,
    ) -> TypeResult<()> {
        let mut seen = AHashSet::new();
        for param in in_params.iter() {
            let arg = schema
                .arg(&param.name)
                .filter(|a| a.is_input())
                .ok_or_else(|| {
                    TypeError::new(
                        TypeErrorKind::UnknownArgument,
                        format!("{} has no input parameter {}", schema.name, param.name),
                    )
                })?;
            if !seen.insert(param.name.clone()) {
                return Err(TypeError::new(
                    TypeErrorKind::DuplicateDeclaration,
                    format!("duplicate input parameter {}", param.name),
                ));
            }
            if matches!(param.value, Value::Undefined { .. }) {
                continue;
            }
            let ty = self.value_type(&param.value, scope)?;
            if !self.assignable_lenient(&ty, &arg.ty) {
                return Err(TypeError::new(
                    TypeErrorKind::TypeMismatch,
                    format!("parameter {} expects {}, got {ty}", param.name, arg.ty),
                ));
            }
        }
        for arg in schema.inputs() {
            if arg.is_required() && !seen.contains(&arg.name) {
                in_params.push(InputParam::new(&arg.name, Value::undefined()));
            }
        }
        Ok(())
    }

    fn check_invocation(
        &self,
        invocation: &mut Invocation,
        function_type: FunctionKind,
        scope: &Scope,
    ) -> TypeResult<Rc<FunctionDef>> {
        if let Some(principal) = &invocation.selector.principal {
            check_principal(principal)?;
        }
        let schema = self.function_schema(&invocation.selector.kind, function_type, &invocation.channel)?;
        self.check_input_params(&mut invocation.in_params, &schema, scope)?;
        invocation.schema.set(Rc::clone(&schema));
        Ok(schema)
    }

    // --- filters --------------------------------------------------------------

    fn check_filter(&self, filter: &mut BooleanExpression, scope: &mut Scope) -> TypeResult<()> {
        match filter {
            BooleanExpression::True | BooleanExpression::False => Ok(()),
            BooleanExpression::And(operands) | BooleanExpression::Or(operands) => {
                for operand in operands {
                    self.check_filter(operand, scope)?;
                }
                Ok(())
            }
            BooleanExpression::Not(inner) => self.check_filter(inner, scope),
            BooleanExpression::Atom { name, operator, value } => {
                let field_ty = scope.get(name).and_then(ScopeEntry::value_type).cloned().ok_or_else(|| {
                    TypeError::new(TypeErrorKind::UnknownArgument, format!("no output named {name} to filter on"))
                })?;
                let value_ty = if matches!(value, Value::Undefined { .. }) {
                    // A hole adopts the field type, so any overload with a
                    // matching left side works.
                    field_ty.clone()
                } else {
                    self.value_type(value, scope)?
                };
                resolve_binary(*operator, &field_ty, &value_ty, self.entities)?;
                Ok(())
            }
            BooleanExpression::Compute { lhs, operator, rhs } => {
                let lhs_ty = self.scalar_type(lhs, scope)?;
                let rhs_ty = self.value_type(rhs, scope)?;
                resolve_binary(*operator, &lhs_ty, &rhs_ty, self.entities)?;
                Ok(())
            }
            BooleanExpression::External {
                selector,
                channel,
                in_params,
                filter: inner,
                schema,
            } => {
                if let Some(principal) = &selector.principal {
                    check_principal(principal)?;
                }
                let def = self.function_schema(&selector.kind, FunctionKind::Query, channel)?;
                self.check_input_params(in_params, &def, scope)?;
                scope.push();
                scope.add_all(&def);
                let result = self.check_filter(inner, scope);
                scope.pop();
                result?;
                schema.set(def);
                Ok(())
            }
        }
    }

    fn scalar_type(&self, expr: &ScalarExpression, scope: &Scope) -> TypeResult<Type> {
        match expr {
            ScalarExpression::Primary(value) => self.value_type(value, scope),
            ScalarExpression::Derived { op, operands } => {
                let mut types = Vec::with_capacity(operands.len());
                for operand in operands {
                    types.push(self.scalar_type(operand, scope)?);
                }
                resolve_scalar(*op, &types, self.entities)
            }
            ScalarExpression::Boolean(filter) => {
                let mut branch = scope.clone();
                self.check_filter(&mut filter.clone(), &mut branch)?;
                Ok(Type::Boolean)
            }
        }
    }

    fn check_scalar(&self, expr: &mut ScalarExpression, scope: &mut Scope) -> TypeResult<Type> {
        match expr {
            ScalarExpression::Primary(value) => self.value_type(value, scope),
            ScalarExpression::Derived { op, operands } => {
                let mut types = Vec::with_capacity(operands.len());
                for operand in operands.iter_mut() {
                    types.push(self.check_scalar(operand, scope)?);
                }
                resolve_scalar(*op, &types, self.entities)
            }
            ScalarExpression::Boolean(filter) => {
                self.check_filter(filter, scope)?;
                Ok(Type::Boolean)
            }
        }
    }

    // --- tables ---------------------------------------------------------------

    fn check_table(&self, table: &mut Table, scope: &mut Scope) -> TypeResult<Rc<FunctionDef>> {
        match table {
            Table::Invocation(invocation) => {
                let schema = self.check_invocation(invocation, FunctionKind::Query, scope)?;
                scope.add_all(&schema);
                Ok(schema)
            }
            Table::VarRef { name, in_params, schema } => {
                let def = match scope.get(name) {
                    Some(ScopeEntry::Global(def)) if def.kind == FunctionKind::Query => Rc::clone(def),
                    Some(_) => {
                        return Err(TypeError::new(
                            TypeErrorKind::UnknownFunction,
                            format!("{name} is not a table declaration"),
                        ));
                    }
                    None => {
                        return Err(TypeError::new(
                            TypeErrorKind::UnknownFunction,
                            format!("no declaration named {name}"),
                        ));
                    }
                };
                self.check_input_params(in_params, &def, scope)?;
                scope.add_all(&def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Filter { table, filter, schema } => {
                let inner = self.check_table(table, scope)?;
                self.check_filter(filter, scope)?;
                let def = inner.filtered();
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Projection { table, args, schema } => {
                let inner = self.check_table(table, scope)?;
                let def = self.check_projection(&inner, args, scope)?;
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Alias { table, name, schema } => {
                let inner = self.check_table(table, scope)?;
                for arg in inner.outputs() {
                    scope.add(format!("{name}.{}", arg.name), ScopeEntry::Output(arg.ty.clone()));
                }
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Table::Aggregation {
                table,
                field,
                operator,
                alias,
                schema,
            } => {
                let inner = self.check_table(table, scope)?;
                let def = self.check_aggregation(&inner, field, *operator, alias.as_deref(), scope)?;
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Sort {
                table,
                field,
                direction: _,
                schema,
            } => {
                let inner = self.check_table(table, scope)?;
                let field_ty = inner.outputs().find(|a| a.name == *field).map(|a| &a.ty).ok_or_else(|| {
                    TypeError::new(TypeErrorKind::UnknownArgument, format!("no output named {field} to sort on"))
                })?;
                if !field_ty.is_comparable() {
                    return Err(TypeError::new(
                        TypeErrorKind::TypeMismatch,
                        format!("cannot sort on {field} of type {field_ty}"),
                    ));
                }
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Table::Index { table, indices, schema } => {
                let inner = self.check_table(table, scope)?;
                let mut is_list = indices.len() > 1;
                if indices.len() == 1 {
                    let ty = self.value_type(&indices[0], scope)?;
                    let scalar = is_assignable(&ty, &Type::Number, &mut TypeScope::new(), self.entities);
                    let array =
                        is_assignable(&ty, &Type::array(Type::Number), &mut TypeScope::new(), self.entities);
                    if !scalar && !array {
                        return Err(TypeError::new(
                            TypeErrorKind::TypeMismatch,
                            format!("an index must be a Number or Array(Number), got {ty}"),
                        ));
                    }
                    // A single array of indices still selects several rows.
                    is_list = array && !scalar;
                } else {
                    for index in indices.iter() {
                        let ty = self.value_type(index, scope)?;
                        if !is_assignable(&ty, &Type::Number, &mut TypeScope::new(), self.entities) {
                            return Err(TypeError::new(
                                TypeErrorKind::TypeMismatch,
                                format!("an index must be a Number, got {ty}"),
                            ));
                        }
                    }
                }
                let mut def = (*inner).clone();
                def.is_list = is_list;
                def.parent = None;
                let def = Rc::new(def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Slice { table, base, limit, schema } => {
                let inner = self.check_table(table, scope)?;
                for (what, value) in [("base", &*base), ("limit", &*limit)] {
                    let ty = self.value_type(value, scope)?;
                    if !is_assignable(&ty, &Type::Number, &mut TypeScope::new(), self.entities) {
                        return Err(TypeError::new(
                            TypeErrorKind::TypeMismatch,
                            format!("slice {what} must be a Number, got {ty}"),
                        ));
                    }
                }
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Table::Compute {
                table,
                expression,
                alias,
                schema,
            } => {
                let inner = self.check_table(table, scope)?;
                let ty = self.check_scalar(expression, scope)?;
                let name = alias.clone().unwrap_or_else(|| compute_name(expression));
                let def = Rc::new(inner.computed(&name, ty.clone()));
                scope.add(name, ScopeEntry::Output(ty));
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Join {
                lhs,
                rhs,
                in_params,
                schema,
            } => {
                let mut left_scope = scope.clone();
                let left = self.check_table(lhs, &mut left_scope)?;
                let mut right_scope = scope.clone();
                right_scope.merge(&left_scope);
                let right = self.check_table(rhs, &mut right_scope)?;
                // Join parameters flow left-to-right: values reference the
                // left side, targets are inputs of the right side.
                self.check_join_params(in_params, &right, &left_scope)?;
                let def = Rc::new(FunctionDef::joined(&left, &right, in_params));
                scope.add_all(&def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::Window { base, delta, stream, schema } => {
                self.check_memory_bounds(base, delta, &Type::Number, &Type::Number, scope)?;
                let inner = self.check_stream(stream, scope)?;
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Table::TimeSeries { base, delta, stream, schema } => {
                self.check_memory_bounds(base, delta, &Type::Date, &Type::measure("ms"), scope)?;
                let inner = self.check_stream(stream, scope)?;
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Table::Sequence { base, delta, table: inner, schema } => {
                self.check_memory_bounds(base, delta, &Type::Number, &Type::Number, scope)?;
                let def = self.check_table(inner, scope)?;
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::History { base, delta, table: inner, schema } => {
                self.check_memory_bounds(base, delta, &Type::Date, &Type::measure("ms"), scope)?;
                let def = self.check_table(inner, scope)?;
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Table::ResultRef { kind, channel, index, schema } => {
                let def = self.function_schema(kind, FunctionKind::Query, channel)?;
                let ty = self.value_type(index, scope)?;
                if !is_assignable(&ty, &Type::Number, &mut TypeScope::new(), self.entities) {
                    return Err(TypeError::new(
                        TypeErrorKind::TypeMismatch,
                        format!("a result index must be a Number, got {ty}"),
                    ));
                }
                scope.add_all(&def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
        }
    }

    fn check_memory_bounds(
        &self,
        base: &Value,
        delta: &Value,
        base_ty: &Type,
        delta_ty: &Type,
        scope: &Scope,
    ) -> TypeResult<()> {
        for (value, want) in [(base, base_ty), (delta, delta_ty)] {
            if matches!(value, Value::Undefined { .. }) {
                continue;
            }
            let ty = self.value_type(value, scope)?;
            if !is_assignable(&ty, want, &mut TypeScope::new(), self.entities) {
                return Err(TypeError::new(
                    TypeErrorKind::TypeMismatch,
                    format!("expected {want}, got {ty}"),
                ));
            }
        }
        Ok(())
    }

    fn check_join_params(
        &self,
        in_params: &[InputParam],
        target: &FunctionDef,
        left_scope: &Scope,
    ) -> TypeResult<()> {
        let mut seen = AHashSet::new();
        for param in in_params {
            let arg = target.arg(&param.name).filter(|a| a.is_input()).ok_or_else(|| {
                TypeError::new(
                    TypeErrorKind::UnknownArgument,
                    format!("{} has no input parameter {}", target.name, param.name),
                )
            })?;
            if !seen.insert(param.name.clone()) {
                return Err(TypeError::new(
                    TypeErrorKind::DuplicateDeclaration,
                    format!("duplicate join parameter {}", param.name),
                ));
            }
            if matches!(param.value, Value::Undefined { .. }) {
                continue;
            }
            let ty = self.value_type(&param.value, left_scope)?;
            if !self.assignable_lenient(&ty, &arg.ty) {
                return Err(TypeError::new(
                    TypeErrorKind::TypeMismatch,
                    format!("join parameter {} expects {}, got {ty}", param.name, arg.ty),
                ));
            }
        }
        Ok(())
    }

    fn check_projection(&self, inner: &Rc<FunctionDef>, args: &[String], scope: &mut Scope) -> TypeResult<Rc<FunctionDef>> {
        if args.is_empty() {
            return Err(TypeError::new(
                TypeErrorKind::RequiresProjection,
                "a projection must keep at least one output",
            ));
        }
        let mut seen = AHashSet::new();
        for arg in args {
            if inner.outputs().all(|a| &a.name != arg) {
                return Err(TypeError::new(
                    TypeErrorKind::UnknownArgument,
                    format!("no output named {arg} to project on"),
                ));
            }
            if !seen.insert(arg.clone()) {
                return Err(TypeError::new(
                    TypeErrorKind::DuplicateDeclaration,
                    format!("duplicate projection argument {arg}"),
                ));
            }
        }
        for out in inner.out_names() {
            if !args.contains(&out) {
                scope.remove(&out);
            }
        }
        Ok(Rc::new(inner.projected(args)))
    }

    fn check_aggregation(
        &self,
        inner: &Rc<FunctionDef>,
        field: &str,
        operator: AggregationOp,
        alias: Option<&str>,
        scope: &mut Scope,
    ) -> TypeResult<Rc<FunctionDef>> {
        let (out_name, out_ty) = if field == "*" {
            if operator != AggregationOp::Count {
                return Err(TypeError::new(
                    TypeErrorKind::InvalidOperator,
                    format!("aggregation {operator} requires a field; only count accepts *"),
                ));
            }
            (alias.unwrap_or("count").to_owned(), Type::Number)
        } else {
            let field_ty = inner
                .outputs()
                .find(|a| a.name == field)
                .map(|a| a.ty.clone())
                .ok_or_else(|| {
                    TypeError::new(
                        TypeErrorKind::UnknownArgument,
                        format!("no output named {field} to aggregate"),
                    )
                })?;
            let scalar_op = match operator {
                AggregationOp::Min => ScalarOp::Min,
                AggregationOp::Max => ScalarOp::Max,
                AggregationOp::Sum => ScalarOp::Sum,
                AggregationOp::Avg => ScalarOp::Avg,
                AggregationOp::Count => ScalarOp::Count,
            };
            let out_ty = resolve_scalar(scalar_op, &[Type::array(field_ty)], self.entities)?;
            (alias.unwrap_or(field).to_owned(), out_ty)
        };
        for out in inner.out_names() {
            scope.remove(&out);
        }
        scope.add(out_name.clone(), ScopeEntry::Output(out_ty.clone()));
        Ok(Rc::new(inner.aggregated(&out_name, out_ty)))
    }

    // --- streams --------------------------------------------------------------

    fn check_stream(&self, stream: &mut Stream, scope: &mut Scope) -> TypeResult<Rc<FunctionDef>> {
        match stream {
            Stream::Timer { base, interval, schema } => {
                let base_ty = self.value_type(base, scope)?;
                if !is_assignable(&base_ty, &Type::Date, &mut TypeScope::new(), self.entities) {
                    return Err(TypeError::new(
                        TypeErrorKind::TypeMismatch,
                        format!("a timer base must be a Date, got {base_ty}"),
                    ));
                }
                let interval_ty = self.value_type(interval, scope)?;
                if !is_assignable(&interval_ty, &Type::measure("ms"), &mut TypeScope::new(), self.entities) {
                    return Err(TypeError::new(
                        TypeErrorKind::TypeMismatch,
                        format!("a timer interval must be a Measure(ms), got {interval_ty}"),
                    ));
                }
                let def = builtin::timer();
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Stream::AtTimer { times, expiration, schema } => {
                for time in times.iter() {
                    let ty = self.value_type(time, scope)?;
                    if !is_assignable(&ty, &Type::Time, &mut TypeScope::new(), self.entities) {
                        return Err(TypeError::new(
                            TypeErrorKind::TypeMismatch,
                            format!("attimer times must be Times, got {ty}"),
                        ));
                    }
                }
                if let Some(expiration) = expiration {
                    let ty = self.value_type(expiration, scope)?;
                    if !is_assignable(&ty, &Type::Date, &mut TypeScope::new(), self.entities) {
                        return Err(TypeError::new(
                            TypeErrorKind::TypeMismatch,
                            format!("an attimer expiration must be a Date, got {ty}"),
                        ));
                    }
                }
                let def = builtin::at_timer();
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Stream::Monitor { table, args, schema } => {
                let inner = self.check_table(table, scope)?;
                if !inner.is_monitorable {
                    return Err(TypeError::new(
                        TypeErrorKind::NotMonitorable,
                        format!("{} cannot be monitored", inner.name),
                    ));
                }
                if let Some(args) = args {
                    for arg in args.iter() {
                        if inner.outputs().all(|a| &a.name != arg) {
                            return Err(TypeError::new(
                                TypeErrorKind::UnknownArgument,
                                format!("no output named {arg} to monitor on"),
                            ));
                        }
                    }
                }
                let mut def = (*inner).clone();
                def.kind = FunctionKind::Stream;
                def.parent = None;
                let def = Rc::new(def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Stream::EdgeNew { stream, schema } => {
                let inner = self.check_stream(stream, scope)?;
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Stream::EdgeFilter { stream, filter, schema } => {
                if matches!(**stream, Stream::Timer { .. } | Stream::AtTimer { .. }) {
                    return Err(TypeError::new(
                        TypeErrorKind::InvalidOperator,
                        "edge filters are not supported on timers",
                    ));
                }
                let inner = self.check_stream(stream, scope)?;
                self.check_filter(filter, scope)?;
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Stream::Filter { stream, filter, schema } => {
                let inner = self.check_stream(stream, scope)?;
                self.check_filter(filter, scope)?;
                let def = inner.filtered();
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Stream::Projection { stream, args, schema } => {
                let inner = self.check_stream(stream, scope)?;
                let def = self.check_projection(&inner, args, scope)?;
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Stream::Alias { stream, name, schema } => {
                let inner = self.check_stream(stream, scope)?;
                for arg in inner.outputs() {
                    scope.add(format!("{name}.{}", arg.name), ScopeEntry::Output(arg.ty.clone()));
                }
                schema.set(Rc::clone(&inner));
                Ok(inner)
            }
            Stream::Join {
                stream,
                table,
                in_params,
                schema,
            } => {
                let mut left_scope = scope.clone();
                let left = self.check_stream(stream, &mut left_scope)?;
                let mut right_scope = scope.clone();
                right_scope.merge(&left_scope);
                let right = self.check_table(table, &mut right_scope)?;
                self.check_join_params(in_params, &right, &left_scope)?;
                let def = Rc::new(FunctionDef::joined(&left, &right, in_params));
                scope.add_all(&def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
            Stream::VarRef { name, in_params, schema } => {
                let def = match scope.get(name) {
                    Some(ScopeEntry::Global(def)) if def.kind == FunctionKind::Stream => Rc::clone(def),
                    Some(_) => {
                        return Err(TypeError::new(
                            TypeErrorKind::UnknownFunction,
                            format!("{name} is not a stream declaration"),
                        ));
                    }
                    None => {
                        return Err(TypeError::new(
                            TypeErrorKind::UnknownFunction,
                            format!("no declaration named {name}"),
                        ));
                    }
                };
                self.check_input_params(in_params, &def, scope)?;
                scope.add_all(&def);
                schema.set(Rc::clone(&def));
                Ok(def)
            }
        }
    }

    // --- actions, rules, declarations -----------------------------------------

    fn check_action(&self, action: &mut Action, scope: &mut Scope) -> TypeResult<()> {
        match action {
            Action::Invocation(invocation) => {
                self.check_invocation(invocation, FunctionKind::Action, scope)?;
                Ok(())
            }
            Action::Notify { schema } => {
                schema.set(builtin::notify());
                Ok(())
            }
        }
    }

    fn check_rule(&self, rule: &mut Rule, scope: &mut Scope) -> TypeResult<()> {
        if rule.actions.is_empty() {
            return Err(TypeError::new(
                TypeErrorKind::TypeMismatch,
                "a rule must have at least one action",
            ));
        }
        let source_schema = match &mut rule.source {
            Some(RuleSource::Stream(stream)) => Some(self.check_stream(stream, scope).map_err(|e| e.at("stream"))?),
            Some(RuleSource::Table(table)) => Some(self.check_table(table, scope).map_err(|e| e.at("table"))?),
            None => None,
        };
        if let Some(schema) = &source_schema {
            if schema.require_filter() {
                return Err(TypeError::new(
                    TypeErrorKind::RequiresFilter,
                    format!("{} must be filtered before use", schema.name),
                ));
            }
            scope.set_event(true);
        }
        for (index, action) in rule.actions.iter_mut().enumerate() {
            self.check_action(action, scope).map_err(|e| e.at(format!("action {index}")))?;
        }
        Ok(())
    }

    fn check_declaration(&self, decl: &mut Declaration, scope: &mut Scope) -> TypeResult<()> {
        if scope.has(&decl.name) {
            return Err(TypeError::new(
                TypeErrorKind::DuplicateDeclaration,
                format!("{} is already declared", decl.name),
            ));
        }
        scope.push();
        for (name, ty) in &decl.args {
            if scope.has(name) {
                scope.pop();
                return Err(TypeError::new(
                    TypeErrorKind::ScopeShadow,
                    format!("lambda argument {name} shadows an existing name"),
                ));
            }
            scope.add(name.clone(), ScopeEntry::Lexical(ty.clone()));
        }
        let body_schema = match &mut decl.body {
            DeclarationBody::Stream(stream) => self.check_stream(stream, scope),
            DeclarationBody::Table(table) => self.check_table(table, scope),
            DeclarationBody::Action(action) => {
                let result = self.check_action(action, scope);
                result.map(|()| action.schema().get().cloned().unwrap_or_else(builtin::notify))
            }
        };
        scope.pop();
        let body_schema = body_schema?;

        let mut finder = RemoteSelectorFinder::default();
        visit::walk_declaration(&mut finder, decl);
        if let Some(kind) = finder.remote_kind {
            return Err(TypeError::new(
                TypeErrorKind::InvalidPrincipal,
                format!(
                    "@{kind} targets another principal inside declaration {}; only rules may name remote principals",
                    decl.name
                ),
            ));
        }

        // The declaration's own signature: the lambda arguments become
        // required inputs ahead of the body's arguments.
        let mut args: Vec<ArgumentDef> = decl
            .args
            .iter()
            .map(|(name, ty)| ArgumentDef::new(ArgDirection::InReq, name, ty.clone()))
            .collect();
        for arg in &body_schema.args {
            if args.iter().all(|a| a.name != arg.name) {
                args.push(arg.clone());
            }
        }
        let mut def = FunctionDef::new(body_schema.kind, &decl.name, args)
            .with_flags(body_schema.is_list, body_schema.is_monitorable);
        def.annotations = body_schema.annotations.clone();
        let def = Rc::new(def);
        decl.schema.set(Rc::clone(&def));
        scope.add_global(decl.name.clone(), def);
        Ok(())
    }

    fn check_assignment(&self, assignment: &mut Assignment, scope: &mut Scope) -> TypeResult<()> {
        if scope.has(&assignment.name) {
            return Err(TypeError::new(
                TypeErrorKind::DuplicateDeclaration,
                format!("{} is already declared", assignment.name),
            ));
        }
        let mut branch = scope.clone();
        let table_schema = self.check_table(&mut assignment.value, &mut branch)?;

        let mut finder = RemoteSelectorFinder::default();
        visit::walk_table(&mut finder, &assignment.value);
        if let Some(kind) = finder.remote_kind {
            return Err(TypeError::new(
                TypeErrorKind::InvalidPrincipal,
                format!(
                    "@{kind} targets another principal inside assignment {}; only rules may name remote principals",
                    assignment.name
                ),
            ));
        }

        // The materialized result behaves like a non-monitorable list query
        // with no inputs left to fill.
        let mut def = FunctionDef::new(
            FunctionKind::Query,
            &assignment.name,
            table_schema.outputs().cloned().collect(),
        )
        .with_flags(true, false);
        def.parent = None;
        let def = Rc::new(def);
        assignment.schema.set(Rc::clone(&def));
        scope.add_global(assignment.name.clone(), def);
        Ok(())
    }

    fn check_permission_function(
        &self,
        function: &mut PermissionFunction,
        function_type: FunctionKind,
        scope: &mut Scope,
    ) -> TypeResult<()> {
        match function {
            PermissionFunction::Builtin | PermissionFunction::Star => Ok(()),
            PermissionFunction::ClassStar { kind } => {
                self.schemas.cached_schema(kind)?;
                Ok(())
            }
            PermissionFunction::Specified {
                kind,
                channel,
                filter,
                schema,
            } => {
                let def = self.function_schema(kind, function_type, channel)?;
                // Permission filters may constrain inputs and outputs alike.
                for arg in &def.args {
                    scope.add(arg.name.clone(), ScopeEntry::Output(arg.ty.clone()));
                }
                self.check_filter(filter, scope)?;
                schema.set(def);
                Ok(())
            }
        }
    }
}

/// The output name of an unaliased computed column. Word-named operators
/// lend their name; symbolic ones fall back to `result`.
pub(crate) fn compute_name(expr: &ScalarExpression) -> String {
    match expr {
        ScalarExpression::Primary(Value::VarRef(name)) => name.clone(),
        ScalarExpression::Derived { op, .. } => match op {
            ScalarOp::Distance | ScalarOp::Max | ScalarOp::Min | ScalarOp::Sum | ScalarOp::Avg | ScalarOp::Count => {
                op.to_string()
            }
            _ => "result".to_owned(),
        },
        _ => "result".to_owned(),
    }
}
