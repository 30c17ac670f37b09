//! Semantic analyzer acceptance and rejection tests against the fixture
//! classes.

mod common;

use pretty_assertions::assert_eq;

use common::{check, invocation, query, retriever};
use thingtalk::ast::{
    Action, BinaryOp, BooleanExpression, Example, ExampleKind, ExampleValue, InputParam, PermissionFunction,
    PermissionRule, Program, Rule, RuleSource, Stream, Table,
};
use thingtalk::ast::{Assignment, Bookkeeping, Declaration, DeclarationBody, Invocation, SchemaSlot, Selector};
use thingtalk::{
    type_check_bookkeeping, type_check_example, type_check_permission_rule, type_check_program, CancellationToken,
    EventField, Type, TypeCheckOptions, TypeErrorKind, Value,
};

fn notify_rule_now(table: Table) -> Program {
    Program::new(vec![Rule::now(table, vec![Action::notify()])])
}

#[test]
fn schemas_are_filled_and_required_inputs_become_holes() {
    let mut program = Program::new(vec![Rule::now(
        query("com.xkcd", "get_comic", vec![]),
        vec![Action::Invocation(invocation("com.twitter", "post", vec![]))],
    )]);
    check(&mut program).expect("program should typecheck");

    let Some(RuleSource::Table(table)) = &program.rules[0].source else {
        panic!("rule source should still be a table");
    };
    assert!(table.schema().is_resolved(), "every primitive needs a schema after analysis");

    let Action::Invocation(action) = &program.rules[0].actions[0] else {
        panic!("action should still be an invocation");
    };
    assert!(action.schema.is_resolved());
    assert_eq!(
        action.in_param("status"),
        Some(&Value::undefined()),
        "missing required inputs are completed with local holes"
    );
}

#[test]
fn typechecking_is_idempotent() {
    let mut program = Program::new(vec![Rule::now(
        Table::filtered(
            query("com.xkcd", "get_comic", vec![]),
            BooleanExpression::atom("number", BinaryOp::Ge, Value::Number(1234.0)),
        ),
        vec![Action::Invocation(invocation("com.twitter", "post", vec![]))],
    )]);
    check(&mut program).expect("first pass");
    let after_first = program.clone();
    check(&mut program).expect("second pass");
    assert_eq!(program, after_first, "a second pass must not change the program");
}

#[test]
fn unknown_kind_and_per_kind_failures() {
    let mut program = notify_rule_now(query("org.nowhere", "nothing", vec![]));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::UnknownKind);

    let mut program = notify_rule_now(query("org.failing", "anything", vec![]));
    let err = check(&mut program).unwrap_err();
    assert_eq!(err.kind, TypeErrorKind::UnknownKind);
    assert!(err.message.contains("500"), "the per-kind error is preserved: {err}");
}

#[test]
fn unknown_function_and_arguments() {
    let mut program = notify_rule_now(query("com.xkcd", "get_strip", vec![]));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::UnknownFunction);

    let mut program = notify_rule_now(query("com.xkcd", "get_comic", vec![("page", Value::Number(1.0))]));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::UnknownArgument);

    let mut program = notify_rule_now(query(
        "com.xkcd",
        "get_comic",
        vec![("number", Value::Number(1.0)), ("number", Value::Number(2.0))],
    ));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::DuplicateDeclaration);
}

#[test]
fn input_parameters_are_lenient_filters_are_strict() {
    // String value into an Entity-typed action parameter: accepted.
    let mut program = Program::new(vec![Rule::now(
        query("com.xkcd", "get_comic", vec![]),
        vec![Action::Invocation(invocation(
            "com.twitter",
            "post",
            vec![("status", Value::entity("hello", "tt:username"))],
        ))],
    )]);
    check(&mut program).expect("entity into string parameter is a lenient conversion");

    // The same conversion inside a filter: rejected.
    let mut program = notify_rule_now(Table::filtered(
        query("com.twitter", "home_timeline", vec![]),
        BooleanExpression::atom("author", BinaryOp::Eq, Value::string("bob")),
    ));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::InvalidOverload);
}

#[test]
fn filters_resolve_overloads() {
    let mut program = notify_rule_now(Table::filtered(
        query("com.xkcd", "get_comic", vec![]),
        BooleanExpression::atom("number", BinaryOp::Ge, Value::Number(1234.0)),
    ));
    check(&mut program).expect("number >= number resolves");

    let mut program = notify_rule_now(Table::filtered(
        query("com.xkcd", "get_comic", vec![]),
        BooleanExpression::atom("title", BinaryOp::Ge, Value::Boolean(true)),
    ));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::InvalidOverload);

    let mut program = notify_rule_now(Table::filtered(
        query("com.xkcd", "get_comic", vec![]),
        BooleanExpression::atom("volume", BinaryOp::Eq, Value::Number(1.0)),
    ));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::UnknownArgument);
}

#[test]
fn monitor_requires_a_monitorable_query() {
    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(query(
            "com.yandex.translate",
            "translate",
            vec![
                ("target_language", Value::entity("it", "tt:iso_lang_code")),
                ("text", Value::string("hi")),
            ],
        )),
        vec![Action::notify()],
    )]);
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::NotMonitorable);

    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(query("com.xkcd", "get_comic", vec![])),
        vec![Action::notify()],
    )]);
    check(&mut program).expect("xkcd is monitorable");
}

#[test]
fn require_filter_blocks_unfiltered_use() {
    let mut program = notify_rule_now(query("org.example.restricted", "search", vec![]));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::RequiresFilter);

    let mut program = notify_rule_now(Table::filtered(
        query("org.example.restricted", "search", vec![]),
        BooleanExpression::atom("title", BinaryOp::Like, Value::string("cats")),
    ));
    check(&mut program).expect("a filter satisfies require_filter");
}

#[test]
fn projections_must_keep_a_declared_output() {
    let mut program = notify_rule_now(Table::projection(query("com.xkcd", "get_comic", vec![]), vec![]));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::RequiresProjection);

    let mut program = notify_rule_now(Table::projection(
        query("com.xkcd", "get_comic", vec![]),
        vec!["volume".to_owned()],
    ));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::UnknownArgument);

    let mut program = notify_rule_now(Table::projection(
        query("com.xkcd", "get_comic", vec![]),
        vec!["title".to_owned()],
    ));
    check(&mut program).expect("projecting onto title is fine");
    let Some(RuleSource::Table(table)) = &program.rules[0].source else {
        panic!("source survives");
    };
    let schema = table.schema().get().expect("projection has a derived schema");
    assert_eq!(schema.out_names(), vec!["title".to_owned()]);
}

#[test]
fn join_computes_the_merged_signature() {
    let mut program = notify_rule_now(Table::join(
        query("com.xkcd", "get_comic", vec![]),
        query(
            "com.yandex.translate",
            "translate",
            vec![("target_language", Value::entity("it", "tt:iso_lang_code"))],
        ),
        vec![InputParam::new("text", Value::VarRef("title".to_owned()))],
    ));
    check(&mut program).expect("the join should typecheck");

    let Some(RuleSource::Table(table)) = &program.rules[0].source else {
        panic!("source survives");
    };
    let schema = table.schema().get().expect("join has a derived schema");
    assert!(schema.arg("title").is_some());
    assert!(schema.arg("translated_text").is_some());
    assert!(schema.arg("text").is_none(), "inputs provided on the join disappear");
    assert!(!schema.is_monitorable, "monitorability is conjunctive across a join");
}

#[test]
fn event_is_only_available_after_a_source() {
    let mut program = Program::new(vec![Rule::immediate(vec![Action::Invocation(invocation(
        "com.twitter",
        "post",
        vec![("status", Value::Event(None))],
    ))])]);
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::TypeMismatch);

    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(query("com.xkcd", "get_comic", vec![])),
        vec![Action::Invocation(invocation(
            "com.twitter",
            "post",
            vec![("status", Value::Event(Some(EventField::ProgramId)))],
        ))],
    )]);
    check(&mut program).expect("$event resolves after a stream");
}

#[test]
fn principals_must_be_contacts() {
    let mut program = Program::new(vec![Rule::now(
        query("com.xkcd", "get_comic", vec![]),
        vec![Action::notify()],
    )]);
    program.principal = Some(Value::Number(7.0));
    assert_eq!(check(&mut program).unwrap_err().kind, TypeErrorKind::InvalidPrincipal);

    program.principal = Some(Value::entity("mock-account:bob", "tt:contact"));
    check(&mut program).expect("a tt:contact principal is fine");
}

#[test]
fn declarations_and_assignments_must_stay_local() {
    let bob = Value::entity("mock-account:bob", "tt:contact");

    let mut program = Program::default();
    program.declarations.push(Declaration {
        name: "comics".to_owned(),
        args: indexmap::IndexMap::new(),
        body: DeclarationBody::Table(Table::Invocation(Invocation::new(
            Selector::with_principal("com.xkcd", bob.clone()),
            "get_comic",
            vec![],
        ))),
        schema: SchemaSlot::empty(),
    });
    let err = check(&mut program).unwrap_err();
    assert_eq!(
        err.kind,
        TypeErrorKind::InvalidPrincipal,
        "a remote primitive behind a declaration would escape factoring"
    );

    let mut program = Program::default();
    program.assignments.push(Assignment {
        name: "latest".to_owned(),
        value: Table::Invocation(Invocation::new(
            Selector::with_principal("com.xkcd", bob),
            "get_comic",
            vec![],
        )),
        schema: SchemaSlot::empty(),
    });
    let err = check(&mut program).unwrap_err();
    assert_eq!(err.kind, TypeErrorKind::InvalidPrincipal);
}

#[test]
fn cancellation_surfaces_as_a_type_error() {
    let mut program = notify_rule_now(query("com.xkcd", "get_comic", vec![]));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = futures::executor::block_on(type_check_program(
        &mut program,
        &retriever(),
        &TypeCheckOptions::default(),
        &cancel,
    ))
    .unwrap_err();
    assert_eq!(err.kind, TypeErrorKind::Cancelled);
}

#[test]
fn permission_rules_check_both_sides() {
    let mut rule = PermissionRule {
        principal: BooleanExpression::atom(
            "source",
            BinaryOp::Eq,
            Value::entity("mock-account:bob", "tt:contact"),
        ),
        query: PermissionFunction::Specified {
            kind: "com.xkcd".to_owned(),
            channel: "get_comic".to_owned(),
            filter: BooleanExpression::atom("number", BinaryOp::Le, Value::Number(2000.0)),
            schema: thingtalk::ast::SchemaSlot::empty(),
        },
        action: PermissionFunction::Builtin,
    };
    futures::executor::block_on(type_check_permission_rule(
        &mut rule,
        &retriever(),
        &TypeCheckOptions::default(),
        &CancellationToken::new(),
    ))
    .expect("the permission rule should typecheck");

    let mut rule = PermissionRule {
        principal: BooleanExpression::atom("source", BinaryOp::Eq, Value::Number(1.0)),
        query: PermissionFunction::Star,
        action: PermissionFunction::Star,
    };
    let err = futures::executor::block_on(type_check_permission_rule(
        &mut rule,
        &retriever(),
        &TypeCheckOptions::default(),
        &CancellationToken::new(),
    ))
    .unwrap_err();
    assert_eq!(err.kind, TypeErrorKind::InvalidOverload);
}

#[test]
fn examples_must_match_their_declared_kind() {
    let mut example = Example {
        id: 1,
        kind: ExampleKind::Stream,
        args: indexmap::IndexMap::new(),
        value: ExampleValue::Table(query("com.xkcd", "get_comic", vec![])),
        utterances: vec!["the latest xkcd".to_owned()],
        preprocessed: vec![],
        annotations: indexmap::IndexMap::new(),
    };
    let err = futures::executor::block_on(type_check_example(
        &mut example,
        &retriever(),
        &TypeCheckOptions::default(),
        &CancellationToken::new(),
    ))
    .unwrap_err();
    assert_eq!(err.kind, TypeErrorKind::TypeMismatch);

    example.kind = ExampleKind::Query;
    futures::executor::block_on(type_check_example(
        &mut example,
        &retriever(),
        &TypeCheckOptions::default(),
        &CancellationToken::new(),
    ))
    .expect("a query example with a table body is fine");
}

#[test]
fn bookkeeping_answers_must_stand_alone() {
    let run = |mut b: Bookkeeping| {
        futures::executor::block_on(type_check_bookkeeping(
            &mut b,
            &retriever(),
            &TypeCheckOptions::default(),
            &CancellationToken::new(),
        ))
    };
    run(Bookkeeping::Special("nevermind".to_owned())).expect("specials are always fine");
    run(Bookkeeping::Choice(2)).expect("choices are always fine");
    run(Bookkeeping::Answer(Value::Number(42.0))).expect("a literal answer is fine");
    let err = run(Bookkeeping::Answer(Value::VarRef("title".to_owned()))).unwrap_err();
    assert_eq!(err.kind, TypeErrorKind::TypeMismatch);
}

#[test]
fn lambda_arguments_resolve_inside_example_bodies() {
    let mut args = indexmap::IndexMap::new();
    args.insert("p_number".to_owned(), Type::Number);
    let mut example = Example {
        id: 2,
        kind: ExampleKind::Query,
        args,
        value: ExampleValue::Table(query(
            "com.xkcd",
            "get_comic",
            vec![("number", Value::VarRef("p_number".to_owned()))],
        )),
        utterances: vec!["xkcd number ${p_number}".to_owned()],
        preprocessed: vec![],
        annotations: indexmap::IndexMap::new(),
    };
    futures::executor::block_on(type_check_example(
        &mut example,
        &retriever(),
        &TypeCheckOptions::default(),
        &CancellationToken::new(),
    ))
    .expect("the lambda argument should be visible in the body");
}
