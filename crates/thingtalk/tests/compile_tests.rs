//! End-to-end scenarios: typecheck, compile, and drive the IR through the
//! miniature test runtime.

mod common;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{check, invocation, query, record, TestRuntime};
use thingtalk::ast::{
    Action, AggregationOp, BinaryOp, BooleanExpression, InputParam, Program, Rule, SchemaSlot, Stream, Table,
};
use thingtalk::{compile_program, CompileErrorKind, DateValue, Value};

fn compile(program: &mut Program) -> thingtalk::ir::CompiledProgram {
    check(program).expect("program should typecheck");
    compile_program(program).expect("program should compile")
}

#[test]
fn one_shot_query_notifies_once() {
    // now => @com.xkcd.get_comic() => notify;
    let mut program = Program::new(vec![Rule::now(
        query("com.xkcd", "get_comic", vec![]),
        vec![Action::notify()],
    )]);
    let compiled = compile(&mut program);

    let mut runtime = TestRuntime::new().query_result(
        "com.xkcd:get_comic",
        vec![record(vec![
            ("number", json!(1234.0)),
            ("title", json!("Douglas Engelbart (1925-2013)")),
            ("link", json!("https://xkcd.com/1234/")),
            ("picture_url", json!("https://imgs.xkcd.com/comics/engelbart.png")),
        ])],
    );
    runtime.run(&compiled);

    assert_eq!(runtime.outputs.len(), 1, "exactly one notification");
    let (output_type, record) = &runtime.outputs[0];
    assert_eq!(output_type, "com.xkcd:get_comic");
    assert_eq!(record["title"], json!("Douglas Engelbart (1925-2013)"));
    assert_eq!(record["number"], json!(1234.0));
}

#[test]
fn filtered_query_drives_actions_in_order() {
    // now => @com.xkcd.get_comic(), number >= 1234 => @com.twitter.post(status=title);
    let mut program = Program::new(vec![Rule::now(
        Table::filtered(
            query("com.xkcd", "get_comic", vec![]),
            BooleanExpression::atom("number", BinaryOp::Ge, Value::Number(1234.0)),
        ),
        vec![Action::Invocation(invocation(
            "com.twitter",
            "post",
            vec![("status", Value::VarRef("title".to_owned()))],
        ))],
    )]);
    let compiled = compile(&mut program);

    let mut runtime = TestRuntime::new().query_result(
        "com.xkcd:get_comic",
        vec![
            record(vec![("number", json!(1234.0)), ("title", json!("Douglas Engelbart (1925-2013)"))]),
            record(vec![("number", json!(1235.0)), ("title", json!("Settled"))]),
        ],
    );
    runtime.run(&compiled);

    assert_eq!(
        runtime.actions,
        vec![
            (
                "com.twitter:post".to_owned(),
                record(vec![("status", json!("Douglas Engelbart (1925-2013)"))]),
            ),
            ("com.twitter:post".to_owned(), record(vec![("status", json!("Settled"))])),
        ],
    );
}

#[test]
fn monitor_deduplicates_identical_consecutive_records() {
    // monitor @com.xkcd.get_comic() => @com.twitter.post(status=title);
    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(query("com.xkcd", "get_comic", vec![])),
        vec![Action::Invocation(invocation(
            "com.twitter",
            "post",
            vec![("status", Value::VarRef("title".to_owned()))],
        ))],
    )]);
    let compiled = compile(&mut program);
    assert_eq!(compiled.rules[0].states, 1, "dedup needs exactly one state cell");

    let same = record(vec![("number", json!(1234.0)), ("title", json!("Douglas Engelbart (1925-2013)"))]);
    let fresh = record(vec![("number", json!(1235.0)), ("title", json!("Settled"))]);
    let mut runtime = TestRuntime::new().stream("com.xkcd:get_comic", vec![same.clone(), same, fresh]);
    runtime.run(&compiled);

    assert_eq!(runtime.actions.len(), 2, "the duplicate delivery is suppressed");
    assert_eq!(runtime.actions[0].1["status"], json!("Douglas Engelbart (1925-2013)"));
    assert_eq!(runtime.actions[1].1["status"], json!("Settled"));
}

#[test]
fn join_merges_both_sides_into_the_output() {
    // now => (@com.xkcd.get_comic() join @com.yandex.translate.translate(...)
    //         on (text=title)), translated_text =~ "deciso" => notify;
    let mut program = Program::new(vec![Rule::now(
        Table::filtered(
            Table::join(
                query("com.xkcd", "get_comic", vec![]),
                query(
                    "com.yandex.translate",
                    "translate",
                    vec![("target_language", Value::entity("it", "tt:iso_lang_code"))],
                ),
                vec![InputParam::new("text", Value::VarRef("title".to_owned()))],
            ),
            BooleanExpression::atom("translated_text", BinaryOp::Like, Value::string("deciso")),
        ),
        vec![Action::notify()],
    )]);
    let compiled = compile(&mut program);

    let mut runtime = TestRuntime::new()
        .query_result(
            "com.xkcd:get_comic",
            vec![record(vec![("number", json!(1235.0)), ("title", json!("Settled"))])],
        )
        .query_result(
            "com.yandex.translate:translate",
            vec![record(vec![("translated_text", json!("Deciso"))])],
        );
    runtime.run(&compiled);

    assert_eq!(runtime.outputs.len(), 1, "one merged notification");
    let (output_type, merged) = &runtime.outputs[0];
    assert_eq!(output_type, "com.xkcd:get_comic+com.yandex.translate:translate");
    assert_eq!(merged["title"], json!("Settled"));
    assert_eq!(merged["translated_text"], json!("Deciso"));
}

#[test]
fn monitored_filter_fires_per_matching_record_in_order() {
    // monitor @com.xkcd.get_comic(), number >= 1234 => @com.twitter.post(status=title);
    let mut program = Program::new(vec![Rule::when(
        Stream::filtered(
            Stream::monitor(query("com.xkcd", "get_comic", vec![])),
            BooleanExpression::atom("number", BinaryOp::Ge, Value::Number(1234.0)),
        ),
        vec![Action::Invocation(invocation(
            "com.twitter",
            "post",
            vec![("status", Value::VarRef("title".to_owned()))],
        ))],
    )]);
    let compiled = compile(&mut program);

    let mut runtime = TestRuntime::new().stream(
        "com.xkcd:get_comic",
        (1234..=1237)
            .map(|n| record(vec![("number", json!(f64::from(n))), ("title", json!(format!("comic {n}")))]))
            .collect(),
    );
    runtime.run(&compiled);

    let statuses: Vec<_> = runtime.actions.iter().map(|(_, args)| args["status"].clone()).collect();
    assert_eq!(
        statuses,
        vec![json!("comic 1234"), json!("comic 1235"), json!("comic 1236"), json!("comic 1237")],
        "all four records pass the filter in delivery order"
    );
}

#[test]
fn timers_tick_with_no_bindings() {
    let mut program = Program::new(vec![Rule::when(
        Stream::Timer {
            base: Value::Date(DateValue::Now),
            interval: Value::measure(1.0, "h"),
            schema: SchemaSlot::empty(),
        },
        vec![Action::notify()],
    )]);
    let compiled = compile(&mut program);

    let mut runtime = TestRuntime::new();
    runtime.timer_ticks = 3;
    runtime.run(&compiled);
    assert_eq!(runtime.outputs.len(), 3);
    assert_eq!(runtime.outputs[0].0, "null", "a timer rule has no invoked functions");
}

#[test]
fn count_aggregation_folds_through_a_state_cell() {
    let mut program = Program::new(vec![Rule::now(
        Table::Aggregation {
            table: Box::new(query("com.twitter", "home_timeline", vec![])),
            field: "*".to_owned(),
            operator: AggregationOp::Count,
            alias: None,
            schema: SchemaSlot::empty(),
        },
        vec![Action::notify()],
    )]);
    let compiled = compile(&mut program);
    assert!(compiled.rules[0].states >= 1, "the accumulator needs a state cell");

    let mut runtime = TestRuntime::new().query_result(
        "com.twitter:home_timeline",
        vec![
            record(vec![("text", json!("a")), ("author", json!("bob"))]),
            record(vec![("text", json!("b")), ("author", json!("charlie"))]),
            record(vec![("text", json!("c")), ("author", json!("bob"))]),
        ],
    );
    runtime.run(&compiled);
    assert_eq!(runtime.outputs.len(), 1);
    assert_eq!(runtime.outputs[0].1["count"], json!(3.0));
}

#[test]
fn external_filter_compiles_to_an_exists_predicate() {
    // Keep the timeline posts whose author also appears in the timeline of
    // matching text; contrived, but exercises the sub-query path.
    let mut program = Program::new(vec![Rule::now(
        Table::filtered(
            query("com.xkcd", "get_comic", vec![]),
            BooleanExpression::External {
                selector: thingtalk::ast::Selector::new("com.twitter"),
                channel: "home_timeline".to_owned(),
                in_params: vec![],
                filter: Box::new(BooleanExpression::atom(
                    "text",
                    BinaryOp::Like,
                    Value::VarRef("title".to_owned()),
                )),
                schema: SchemaSlot::empty(),
            },
        ),
        vec![Action::notify()],
    )]);
    let compiled = compile(&mut program);

    let mut runtime = TestRuntime::new()
        .query_result(
            "com.xkcd:get_comic",
            vec![
                record(vec![("number", json!(1.0)), ("title", json!("Settled"))]),
                record(vec![("number", json!(2.0)), ("title", json!("Ignored"))]),
            ],
        )
        .query_result(
            "com.twitter:home_timeline",
            vec![record(vec![("text", json!("finally Settled!")), ("author", json!("bob"))])],
        );
    runtime.run(&compiled);

    assert_eq!(runtime.outputs.len(), 1, "only the comic the sub-query matches");
    assert_eq!(runtime.outputs[0].1["title"], json!("Settled"));
}

#[test]
fn memory_tables_and_sort_are_reported_unsupported() {
    let mut program = Program::new(vec![Rule::now(
        Table::Sort {
            table: Box::new(query("com.xkcd", "get_comic", vec![])),
            field: "number".to_owned(),
            direction: thingtalk::ast::SortDirection::Desc,
            schema: SchemaSlot::empty(),
        },
        vec![Action::notify()],
    )]);
    check(&mut program).expect("sort typechecks");
    let err = compile_program(&program).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::UnsupportedConstruct);
    assert_eq!(err.rule_index, 0);
}

#[test]
fn self_join_with_colliding_outputs_is_ambiguous() {
    let mut program = Program::new(vec![Rule::now(
        Table::join(
            query("com.xkcd", "get_comic", vec![]),
            query("com.xkcd", "get_comic", vec![]),
            vec![],
        ),
        vec![Action::notify()],
    )]);
    check(&mut program).expect("the self join typechecks");
    let err = compile_program(&program).unwrap_err();
    assert_eq!(err.kind, CompileErrorKind::AmbiguousJoin);
}

#[test]
fn compiled_rules_round_trip_through_json() {
    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(query("com.xkcd", "get_comic", vec![])),
        vec![Action::notify()],
    )]);
    let compiled = compile(&mut program);
    let json = serde_json::to_string_pretty(&compiled).expect("the IR must serialize");
    let back: thingtalk::ir::CompiledProgram = serde_json::from_str(&json).expect("the IR must parse back");
    assert_eq!(back, compiled);
}
