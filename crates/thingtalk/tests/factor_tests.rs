//! Remote factoring: externalization shapes, primitive preservation, and
//! determinism.

mod common;

use pretty_assertions::assert_eq;

use common::{check, query};
use thingtalk::ast::{
    iterate_primitives, Action, InputParam, Invocation, Primitive, Program, Rule, RuleSource, Selector, Stream, Table,
};
use thingtalk::{factor_remote, FactorOptions, Value, REMOTE_BROKER_KIND};

fn bob() -> Value {
    Value::entity("mock-account:bob", "tt:contact")
}

fn options() -> FactorOptions {
    FactorOptions {
        seed: 42,
        own_principal: Some(Value::entity("mock-account:alice", "tt:contact")),
    }
}

/// Every non-synthesized primitive of a program, as (kind, channel) pairs.
fn real_primitives(program: &Program) -> Vec<(String, String)> {
    iterate_primitives(program, false)
        .into_iter()
        .filter_map(|(_, primitive)| match primitive {
            Primitive::Invocation(invocation) => {
                Some((invocation.selector.kind.clone(), invocation.channel.clone()))
            }
            Primitive::External(selector, channel) => Some((selector.kind.clone(), channel.to_owned())),
            Primitive::VarRef(_) => None,
        })
        .filter(|(kind, _)| !kind.starts_with("__dyn_"))
        .collect()
}

#[test]
fn remote_action_becomes_a_send_receive_pair() {
    // monitor @com.xkcd.get_comic() => @com.twitter(principal=bob).post(...);
    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(query("com.xkcd", "get_comic", vec![])),
        vec![Action::Invocation(Invocation::new(
            Selector::with_principal("com.twitter", bob()),
            "post",
            vec![InputParam::new("status", Value::VarRef("title".to_owned()))],
        ))],
    )]);
    check(&mut program).expect("typecheck");
    let original_primitives = real_primitives(&program);

    let factored = factor_remote(program, &options());
    let local = factored.local.expect("the monitor stays local");
    assert_eq!(factored.remote.len(), 1);
    assert_eq!(factored.remote[0].principal, bob());

    // The local action is now a send on a dynamic class.
    let Action::Invocation(send) = &local.rules[0].actions[0] else {
        panic!("local action should be an invocation");
    };
    assert!(send.selector.kind.starts_with("__dyn_"), "got {}", send.selector.kind);
    assert_eq!(send.channel, "send");
    assert!(send.in_param("__token").is_some(), "the send carries the flow token");
    assert_eq!(send.in_param("__principal"), Some(&bob()));

    // The synthesized class extends the broker.
    let dyn_class = local
        .classes
        .iter()
        .find(|c| c.kind == send.selector.kind)
        .expect("the send class is attached to the local program");
    assert_eq!(dyn_class.extends, vec![REMOTE_BROKER_KIND.to_owned()]);

    // The remote side resumes on a receive and runs the original action.
    let remote = &factored.remote[0].program;
    assert_eq!(remote.rules.len(), 1);
    assert!(matches!(remote.rules[0].source, Some(RuleSource::Stream(_))));
    let Action::Invocation(action) = &remote.rules[0].actions[0] else {
        panic!("remote action should be an invocation");
    };
    assert_eq!(action.selector.kind, "com.twitter");
    assert!(action.selector.principal.is_none(), "the principal is stripped remotely");

    // Property: the union of real primitives is preserved.
    let mut after: Vec<(String, String)> = real_primitives(&local);
    for remote in &factored.remote {
        after.extend(real_primitives(&remote.program));
    }
    after.sort();
    let mut before = original_primitives;
    before.sort();
    assert_eq!(after, before);
}

#[test]
fn pure_remote_action_externalizes_wholesale() {
    let mut program = Program::new(vec![Rule::immediate(vec![Action::Invocation(Invocation::new(
        Selector::with_principal("com.twitter", bob()),
        "post",
        vec![],
    ))])]);
    check(&mut program).expect("typecheck");

    let factored = factor_remote(program, &options());
    assert!(factored.local.is_none(), "nothing remains locally");
    assert_eq!(factored.remote.len(), 1);
    let remote_rule = &factored.remote[0].program.rules[0];
    assert!(remote_rule.source.is_none(), "a pure action rule has no source");
    let Action::Invocation(action) = &remote_rule.actions[0] else {
        panic!("remote action should be an invocation");
    };
    assert_eq!(
        action.in_param("status"),
        Some(&Value::undefined()),
        "undefined parameters are lifted intact for remote slot-filling"
    );
}

#[test]
fn remote_stream_is_replaced_by_a_receive() {
    let mut program = Program::new(vec![Rule::when(
        Stream::monitor(Table::Invocation(Invocation::new(
            Selector::with_principal("com.xkcd", bob()),
            "get_comic",
            vec![],
        ))),
        vec![Action::notify()],
    )]);
    check(&mut program).expect("typecheck");

    let factored = factor_remote(program, &options());
    let local = factored.local.expect("the notify stays local");

    let Some(RuleSource::Stream(Stream::Monitor { table, .. })) = &local.rules[0].source else {
        panic!("the local source should be a monitored receive");
    };
    let Table::Invocation(receive) = &**table else {
        panic!("the monitored table should be the receive invocation");
    };
    assert_eq!(receive.channel, "receive");
    assert!(receive.selector.kind.starts_with("__dyn_"));

    // The remote side runs the original monitor and sends each record back.
    let remote = &factored.remote[0].program;
    let Some(RuleSource::Stream(Stream::Monitor { table, .. })) = &remote.rules[0].source else {
        panic!("the remote source should be the original monitor");
    };
    assert!(matches!(&**table, Table::Invocation(inv) if inv.selector.kind == "com.xkcd"));
    let Action::Invocation(send) = &remote.rules[0].actions[0] else {
        panic!("the remote action should be the send");
    };
    assert_eq!(send.channel, "send");
    assert!(
        send.in_param("title").is_some(),
        "the send forwards the stream's output fields"
    );
}

#[test]
fn remote_query_splits_the_rule_in_two() {
    // monitor @com.xkcd.get_comic() join @com.yandex.translate(bob).translate(...)
    let mut program = Program::new(vec![Rule::when(
        Stream::Join {
            stream: Box::new(Stream::monitor(query("com.xkcd", "get_comic", vec![]))),
            table: Box::new(Table::Invocation(Invocation::new(
                Selector::with_principal("com.yandex.translate", bob()),
                "translate",
                vec![InputParam::new(
                    "target_language",
                    Value::entity("it", "tt:iso_lang_code"),
                )],
            ))),
            in_params: vec![InputParam::new("text", Value::VarRef("title".to_owned()))],
            schema: thingtalk::ast::SchemaSlot::empty(),
        },
        vec![Action::notify()],
    )]);
    check(&mut program).expect("typecheck");

    let factored = factor_remote(program, &options());
    let local = factored.local.expect("two local rules remain");
    assert_eq!(local.rules.len(), 2, "pre-query forward plus post-query resume");

    // Rule one forwards the local stream into a send.
    assert!(matches!(&local.rules[0].source, Some(RuleSource::Stream(Stream::Monitor { table, .. }))
        if matches!(&**table, Table::Invocation(inv) if inv.selector.kind == "com.xkcd")));
    assert!(matches!(&local.rules[0].actions[0], Action::Invocation(inv) if inv.channel == "send"));

    // Rule two resumes on the merged receive and notifies.
    assert!(matches!(&local.rules[1].source, Some(RuleSource::Stream(Stream::Monitor { table, .. }))
        if matches!(&**table, Table::Invocation(inv) if inv.channel == "receive")));
    assert!(matches!(&local.rules[1].actions[0], Action::Notify { .. }));

    // The remote program joins the forwarded bindings against the query.
    let remote = &factored.remote[0].program;
    assert_eq!(remote.rules.len(), 1);
    assert!(matches!(&remote.rules[0].source, Some(RuleSource::Stream(Stream::Join { .. }))));
}

#[test]
fn remote_table_join_splits_a_one_shot_rule() {
    // now => (@com.xkcd.get_comic() join @com.yandex.translate(bob).translate(...)) => notify;
    let mut program = Program::new(vec![Rule::now(
        Table::join(
            query("com.xkcd", "get_comic", vec![]),
            Table::Invocation(Invocation::new(
                Selector::with_principal("com.yandex.translate", bob()),
                "translate",
                vec![InputParam::new(
                    "target_language",
                    Value::entity("it", "tt:iso_lang_code"),
                )],
            )),
            vec![InputParam::new("text", Value::VarRef("title".to_owned()))],
        ),
        vec![Action::notify()],
    )]);
    check(&mut program).expect("typecheck");

    let factored = factor_remote(program, &options());
    let local = factored.local.expect("forward and resume rules remain");
    assert_eq!(local.rules.len(), 2);

    // The forward rule keeps the local query as its one-shot source.
    assert!(matches!(&local.rules[0].source, Some(RuleSource::Table(Table::Invocation(inv)))
        if inv.selector.kind == "com.xkcd"));
    assert!(matches!(&local.rules[0].actions[0], Action::Invocation(inv) if inv.channel == "send"));

    // The resume rule monitors the merged receive, labelled with the remote
    // member of the join.
    let Some(RuleSource::Stream(Stream::Monitor { table, .. })) = &local.rules[1].source else {
        panic!("the resume rule should monitor the merged receive");
    };
    let Table::Invocation(receive) = &**table else {
        panic!("the monitored table should be the receive invocation");
    };
    assert_eq!(receive.channel, "receive");
    assert_eq!(
        receive.in_param("__kindChannel"),
        Some(&Value::entity("com.yandex.translate:translate", "tt:function_name")),
        "the channel label names the function that actually moved"
    );

    let remote = &factored.remote[0].program;
    assert_eq!(remote.rules.len(), 1);
    assert!(matches!(&remote.rules[0].source, Some(RuleSource::Stream(Stream::Join { .. }))));
}

#[test]
fn factoring_is_deterministic_under_a_seed() {
    let build = || {
        let mut program = Program::new(vec![Rule::when(
            Stream::monitor(query("com.xkcd", "get_comic", vec![])),
            vec![Action::Invocation(Invocation::new(
                Selector::with_principal("com.twitter", bob()),
                "post",
                vec![InputParam::new("status", Value::VarRef("title".to_owned()))],
            ))],
        )]);
        check(&mut program).expect("typecheck");
        factor_remote(program, &options())
    };
    let first = build();
    let second = build();
    assert_eq!(first, second, "the same seed must produce the same factoring");

    let different = factor_remote(
        {
            let mut program = Program::new(vec![Rule::when(
                Stream::monitor(query("com.xkcd", "get_comic", vec![])),
                vec![Action::Invocation(Invocation::new(
                    Selector::with_principal("com.twitter", bob()),
                    "post",
                    vec![InputParam::new("status", Value::VarRef("title".to_owned()))],
                ))],
            )]);
            check(&mut program).expect("typecheck");
            program
        },
        &FactorOptions {
            seed: 43,
            own_principal: Some(Value::entity("mock-account:alice", "tt:contact")),
        },
    );
    assert_ne!(first, different, "a different seed changes the flow tokens");
}
