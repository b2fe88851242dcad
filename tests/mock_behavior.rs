//! Tests for call-recording mocks used inside test bodies

mod common;

use common::init_test_logging;
use testunit_rs::args;
use testunit_rs::assertions::assert_equal;
use testunit_rs::mock::{
    patch, Call, Effect, Mock, Patcher, Setting, SideEffect, Signature, Slot, Spec, Value, ANY,
};
use testunit_rs::{Error, TestResult, TestUnit};

#[test]
fn test_side_effect_sequence_then_exhaustion() {
    init_test_logging();
    let mock = Mock::builder()
        .name("next_page")
        .side_effect(SideEffect::sequence([1, 2, 3]))
        .build();

    for expected in 1..=3 {
        assert_eq!(mock.call(args![]).unwrap(), Value::from(expected));
    }
    let err = mock.call(args![]).unwrap_err();
    assert!(matches!(err, Error::SideEffectExhausted { .. }));
    assert_eq!(mock.call_count(), 4);
}

#[test]
fn test_side_effect_sequence_can_raise() {
    let mock = Mock::new();
    mock.set_side_effect(SideEffect::effects([
        Effect::from(Value::from("first")),
        Effect::raise(|| anyhow::anyhow!("KeyError: 'b'")),
    ]));

    assert_eq!(mock.call(args![]).unwrap(), Value::from("first"));
    let err = mock.call(args![]).unwrap_err();
    assert!(matches!(err, Error::Raised(_)));
    assert_eq!(err.to_string(), "KeyError: 'b'");
}

#[test]
fn test_raising_and_delegating_side_effects() {
    let raising = Mock::builder()
        .side_effect(SideEffect::raise(|| anyhow::anyhow!("connection refused")))
        .return_value("unused")
        .build();
    assert!(raising.call(args![]).is_err());
    assert!(raising.call(args![]).is_err());

    let delegating = Mock::builder().return_value("fallback").build();
    delegating.set_side_effect(SideEffect::call(|call| match call.args.first() {
        Some(Value::Int(n)) => Ok(Some(Value::from(n * 2))),
        _ => Ok(None),
    }));
    assert_eq!(delegating.call(args![21]).unwrap(), Value::from(42));
    assert_eq!(delegating.call(args!["x"]).unwrap(), Value::from("fallback"));

    delegating.clear_side_effect();
    assert_eq!(delegating.call(args![21]).unwrap(), Value::from("fallback"));
}

#[test]
fn test_chained_attribute_call_is_recorded_on_root() {
    let obj = Mock::named("obj");
    obj.child("a").unwrap().method("b", args![]).unwrap();

    assert_eq!(obj.method_calls(), vec![Call::named("a.b", args![])]);
    assert_eq!(obj.method_calls()[0].to_string(), "call.a.b()");
    assert!(obj.child("a").unwrap().child("b").unwrap().called());
    assert!(!obj.called());
}

#[test]
fn test_call_chain_through_return_values() {
    let factory = Mock::named("Session");
    let session = factory.call(args![]).unwrap();
    session
        .as_mock()
        .unwrap()
        .method("get", args!["https://api.github.com/orgs/google"])
        .unwrap();

    let expected = vec![
        Call::new(args![]),
        Call::named("().get", args!["https://api.github.com/orgs/google"]),
    ];
    assert_eq!(factory.mock_calls(), expected);
    assert_eq!(
        factory.mock_calls()[1].to_string(),
        "call().get('https://api.github.com/orgs/google')"
    );
    factory.assert_has_calls(&expected, false).unwrap();
}

#[test]
fn test_reset_keeps_configuration() {
    let mock = Mock::builder().return_value(7).build();
    for _ in 0..5 {
        mock.call(args![]).unwrap();
    }
    mock.reset(false);
    assert_eq!(mock.call_count(), 0);
    assert!(mock.call_args().is_none());
    assert_eq!(mock.call(args![]).unwrap(), Value::from(7));

    mock.reset(true);
    assert!(mock.call(args![]).unwrap().as_mock().is_some());
}

#[test]
fn test_called_with_tracks_most_recent_call() {
    let get = Mock::named("get");
    get.call(args![1]).unwrap();
    get.call(args![1, 2]).unwrap();

    get.assert_called_with(args![1, 2]).unwrap();
    let err = get.assert_called_with(args![1]).unwrap_err();
    assert!(err.is_failure());
    assert_eq!(
        err.to_string(),
        "expected call not found.\nExpected: get(1)\n  Actual: get(1, 2)"
    );
    get.assert_any_call(args![1]).unwrap();
    get.assert_called_with(args![1, ANY]).unwrap();
    assert!(get.assert_called_once().is_err());
}

#[test]
fn test_has_calls_requires_contiguous_run() {
    let client = Mock::named("client");
    for path in ["orgs", "repos", "license", "orgs"] {
        client.method("get", args![path]).unwrap();
    }
    let orgs = Call::named("get", args!["orgs"]);
    let repos = Call::named("get", args!["repos"]);
    let license = Call::named("get", args!["license"]);

    client
        .assert_has_calls(&[repos.clone(), license.clone()], false)
        .unwrap();
    client
        .assert_has_calls(&[license.clone(), orgs.clone()], false)
        .unwrap();

    // in order but with a gap
    assert!(client
        .assert_has_calls(&[orgs.clone(), license.clone()], false)
        .is_err());
    // out of order
    assert!(client
        .assert_has_calls(&[license.clone(), repos.clone()], false)
        .is_err());
    client
        .assert_has_calls(&[license.clone(), repos.clone()], true)
        .unwrap();
    // multiset: only two calls with "orgs" exist
    assert!(client
        .assert_has_calls(&[orgs.clone(), orgs.clone(), orgs], true)
        .is_err());
}

#[test]
fn test_configure_with_dotted_paths() {
    let response = Mock::named("get");
    response
        .configure([
            (
                "return_value.json.return_value",
                Setting::value(Value::from_iter([("login", "google")])),
            ),
            ("return_value.status_code", Setting::value(200)),
            (
                "return_value.raise_for_status.side_effect",
                Setting::from(SideEffect::raise(|| anyhow::anyhow!("404 Not Found"))),
            ),
        ])
        .unwrap();

    let reply = response.call(args!["https://api.github.com/orgs/google"]).unwrap();
    let reply = reply.as_mock().unwrap();
    assert_eq!(reply.get("status_code").unwrap(), Value::from(200));
    let payload = reply.method("json", args![]).unwrap();
    assert_eq!(payload, Value::from_iter([("login", "google")]));
    assert!(reply.method("raise_for_status", args![]).is_err());

    response.assert_called_once_with(args!["https://api.github.com/orgs/google"]).unwrap();
}

#[test]
fn test_spec_constrains_attributes_and_calls() {
    let spec = Spec::object()
        .method("get_json", Signature::new().positional("url"))
        .field("org");
    let client = Mock::with_spec(spec);

    assert!(client.get("org").is_ok());
    assert!(matches!(client.get("orgs"), Err(Error::Attribute { .. })));

    let get_json = client.child("get_json").unwrap();
    assert!(matches!(
        get_json.call(args![]),
        Err(Error::SignatureMismatch { .. })
    ));
    assert_eq!(get_json.call_count(), 0);

    get_json.call(args!["https://example.com"]).unwrap();
    get_json
        .assert_called_with(args![].kw("url", "https://example.com"))
        .unwrap();
    assert!(matches!(
        client.call(args![]),
        Err(Error::NotCallable { .. })
    ));
}

#[test]
fn test_spec_set_refuses_unknown_assignments() {
    let spec = Spec::object().field("org");
    let client = Mock::builder().spec_set(spec).build();
    client.set_attr("org", "google").unwrap();
    assert!(client.set_attr("repos", Value::List(vec![])).is_err());
}

#[test]
fn test_patch_slot_inside_unit() {
    let fetch: Slot<Mock> = Slot::new(Mock::named("real_fetch"));
    let seen = fetch.clone();

    let unit = TestUnit::new("utils.TestGetJson.test_get_json", move |ctx| {
        let replacement = Mock::builder()
            .name("fetch")
            .return_value(Value::from_iter([("payload", true)]))
            .build();
        let guard = patch(&seen, replacement.clone());

        let value = seen.get().call(args!["http://example.com"])?;
        assert_eq!(value, Value::from_iter([("payload", true)]));
        replacement.assert_called_once_with(args!["http://example.com"])?;
        drop(guard);
        assert_equal(seen.get().full_name(), "real_fetch".to_string())?;

        let slot = seen.clone();
        let mut patcher = Patcher::new(&slot, Mock::named("late"));
        patcher.start()?;
        ctx.add_cleanup(move || Ok(patcher.stop()?));
        Ok(())
    });

    let mut result = TestResult::new();
    unit.run(&mut result);

    assert!(result.was_successful(), "{:?}", result.errors);
    assert_eq!(fetch.get().full_name(), "real_fetch");
}

#[test]
fn test_verification_failure_inside_unit_is_a_failure() {
    let unit = TestUnit::new("mocks.test_not_called", |_| {
        let mock = Mock::named("notify");
        mock.call(args!["ops@example.com"])?;
        mock.assert_not_called()?;
        Ok(())
    });

    let mut result = TestResult::new();
    unit.run(&mut result);

    assert_eq!(result.failures.len(), 1);
    assert!(result.failures[0]
        .1
        .message
        .starts_with("Expected 'notify' to not have been called. Called 1 times."));
}
