//! Tests for suites, suite fixtures and the runner

mod common;

use arbitrary::{Arbitrary, Unstructured};
use common::{erroring, event_log, failing, init_test_logging, passing, push};
use regex::Regex;
use std::cell::RefCell;
use std::rc::Rc;
use testunit_rs::assertions::{assert_equal, skip_test};
use testunit_rs::{testunit, RunParams, TestResult, TestRunner, TestSuite, TestUnit};

/// Shape of a randomly generated suite tree
#[derive(Debug, Arbitrary)]
enum Shape {
    Unit,
    Suite(Vec<Shape>),
}

impl Shape {
    fn leaves(&self) -> usize {
        match self {
            Shape::Unit => 1,
            Shape::Suite(children) => children.iter().map(Shape::leaves).sum(),
        }
    }

    fn build(&self, path: &str) -> TestSuite {
        let mut suite = TestSuite::new(path);
        if let Shape::Suite(children) = self {
            for (i, child) in children.iter().enumerate() {
                let name = format!("{}.{}", path, i);
                match child {
                    Shape::Unit => suite.add(passing(&name)),
                    Shape::Suite(_) => suite.add(child.build(&name)),
                }
            }
        }
        suite
    }
}

#[test]
fn test_count_matches_flattened_leaves() {
    let seeds: [&[u8]; 5] = [
        b"",
        b"\x01\x02\x03\x04\x05\x06\x07\x08",
        b"nested suites of units and more suites",
        &[0xff; 64],
        &[0x01, 0x00, 0x01, 0x01, 0x00, 0x02, 0x00, 0x01, 0x01, 0x00, 0x00, 0x03],
    ];
    for seed in seeds {
        let mut data = Unstructured::new(seed);
        let Ok(shape) = Shape::arbitrary(&mut data) else {
            continue;
        };
        let root = match shape {
            Shape::Unit => Shape::Suite(vec![Shape::Unit]),
            other => other,
        };
        let suite = root.build("root");
        assert_eq!(suite.count_test_cases(), root.leaves(), "{:?}", root);
        assert_eq!(suite.units().len(), root.leaves());

        let result = TestRunner::new(RunParams::new().fail_fast(false)).run(&suite);
        assert_eq!(result.tests_run, root.leaves());
    }
}

#[test]
fn test_fail_fast_stops_remaining_units() {
    init_test_logging();
    let log = event_log();
    let ran = log.clone();
    let suite = TestSuite::new("failfast")
        .with(erroring("failfast.test_first"))
        .with(TestSuite::new("failfast.nested").with(TestUnit::new(
            "failfast.nested.test_second",
            move |_| {
                push(&ran, "second");
                Ok(())
            },
        )))
        .with(passing("failfast.test_third"));

    let result = testunit::run(&suite).fail_fast(true).execute();

    assert!(result.should_stop);
    assert!(log.borrow().is_empty());
    assert_eq!(result.tests_run, 1);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn test_without_fail_fast_everything_runs() {
    let suite = TestSuite::new("all")
        .with(erroring("all.test_error"))
        .with(failing("all.test_failure"))
        .with(passing("all.test_pass"));

    let result = testunit::run(&suite).fail_fast(false).execute();

    assert!(!result.should_stop);
    assert_eq!(result.tests_run, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.successes.len(), 1);
}

#[test]
fn test_suite_fixture_brackets_children_once() {
    struct Session {
        base_url: String,
        opened: Rc<RefCell<usize>>,
    }

    let log = event_log();
    let (up, down, body) = (log.clone(), log.clone(), log.clone());
    let opened = Rc::new(RefCell::new(0));
    let counter = opened.clone();

    let suite = TestSuite::new("client.TestGithubOrgClient")
        .set_up_suite(move |fixtures| {
            push(&up, "set_up_suite");
            *counter.borrow_mut() += 1;
            fixtures.insert(Session {
                base_url: "https://api.github.com".to_string(),
                opened: counter.clone(),
            });
            Ok(())
        })
        .tear_down_suite(move |fixtures| {
            let session = fixtures.get::<Session>().map(|s| *s.opened.borrow());
            push(&down, format!("tear_down_suite {:?}", session));
            Ok(())
        })
        .with(TestUnit::new("client.test_org", move |ctx| {
            let session = ctx
                .fixture::<Session>()
                .ok_or_else(|| anyhow::anyhow!("no session"))?;
            push(&body, "test_org");
            Ok(assert_equal(session.base_url.as_str(), "https://api.github.com")?)
        }))
        .with(
            TestSuite::new("client.nested").with(TestUnit::new("client.nested.test_url", |ctx| {
                let session = ctx
                    .fixture::<Session>()
                    .ok_or_else(|| anyhow::anyhow!("fixture not inherited"))?;
                Ok(assert_equal(session.base_url.starts_with("https://"), true)?)
            })),
        );

    let result = testunit::run(&suite).execute();

    assert!(result.was_successful(), "{:?}", result.errors);
    assert_eq!(*opened.borrow(), 1);
    assert_eq!(
        *log.borrow(),
        vec!["set_up_suite", "test_org", "tear_down_suite Some(1)"]
    );
}

#[test]
fn test_suite_fixture_error_runs_no_children() {
    let log = event_log();
    let (ran, down) = (log.clone(), log.clone());
    let suite = TestSuite::new("broken")
        .set_up_suite(|_| Err(anyhow::anyhow!("database unreachable")))
        .tear_down_suite(move |_| {
            push(&down, "tear_down_suite");
            Ok(())
        })
        .with(TestUnit::new("broken.test_query", move |_| {
            push(&ran, "test_query");
            Ok(())
        }));

    let result = testunit::run(&suite).execute();

    assert!(log.borrow().is_empty());
    assert_eq!(result.tests_run, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].0.name(), "set_up_suite (broken)");
    assert!(!result.was_successful());
}

#[test]
fn test_suite_fixture_skip_and_empty_suites() {
    let log = event_log();
    let up = log.clone();
    let skipped = TestSuite::new("offline")
        .set_up_suite(|_| Ok(skip_test("no network")?))
        .with(passing("offline.test_fetch"));
    let empty = TestSuite::new("empty").set_up_suite(move |_| {
        push(&up, "should not run");
        Ok(())
    });
    let suite = TestSuite::new("root").with(skipped).with(empty);

    let result = testunit::run(&suite).execute();

    assert!(log.borrow().is_empty());
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].1, "no network");
    assert!(result.was_successful());
}

#[test]
fn test_skipped_suite_records_every_leaf() {
    let suite = TestSuite::new("legacy")
        .set_up_suite(|_| Err(anyhow::anyhow!("must not run")))
        .with(passing("legacy.test_a"))
        .with(TestSuite::new("legacy.inner").with(failing("legacy.inner.test_b")))
        .skip("legacy API removed");

    let result = testunit::run(&suite).execute();

    assert_eq!(result.skipped.len(), 2);
    assert_eq!(result.tests_run, 2);
    assert!(result.errors.is_empty());
    assert!(result.was_successful());
}

#[test]
fn test_parameterized_cases_run_independently() {
    let suite = TestSuite::new("utils.TestAccessNestedMap").parameterized(
        "utils.TestAccessNestedMap.test_access_nested_map",
        [
            ("a", (vec!["a"], 1)),
            ("a_b", (vec!["a", "b"], 2)),
            ("missing", (vec!["x"], 0)),
        ],
        |_, (path, expected)| {
            let depth = if path[0] == "x" { 99 } else { path.len() as i32 };
            Ok(assert_equal(depth, *expected)?)
        },
    );

    assert_eq!(suite.count_test_cases(), 3);
    let result = testunit::run(&suite).execute();

    assert_eq!(result.successes.len(), 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(
        result.failures[0].0.name(),
        "utils.TestAccessNestedMap.test_access_nested_map_2_missing"
    );
}

#[test]
fn test_retain_matching_filters_before_running() {
    let mut suite = TestSuite::new("root")
        .with(
            TestSuite::new("client")
                .with(passing("client.test_org"))
                .with(failing("client.test_repos")),
        )
        .with(TestSuite::new("utils").with(failing("utils.test_get_json")));

    suite.retain_matching(&Regex::new(r"test_org$").unwrap());
    let result = testunit::run(&suite).execute();

    assert_eq!(result.tests_run, 1);
    assert!(result.was_successful());
}

#[test]
fn test_merge_of_shards_and_serialized_summary() {
    let left = TestSuite::new("left")
        .with(passing("left.test_a"))
        .with(failing("left.test_b"));
    let right = TestSuite::new("right")
        .with(passing("right.test_c"))
        .with(TestUnit::new("right.test_d", |_| Ok(skip_test("later")?)));

    let runner = TestRunner::new(RunParams::new().fail_fast(false));
    let mut merged = runner.run(&left);
    merged.merge(runner.run(&right));

    let summary = merged.summary();
    assert_eq!(summary.tests_run, 4);
    assert_eq!(summary.successes, 2);
    assert_eq!(summary.failures, 1);
    assert_eq!(summary.skipped, 1);
    assert!(!summary.successful);

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["tests_run"], 4);
    assert_eq!(json["successful"], false);

    let failure = serde_json::to_value(&merged.failures[0]).unwrap();
    assert_eq!(failure[0]["name"], "left.test_b");
    assert_eq!(failure[1]["message"], "forced failure");
}

#[test]
fn test_runner_into_shared_result() {
    let runner = TestRunner::new(RunParams::new().fail_fast(false));
    let mut result = TestResult::new();
    runner.run_with(&TestSuite::new("a").with(passing("a.test")), &mut result);
    runner.run_with(&TestSuite::new("b").with(passing("b.test")), &mut result);
    assert_eq!(result.tests_run, 2);
    assert_eq!(result.successes.len(), 2);
}
