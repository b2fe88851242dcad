//! Example suite for a small GitHub organization client
//!
//! The client reads every payload through a patchable `http_get` slot, so the
//! suite never touches the network.

use std::cell::RefCell;
use testunit_rs::args;
use testunit_rs::assertions::{assert_equal, assert_raises};
use testunit_rs::mock::{Mock, Patcher, Setting, SideEffect, Slot, Value};
use testunit_rs::{testunit, Fixtures, TestSuite, TestUnit};

const ORG_URL: &str = "https://api.github.com/orgs/";

/// Client under test
struct GithubOrgClient {
    org_name: String,
    http_get: Slot<Mock>,
}

impl GithubOrgClient {
    fn new(org_name: &str, http_get: &Slot<Mock>) -> Self {
        GithubOrgClient {
            org_name: org_name.to_string(),
            http_get: http_get.clone(),
        }
    }

    fn get_json(&self, url: &str) -> testunit_rs::Result<Value> {
        let response = self.http_get.get().call(args![url])?;
        match response.as_mock() {
            Some(response) => response.method("json", args![]),
            None => Ok(response),
        }
    }

    fn org(&self) -> testunit_rs::Result<Value> {
        self.get_json(&format!("{}{}", ORG_URL, self.org_name))
    }

    fn public_repos_url(&self) -> anyhow::Result<String> {
        match self.org()? {
            Value::Map(payload) => payload
                .get("repos_url")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("KeyError: 'repos_url'")),
            other => anyhow::bail!("unexpected org payload: {}", other),
        }
    }

    fn public_repos(&self, license: Option<&str>) -> anyhow::Result<Vec<String>> {
        let url = self.public_repos_url()?;
        let Value::List(repos) = self.get_json(&url)? else {
            anyhow::bail!("unexpected repos payload");
        };
        Ok(repos
            .iter()
            .filter(|repo| license.map_or(true, |key| has_license(repo, key)))
            .filter_map(|repo| match repo {
                Value::Map(fields) => fields.get("name").and_then(Value::as_str),
                _ => None,
            })
            .map(str::to_string)
            .collect())
    }
}

fn has_license(repo: &Value, key: &str) -> bool {
    let Value::Map(fields) = repo else {
        return false;
    };
    match fields.get("license") {
        Some(Value::Map(license)) => license.get("key").and_then(Value::as_str) == Some(key),
        _ => false,
    }
}

fn repo(name: &str, license: Option<&str>) -> Value {
    let license = match license {
        Some(key) => Value::from_iter([("key", key)]),
        None => Value::None,
    };
    Value::from_iter([("name", Value::from(name)), ("license", license)])
}

fn org_payload() -> Value {
    Value::from_iter([("repos_url", "https://api.github.com/orgs/google/repos")])
}

fn repos_payload() -> Value {
    Value::List(vec![
        repo("episodes.dart", None),
        repo("cpp-netlib", Some("bsl-1.0")),
        repo("dagger", Some("apache-2.0")),
        repo("kratu", Some("apache-2.0")),
    ])
}

fn unit_suite(http_get: &Slot<Mock>) -> TestSuite {
    let org_slot = http_get.clone();
    let repos_slot = http_get.clone();

    TestSuite::new("client.TestGithubOrgClient")
        .parameterized(
            "client.TestGithubOrgClient.test_org",
            [("google", "google"), ("abc", "abc")],
            move |_, org_name| {
                let get = Mock::builder()
                    .name("get")
                    .return_value(Value::from_iter([("login", *org_name)]))
                    .build();
                let _guard = testunit_rs::mock::patch(&org_slot, get.clone());

                let payload = GithubOrgClient::new(org_name, &org_slot).org()?;
                assert_equal(payload, Value::from_iter([("login", *org_name)]))?;
                get.assert_called_once_with(args![format!("{}{}", ORG_URL, org_name)])?;
                Ok(())
            },
        )
        .with(TestUnit::new(
            "client.TestGithubOrgClient.test_public_repos",
            move |_| {
                let get = Mock::named("get");
                get.set_side_effect(SideEffect::sequence([org_payload(), repos_payload()]));
                let _guard = testunit_rs::mock::patch(&repos_slot, get.clone());

                let client = GithubOrgClient::new("google", &repos_slot);
                let names = client.public_repos(None)?;
                assert_equal(names.len(), 4)?;
                assert_equal(get.call_count(), 2)?;
                Ok(())
            },
        ))
        .parameterized(
            "client.TestGithubOrgClient.test_has_license",
            [
                ("my_license", (repo("a", Some("my_license")), true)),
                ("other_license", (repo("b", Some("other_license")), false)),
            ],
            |_, (repo, expected)| Ok(assert_equal(has_license(repo, "my_license"), *expected)?),
        )
        .with(TestUnit::new(
            "client.TestGithubOrgClient.test_bad_payload",
            {
                let slot = http_get.clone();
                move |_| {
                    let get = Mock::builder().name("get").return_value(Value::List(vec![])).build();
                    let _guard = testunit_rs::mock::patch(&slot, get);
                    let error = assert_raises(|| GithubOrgClient::new("x", &slot).public_repos_url())?;
                    assert_equal(error.to_string().starts_with("unexpected org payload"), true)?;
                    Ok(())
                }
            },
        ))
}

fn integration_suite(http_get: &Slot<Mock>) -> TestSuite {
    let up_slot = http_get.clone();
    let slot = http_get.clone();

    TestSuite::new("client.TestIntegrationGithubOrgClient")
        .set_up_suite(move |fixtures: &mut Fixtures| {
            let response = Mock::named("get");
            response.configure([(
                "return_value.json.side_effect",
                Setting::from(SideEffect::sequence([
                    org_payload(),
                    repos_payload(),
                    org_payload(),
                    repos_payload(),
                    org_payload(),
                    repos_payload(),
                ])),
            )])?;
            let mut patcher = Patcher::new(&up_slot, response);
            let mock = patcher.start()?;
            fixtures.insert(mock);
            fixtures.insert(RefCell::new(patcher));
            Ok(())
        })
        .tear_down_suite(|fixtures| {
            if let Some(patcher) = fixtures.get::<RefCell<Patcher<Mock>>>() {
                patcher.borrow_mut().stop()?;
            }
            Ok(())
        })
        .with(TestUnit::new(
            "client.TestIntegrationGithubOrgClient.test_public_repos",
            {
                let slot = slot.clone();
                move |ctx| {
                    let client = GithubOrgClient::new("google", &slot);
                    assert_equal(
                        client.public_repos(None)?,
                        vec![
                            "episodes.dart".to_string(),
                            "cpp-netlib".to_string(),
                            "dagger".to_string(),
                            "kratu".to_string(),
                        ],
                    )?;
                    if let Some(mock) = ctx.fixture::<Mock>() {
                        mock.assert_called()?;
                    }
                    Ok(())
                }
            },
        ))
        .with(TestUnit::new(
            "client.TestIntegrationGithubOrgClient.test_public_repos_with_license",
            move |_| {
                let client = GithubOrgClient::new("google", &slot);
                assert_equal(
                    client.public_repos(Some("apache-2.0"))?,
                    vec!["dagger".to_string(), "kratu".to_string()],
                )?;
                assert_equal(client.public_repos(Some("XLICENSE"))?, vec![])?;
                Ok(())
            },
        ))
}

fn main() {
    let http_get = Slot::new(Mock::named("requests.get"));
    let suite = TestSuite::new("client")
        .with(unit_suite(&http_get))
        .with(integration_suite(&http_get));

    let result = testunit::run(&suite).fail_fast(false).execute();
    let summary = result.summary();
    println!(
        "Ran {} tests: {} passed, {} failed, {} errors, {} skipped",
        summary.tests_run, summary.successes, summary.failures, summary.errors, summary.skipped
    );
    for (id, failure) in result.failures.iter().chain(result.errors.iter()) {
        eprintln!("{}\n{}\n", id, failure);
    }
    if !summary.successful {
        std::process::exit(1);
    }
}
