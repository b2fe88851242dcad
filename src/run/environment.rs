//! Per-unit execution context handed to every lifecycle step

use crate::error::{Error, Result};
use crate::mock::Value;
use crate::result::{CaptureWriter, Failure, OutputCapture, Outcome};
use crate::run::execution;
use crate::suite::Fixtures;
use crate::unit::{LocalFuture, TestId};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::rc::Rc;
use tempfile::TempDir;

/// A cleanup registered while a unit runs
pub(crate) enum Cleanup {
    Sync(Box<dyn FnOnce() -> anyhow::Result<()>>),
    Async(LocalFuture<'static, anyhow::Result<()>>),
}

/// Label of a subtest: an optional message plus parameters
///
/// Renders as `[message] (key=value, ...)`, or `(<subtest>)` when empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubTest {
    message: Option<String>,
    params: Vec<(String, Value)>,
}

impl SubTest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.params.push((key, value)),
        }
        self
    }

    /// Combine with an enclosing subtest: parameters accumulate, inner ones win
    fn nested_in(self, outer: &SubTest) -> SubTest {
        let mut merged = SubTest {
            message: self.message,
            params: outer.params.clone(),
        };
        for (key, value) in self.params {
            merged = merged.param(key, value);
        }
        merged
    }
}

impl From<&str> for SubTest {
    fn from(message: &str) -> Self {
        SubTest::new().message(message)
    }
}

impl From<String> for SubTest {
    fn from(message: String) -> Self {
        SubTest::new().message(message)
    }
}

impl fmt::Display for SubTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(message) = &self.message {
            parts.push(format!("[{}]", message));
        }
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            parts.push(format!("({})", params.join(", ")));
        }
        if parts.is_empty() {
            return write!(f, "(<subtest>)");
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Everything a set-up, body, tear-down or subtest can reach while a unit runs
///
/// One context is created per unit invocation and dropped after its cleanups,
/// taking the scratch directory with it.
pub struct TestContext {
    id: TestId,
    state: HashMap<TypeId, Box<dyn Any>>,
    fixtures: Option<Rc<Fixtures>>,
    cleanups: Vec<Cleanup>,
    capture: OutputCapture,
    work_dir: Option<TempDir>,
    active_subtest: Option<SubTest>,
    fail_fast: bool,
    /// Whether the current phase is anticipated to fail
    pub(crate) expecting_failure: bool,
    /// Cleared by the first skip, failure or error of any phase
    pub(crate) success: bool,
    /// The failure that satisfied an expected-failure marker
    pub(crate) expected_failure: Option<Failure>,
    subtests: Vec<(TestId, Outcome)>,
}

impl TestContext {
    pub(crate) fn new(
        id: TestId,
        fixtures: Option<Rc<Fixtures>>,
        capture: OutputCapture,
        fail_fast: bool,
    ) -> Self {
        TestContext {
            id,
            state: HashMap::new(),
            fixtures,
            cleanups: Vec::new(),
            capture,
            work_dir: None,
            active_subtest: None,
            fail_fast,
            expecting_failure: false,
            success: true,
            expected_failure: None,
            subtests: Vec::new(),
        }
    }

    pub fn id(&self) -> &TestId {
        &self.id
    }

    /// Store a value for later steps of this unit, returning any previous one
    pub fn insert<T: 'static>(&mut self, value: T) -> Option<T> {
        self.state
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.state.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.state.get_mut(&TypeId::of::<T>())?.downcast_mut::<T>()
    }

    /// Like [`get`](Self::get) but a missing value is an error
    pub fn require<T: 'static>(&self) -> Result<&T> {
        self.get::<T>().ok_or_else(|| {
            Error::Generic(format!(
                "no {} stored in the test context",
                std::any::type_name::<T>()
            ))
        })
    }

    /// A value created by an enclosing suite's set-up
    pub fn fixture<T: 'static>(&self) -> Option<&T> {
        self.fixtures.as_deref()?.get::<T>()
    }

    /// Register `f` to run after tear-down, most recent first
    pub fn add_cleanup<F>(&mut self, f: F)
    where
        F: FnOnce() -> anyhow::Result<()> + 'static,
    {
        self.cleanups.push(Cleanup::Sync(Box::new(f)));
    }

    /// Register a suspending cleanup, driven on this unit's runtime
    pub fn add_async_cleanup<F>(&mut self, cleanup: F)
    where
        F: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.cleanups.push(Cleanup::Async(Box::pin(cleanup)));
    }

    pub(crate) fn pop_cleanup(&mut self) -> Option<Cleanup> {
        self.cleanups.pop()
    }

    /// Standard output for this unit; buffered when the run buffers
    pub fn stdout(&self) -> CaptureWriter {
        self.capture.stdout()
    }

    pub fn stderr(&self) -> CaptureWriter {
        self.capture.stderr()
    }

    /// A scratch directory, created on first use and removed after cleanups
    pub fn work_dir(&mut self) -> Result<&Path> {
        let dir = match self.work_dir.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new().prefix("testunit").tempdir()?,
        };
        Ok(self.work_dir.insert(dir).path())
    }

    /// Run `f` as a subtest
    ///
    /// A failing subtest is recorded under its own label and the body carries
    /// on. The returned error is only the stop signal (fail-fast, or the first
    /// failure of an expected-failure unit) and should be propagated with `?`.
    pub fn subtest<F>(&mut self, label: impl Into<SubTest>, f: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut TestContext) -> anyhow::Result<()>,
    {
        let label: SubTest = label.into();
        let outer = self.active_subtest.take();
        let label = match &outer {
            Some(outer) => label.nested_in(outer),
            None => label,
        };
        self.active_subtest = Some(label.clone());
        let outcome = match catch_unwind(AssertUnwindSafe(|| f(self))) {
            Ok(Ok(())) => Outcome::Success,
            Ok(Err(error)) => execution::classify(&error),
            Err(payload) => Outcome::Failure(Failure::new(execution::panic_message(&*payload))),
        };
        self.active_subtest = outer;
        self.settle_subtest(label, outcome)
    }

    /// Record the result of a block run as a subtest by the caller
    ///
    /// For suspending bodies, which cannot hand a future to [`subtest`](Self::subtest).
    pub fn subtest_result(
        &mut self,
        label: impl Into<SubTest>,
        outcome: anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let outcome = match outcome {
            Ok(()) => Outcome::Success,
            Err(error) => execution::classify(&error),
        };
        self.settle_subtest(label.into(), outcome)
    }

    fn settle_subtest(&mut self, label: SubTest, outcome: Outcome) -> anyhow::Result<()> {
        let id = self.id.with_subtest(label.to_string());
        match outcome {
            Outcome::Failure(failure) | Outcome::Error(failure) if self.expecting_failure => {
                tracing::debug!(test = %id, "subtest failed as expected");
                self.expected_failure = Some(failure);
            }
            Outcome::Success => self.subtests.push((id, Outcome::Success)),
            other => {
                self.success = false;
                self.subtests.push((id, other));
            }
        }
        if (!self.success && self.fail_fast) || self.expected_failure.is_some() {
            return Err(Error::Stop.into());
        }
        Ok(())
    }

    pub(crate) fn take_subtests(&mut self) -> Vec<(TestId, Outcome)> {
        std::mem::take(&mut self.subtests)
    }
}

impl fmt::Debug for TestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestContext")
            .field("id", &self.id)
            .field("state", &self.state.len())
            .field("cleanups", &self.cleanups.len())
            .field("success", &self.success)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::{assert_equal, skip_test};

    fn context(fail_fast: bool) -> TestContext {
        TestContext::new(
            TestId::new("mod.Case.test_x"),
            None,
            OutputCapture::new(false),
            fail_fast,
        )
    }

    #[test]
    fn test_typed_state() {
        let mut ctx = context(false);
        assert_eq!(ctx.insert(String::from("a")), None);
        assert_eq!(ctx.insert(String::from("b")).as_deref(), Some("a"));
        ctx.get_mut::<String>().unwrap().push('!');
        assert_eq!(ctx.get::<String>().map(String::as_str), Some("b!"));
        assert!(ctx.require::<u8>().is_err());
    }

    #[test]
    fn test_work_dir_is_stable_and_removed() {
        let mut ctx = context(false);
        let first = ctx.work_dir().unwrap().to_path_buf();
        std::fs::write(first.join("payload.json"), "{}").unwrap();
        assert_eq!(ctx.work_dir().unwrap(), first.as_path());
        drop(ctx);
        assert!(!first.exists());
    }

    #[test]
    fn test_subtest_labels() {
        assert_eq!(SubTest::new().to_string(), "(<subtest>)");
        let label = SubTest::from("lookup").param("key", "a").param("n", 2);
        assert_eq!(label.to_string(), "[lookup] (key='a', n=2)");
        let nested = SubTest::new().param("n", 3).nested_in(&label);
        assert_eq!(nested.to_string(), "(key='a', n=3)");
    }

    #[test]
    fn test_subtests_continue_after_failure() {
        let mut ctx = context(false);
        for i in 0..3 {
            ctx.subtest(SubTest::new().param("i", i), |_| Ok(assert_equal(i % 2, 0)?))
                .unwrap();
        }
        ctx.subtest("skipped", |_| Ok(skip_test("later")?)).unwrap();
        assert!(!ctx.success);
        let recorded = ctx.take_subtests();
        assert_eq!(recorded.len(), 4);
        assert_eq!(recorded[1].0.subtest(), Some("(i=1)"));
        assert!(matches!(recorded[1].1, Outcome::Failure(_)));
        assert!(matches!(recorded[3].1, Outcome::Skip(_)));
    }

    #[test]
    fn test_subtest_stops_under_fail_fast() {
        let mut ctx = context(true);
        let err = ctx
            .subtest("first", |_| Err(anyhow::anyhow!("boom")))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Stop)));
    }

    #[test]
    fn test_subtest_panic_is_a_failure() {
        let mut ctx = context(false);
        ctx.subtest("panics", |_| -> anyhow::Result<()> { panic!("index out of range") })
            .unwrap();
        let recorded = ctx.take_subtests();
        match &recorded[0].1 {
            Outcome::Failure(failure) => assert!(failure.message.contains("index out of range")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_expected_failure_subtest_stops_body() {
        let mut ctx = context(false);
        ctx.expecting_failure = true;
        assert!(ctx.subtest("fails", |_| Err(anyhow::anyhow!("boom"))).is_err());
        assert!(ctx.success);
        assert!(ctx.expected_failure.is_some());
        assert!(ctx.take_subtests().is_empty());
    }
}
