//! Test units: one runnable test with its hooks and markers

use crate::result::TestResult;
use crate::run::{execution, TestContext};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A boxed future borrowing the test context
pub type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Type alias for a synchronous step (set-up, body or tear-down)
pub type SyncStepFn = Box<dyn Fn(&mut TestContext) -> anyhow::Result<()>>;

/// Type alias for a suspending step
pub type AsyncStepFn =
    Box<dyn for<'a> Fn(&'a mut TestContext) -> LocalFuture<'a, anyhow::Result<()>>>;

/// One phase of a unit's lifecycle
pub enum Step {
    Sync(SyncStepFn),
    Async(AsyncStepFn),
}

impl Step {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut TestContext) -> anyhow::Result<()> + 'static,
    {
        Step::Sync(Box::new(f))
    }

    pub fn suspending<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> LocalFuture<'a, anyhow::Result<()>> + 'static,
    {
        Step::Async(Box::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Step::Async(_))
    }
}

/// Qualified identity of a test, e.g. `test_utils.TestGetJson.test_get_json`
///
/// Subtests share their parent's name and add a label such as
/// `[lookup] (key='a')`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestId {
    name: String,
    subtest: Option<String>,
}

impl TestId {
    pub fn new(name: impl Into<String>) -> Self {
        TestId {
            name: name.into(),
            subtest: None,
        }
    }

    /// The unit's qualified name (for a subtest, its parent's)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subtest(&self) -> Option<&str> {
        self.subtest.as_deref()
    }

    pub fn is_subtest(&self) -> bool {
        self.subtest.is_some()
    }

    pub(crate) fn with_subtest(&self, label: String) -> TestId {
        TestId {
            name: self.name.clone(),
            subtest: Some(label),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtest {
            Some(label) => write!(f, "{} {}", self.name, label),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Metadata attached to a unit at construction and resolved before it runs
pub enum Marker {
    Normal,
    Skip(String),
    SkipIf(Box<dyn Fn() -> bool>, String),
    ExpectedFailure,
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Normal => write!(f, "Normal"),
            Marker::Skip(reason) => write!(f, "Skip({:?})", reason),
            Marker::SkipIf(_, reason) => write!(f, "SkipIf(.., {:?})", reason),
            Marker::ExpectedFailure => write!(f, "ExpectedFailure"),
        }
    }
}

/// One test with its per-invocation hooks
///
/// # Examples
///
/// ```
/// use testunit_rs::{assertions::assert_equal, TestResult, TestUnit};
///
/// let unit = TestUnit::new("math.TestAdd.test_add", |_ctx| {
///     assert_equal(1 + 1, 2)?;
///     Ok(())
/// });
///
/// let mut result = TestResult::new();
/// unit.run(&mut result);
/// assert!(result.was_successful());
/// ```
pub struct TestUnit {
    id: TestId,
    set_up: Option<Step>,
    body: Step,
    tear_down: Option<Step>,
    markers: Vec<Marker>,
}

impl TestUnit {
    /// Create a unit with a synchronous body
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestContext) -> anyhow::Result<()> + 'static,
    {
        Self::with_body(name, Step::sync(body))
    }

    /// Create a unit with a suspending body
    ///
    /// The body is driven to completion on a single-threaded runtime that
    /// lives for this unit only.
    pub fn new_async<F>(name: impl Into<String>, body: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> LocalFuture<'a, anyhow::Result<()>> + 'static,
    {
        Self::with_body(name, Step::suspending(body))
    }

    pub fn with_body(name: impl Into<String>, body: Step) -> Self {
        TestUnit {
            id: TestId::new(name),
            set_up: None,
            body,
            tear_down: None,
            markers: Vec::new(),
        }
    }

    pub fn set_up<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext) -> anyhow::Result<()> + 'static,
    {
        self.set_up = Some(Step::sync(f));
        self
    }

    pub fn set_up_async<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> LocalFuture<'a, anyhow::Result<()>> + 'static,
    {
        self.set_up = Some(Step::suspending(f));
        self
    }

    pub fn tear_down<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut TestContext) -> anyhow::Result<()> + 'static,
    {
        self.tear_down = Some(Step::sync(f));
        self
    }

    pub fn tear_down_async<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut TestContext) -> LocalFuture<'a, anyhow::Result<()>> + 'static,
    {
        self.tear_down = Some(Step::suspending(f));
        self
    }

    pub fn marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn skip(self, reason: impl Into<String>) -> Self {
        self.marker(Marker::Skip(reason.into()))
    }

    pub fn skip_if<P>(self, predicate: P, reason: impl Into<String>) -> Self
    where
        P: Fn() -> bool + 'static,
    {
        self.marker(Marker::SkipIf(Box::new(predicate), reason.into()))
    }

    pub fn expected_failure(self) -> Self {
        self.marker(Marker::ExpectedFailure)
    }

    pub fn id(&self) -> &TestId {
        &self.id
    }

    /// Whether any phase suspends
    pub fn is_async(&self) -> bool {
        self.body.is_async()
            || self.set_up.as_ref().is_some_and(Step::is_async)
            || self.tear_down.as_ref().is_some_and(Step::is_async)
    }

    /// The reason this unit should be skipped without running, if any
    pub fn skip_reason(&self) -> Option<String> {
        self.markers.iter().find_map(|marker| match marker {
            Marker::Skip(reason) => Some(reason.clone()),
            Marker::SkipIf(predicate, reason) if predicate() => Some(reason.clone()),
            _ => None,
        })
    }

    pub fn is_expected_failure(&self) -> bool {
        self.markers
            .iter()
            .any(|marker| matches!(marker, Marker::ExpectedFailure))
    }

    pub(crate) fn set_up_step(&self) -> Option<&Step> {
        self.set_up.as_ref()
    }

    pub(crate) fn body(&self) -> &Step {
        &self.body
    }

    pub(crate) fn tear_down_step(&self) -> Option<&Step> {
        self.tear_down.as_ref()
    }

    /// Run one full lifecycle, recording exactly one primary outcome into `result`
    pub fn run(&self, result: &mut TestResult) {
        execution::run_unit(self, result, None);
    }
}

impl fmt::Debug for TestUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestUnit")
            .field("id", &self.id)
            .field("async", &self.is_async())
            .field("markers", &self.markers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_resolve_before_running() {
        let plain = TestUnit::new("t.plain", |_| Ok(()));
        assert_eq!(plain.skip_reason(), None);
        assert!(!plain.is_expected_failure());

        let skipped = TestUnit::new("t.skipped", |_| Ok(())).skip_if(|| true, "not on this platform");
        assert_eq!(skipped.skip_reason().as_deref(), Some("not on this platform"));

        let kept = TestUnit::new("t.kept", |_| Ok(()))
            .skip_if(|| false, "never")
            .expected_failure();
        assert_eq!(kept.skip_reason(), None);
        assert!(kept.is_expected_failure());
    }

    #[test]
    fn subtest_ids_display_with_label() {
        let id = TestId::new("mod.Case.test_x");
        let sub = id.with_subtest("(i=1)".to_string());
        assert_eq!(sub.to_string(), "mod.Case.test_x (i=1)");
        assert_eq!(sub.name(), id.name());
        assert!(sub.is_subtest());
    }

    #[test]
    fn async_detection_covers_every_phase() {
        async fn noop(_ctx: &mut TestContext) -> anyhow::Result<()> {
            Ok(())
        }
        let unit = TestUnit::new("t.mixed", |_| Ok(())).tear_down_async(|ctx| Box::pin(noop(ctx)));
        assert!(unit.is_async());
        assert!(!TestUnit::new("t.sync", |_| Ok(())).is_async());
    }
}
