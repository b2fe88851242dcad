//! # testunit-rs
//!
//! A Rust crate for running unit-test suites: units with set-up, tear-down
//! and cleanups, nested suites with shared fixtures, subtests, suspending
//! tests, and call-recording mocks for verifying how code under test talks
//! to its collaborators.
//!
//! The engine consumes a [`TestSuite`] and produces a [`TestResult`]; finding
//! tests and printing reports are left to the caller.

pub mod assertions;
pub mod error;
pub mod mock;
pub mod result;
pub mod run;
pub mod suite;
pub mod unit;

pub use error::{Error, Result};
pub use mock::{Mock, Spec, Value, ANY};
pub use result::{Failure, Outcome, RunSummary, TestResult};
pub use run::{RunParams, SubTest, TestContext, TestRunner};
pub use suite::{Fixtures, SuiteItem, TestSuite};
pub use unit::{LocalFuture, Marker, Step, TestId, TestUnit};

use std::time::Duration;

/// Builder for configuring and running a suite
///
/// This provides a fluent interface over [`RunParams`] and [`TestRunner`].
///
/// # Examples
///
/// ```
/// use testunit_rs::{assertions::assert_equal, testunit, TestSuite, TestUnit};
///
/// let suite = TestSuite::new("math")
///     .with(TestUnit::new("math.test_add", |_| Ok(assert_equal(1 + 1, 2)?)))
///     .with(TestUnit::new("math.test_sub", |_| Ok(assert_equal(2 - 1, 1)?)));
///
/// let result = testunit::run(&suite).fail_fast(true).buffer(true).execute();
/// assert!(result.was_successful());
/// assert_eq!(result.tests_run, 2);
/// ```
pub struct Builder<'s> {
    suite: &'s TestSuite,
    params: RunParams,
}

impl<'s> Builder<'s> {
    fn new(suite: &'s TestSuite) -> Self {
        Self {
            suite,
            params: RunParams::new(),
        }
    }

    /// Stop after the first failure, error or unexpected success
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.params = self.params.fail_fast(fail_fast);
        self
    }

    /// Capture each unit's output and attach it only to failures
    ///
    /// Only output written through [`TestContext::stdout`] and
    /// [`TestContext::stderr`] is captured; `println!` still reaches the
    /// process streams.
    pub fn buffer(mut self, buffer: bool) -> Self {
        self.params = self.params.buffer(buffer);
        self
    }

    /// Record how long each unit took
    pub fn durations(mut self, record: bool) -> Self {
        self.params = self.params.durations(record);
        self
    }

    /// Give every suspending step at most `budget`
    pub fn timeout(mut self, budget: Duration) -> Self {
        self.params = self.params.timeout(budget);
        self
    }

    pub fn cleanup_grace(mut self, grace: Duration) -> Self {
        self.params = self.params.cleanup_grace(grace);
        self
    }

    /// Run the suite and return the finished result
    ///
    /// The process exit status is the caller's business; map
    /// `was_successful() == false` to a non-zero code.
    pub fn execute(self) -> TestResult {
        TestRunner::new(self.params).run(self.suite)
    }
}

/// Create a new builder for the given suite
///
/// This is the main entry point for running tests.
pub mod testunit {
    use super::*;

    pub fn run(suite: &TestSuite) -> Builder<'_> {
        Builder::new(suite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertions::assert_equal;

    #[test]
    fn basic_integration_test() {
        let suite = TestSuite::new("t")
            .with(TestUnit::new("t.pass", |_| Ok(())))
            .with(TestUnit::new("t.fail", |_| Ok(assert_equal("a", "b")?)));

        let result = testunit::run(&suite).execute();
        assert_eq!(result.tests_run, 2);
        assert_eq!(result.failures.len(), 1);
        assert!(!result.was_successful());
    }

    #[test]
    fn test_durations_follow_builder() {
        let suite = TestSuite::new("t").with(TestUnit::new("t.pass", |_| Ok(())));
        let result = testunit::run(&suite).durations(true).execute();
        assert_eq!(result.durations.len(), 1);
        let result = testunit::run(&suite).durations(false).execute();
        assert!(result.durations.is_empty());
    }
}
