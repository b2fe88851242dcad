//! Test execution module

pub mod environment;
pub(crate) mod execution;
pub mod params;

// Re-export public types
pub use environment::{SubTest, TestContext};
pub use params::RunParams;

use crate::result::TestResult;
use crate::suite::TestSuite;

/// Drives a suite against a fresh result and hands the finished result back
///
/// The runner does no formatting of its own; reporters read the returned
/// [`TestResult`].
#[derive(Debug, Default)]
pub struct TestRunner {
    params: RunParams,
}

impl TestRunner {
    pub fn new(params: RunParams) -> Self {
        TestRunner { params }
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn run(&self, suite: &TestSuite) -> TestResult {
        let mut result = self.params.make_result();
        self.run_with(suite, &mut result);
        result
    }

    /// Run into an existing result, e.g. one shared by several suites
    pub fn run_with(&self, suite: &TestSuite, result: &mut TestResult) {
        result.start_test_run();
        suite.run(result);
        result.stop_test_run();
    }
}

/// Run a suite with settings taken from the environment
pub fn run_suite(suite: &TestSuite) -> TestResult {
    TestRunner::new(RunParams::new()).run(suite)
}
