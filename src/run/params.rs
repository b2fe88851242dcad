//! Configuration parameters for test execution

use crate::result::TestResult;
use std::time::Duration;

/// Configuration parameters for running a suite
#[derive(Clone, Debug)]
pub struct RunParams {
    /// Stop after the first failure, error or unexpected success
    pub fail_fast: bool,
    /// Capture context output per unit and attach it to failures only;
    /// `println!` is not redirected
    pub buffer: bool,
    /// Record the elapsed time of every unit
    pub record_durations: bool,
    /// Time budget for each suspending step
    pub timeout: Option<Duration>,
    /// Time budget for tear-down and cleanups once a step has timed out
    pub cleanup_grace: Duration,
}

impl RunParams {
    /// Create a new RunParams, taking defaults from the environment
    pub fn new() -> Self {
        RunParams {
            fail_fast: Self::env_flag("TESTUNIT_FAILFAST"),
            buffer: Self::env_flag("TESTUNIT_BUFFER"),
            record_durations: Self::env_flag("TESTUNIT_DURATIONS"),
            timeout: Self::env_millis("TESTUNIT_TIMEOUT_MS"),
            cleanup_grace: Duration::from_secs(1),
        }
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn buffer(mut self, buffer: bool) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn durations(mut self, record: bool) -> Self {
        self.record_durations = record;
        self
    }

    pub fn timeout(mut self, budget: Duration) -> Self {
        self.timeout = Some(budget);
        self
    }

    pub fn cleanup_grace(mut self, grace: Duration) -> Self {
        self.cleanup_grace = grace;
        self
    }

    /// A fresh result carrying these settings
    pub fn make_result(&self) -> TestResult {
        let mut result = TestResult::new();
        result.failfast = self.fail_fast;
        result.buffer = self.buffer;
        result.record_durations = self.record_durations;
        result.timeout = self.timeout;
        result.cleanup_grace = self.cleanup_grace;
        result
    }

    /// `1` or `true` (any case) turns a flag on
    fn env_flag(name: &str) -> bool {
        std::env::var(name)
            .map(|v| Self::parse_flag(&v))
            .unwrap_or(false)
    }

    fn parse_flag(value: &str) -> bool {
        value == "1" || value.eq_ignore_ascii_case("true")
    }

    fn env_millis(name: &str) -> Option<Duration> {
        let value = std::env::var(name).ok()?;
        match value.trim().parse::<u64>() {
            Ok(ms) => Some(Duration::from_millis(ms)),
            Err(_) => {
                tracing::warn!(var = name, %value, "ignoring non-numeric timeout");
                None
            }
        }
    }
}

impl Default for RunParams {
    fn default() -> Self {
        Self::new()
    }
}
