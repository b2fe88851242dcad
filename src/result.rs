//! The mutable ledger a run records its outcomes into

use crate::unit::TestId;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;

/// Detail attached to a failure, error or expected failure
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Human-readable message of the outermost error
    pub message: String,
    /// Messages of the underlying causes, outermost first
    pub causes: Vec<String>,
    /// Output captured while the unit ran (buffered runs only)
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Failure {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Keep the whole causal chain of `error`
    pub fn from_error(error: &anyhow::Error) -> Self {
        Failure {
            message: error.to_string(),
            causes: error.chain().skip(1).map(ToString::to_string).collect(),
            ..Default::default()
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.causes.is_empty() {
            write!(f, "\n\nCaused by:")?;
            for cause in &self.causes {
                write!(f, "\n    {}", cause)?;
            }
        }
        if let Some(out) = &self.stdout {
            write!(f, "\n\nStdout:\n{}", out)?;
        }
        if let Some(err) = &self.stderr {
            write!(f, "\n\nStderr:\n{}", err)?;
        }
        Ok(())
    }
}

/// Classified outcome of one lifecycle phase or subtest
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Success,
    Skip(String),
    Failure(Failure),
    Error(Failure),
}

#[derive(Clone, Copy, Debug)]
enum Stream {
    Stdout,
    Stderr,
}

/// Per-unit capture of standard output and error
///
/// With buffering off, writers pass straight through to the process streams.
#[derive(Clone, Debug, Default)]
pub struct OutputCapture {
    enabled: bool,
    stdout: Rc<RefCell<Vec<u8>>>,
    stderr: Rc<RefCell<Vec<u8>>>,
}

impl OutputCapture {
    pub fn new(enabled: bool) -> Self {
        OutputCapture {
            enabled,
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stdout(&self) -> CaptureWriter {
        CaptureWriter {
            stream: Stream::Stdout,
            buffer: self.enabled.then(|| self.stdout.clone()),
        }
    }

    pub fn stderr(&self) -> CaptureWriter {
        CaptureWriter {
            stream: Stream::Stderr,
            buffer: self.enabled.then(|| self.stderr.clone()),
        }
    }

    fn text(buffer: &RefCell<Vec<u8>>) -> Option<String> {
        let bytes = buffer.borrow();
        (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned())
    }

    fn clear(&self) {
        self.stdout.borrow_mut().clear();
        self.stderr.borrow_mut().clear();
    }
}

/// A writer handed to test code by [`TestContext`](crate::TestContext)
pub struct CaptureWriter {
    stream: Stream,
    buffer: Option<Rc<RefCell<Vec<u8>>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match (&self.buffer, self.stream) {
            (Some(buffer), _) => {
                buffer.borrow_mut().extend_from_slice(buf);
                Ok(buf.len())
            }
            (None, Stream::Stdout) => io::stdout().write(buf),
            (None, Stream::Stderr) => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match (&self.buffer, self.stream) {
            (Some(_), _) => Ok(()),
            (None, Stream::Stdout) => io::stdout().flush(),
            (None, Stream::Stderr) => io::stderr().flush(),
        }
    }
}

/// Counters and verdict of a finished run, for reporters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub tests_started: usize,
    pub tests_run: usize,
    pub successes: usize,
    pub errors: usize,
    pub failures: usize,
    pub skipped: usize,
    pub expected_failures: usize,
    pub unexpected_successes: usize,
    pub successful: bool,
}

/// The outcome ledger of a run
///
/// Every classified mapping is append-only. Outcomes for a unit may only be
/// added between its `start_test` and `stop_test`; fixture outcomes, which
/// belong to no unit, go through [`TestResult::add_fixture_outcome`].
#[derive(Debug)]
pub struct TestResult {
    pub tests_started: usize,
    pub tests_run: usize,
    pub successes: Vec<TestId>,
    pub errors: Vec<(TestId, Failure)>,
    pub failures: Vec<(TestId, Failure)>,
    pub skipped: Vec<(TestId, String)>,
    pub expected_failures: Vec<(TestId, Failure)>,
    pub unexpected_successes: Vec<TestId>,
    pub durations: Vec<(TestId, Duration)>,
    pub should_stop: bool,
    pub failfast: bool,
    /// Capture output written through `TestContext::stdout`/`stderr` and
    /// attach it to failures. `println!` and other writes to the process
    /// streams are not captured.
    pub buffer: bool,
    pub record_durations: bool,
    /// Budget for each suspending step
    pub timeout: Option<Duration>,
    /// Budget for tear-down and cleanups after a timeout
    pub cleanup_grace: Duration,
    active: Option<String>,
    capture: OutputCapture,
}

impl Default for TestResult {
    fn default() -> Self {
        Self::new()
    }
}

impl TestResult {
    pub fn new() -> Self {
        TestResult {
            tests_started: 0,
            tests_run: 0,
            successes: Vec::new(),
            errors: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            expected_failures: Vec::new(),
            unexpected_successes: Vec::new(),
            durations: Vec::new(),
            should_stop: false,
            failfast: false,
            buffer: false,
            record_durations: false,
            timeout: None,
            cleanup_grace: Duration::from_secs(1),
            active: None,
            capture: OutputCapture::default(),
        }
    }

    pub fn start_test_run(&mut self) {
        tracing::info!(
            failfast = self.failfast,
            buffer = self.buffer,
            "test run started"
        );
    }

    pub fn stop_test_run(&mut self) {
        tracing::info!(
            tests_run = self.tests_run,
            failures = self.failures.len(),
            errors = self.errors.len(),
            skipped = self.skipped.len(),
            successful = self.was_successful(),
            "test run finished"
        );
    }

    pub fn start_test(&mut self, id: &TestId) {
        tracing::debug!(test = %id, "test started");
        self.tests_started += 1;
        self.active = Some(id.name().to_string());
        self.capture = OutputCapture::new(self.buffer);
    }

    pub fn stop_test(&mut self, id: &TestId) {
        self.check_active(id);
        tracing::debug!(test = %id, "test stopped");
        self.tests_run += 1;
        self.active = None;
        self.capture.clear();
    }

    /// Capture handle for the unit currently running
    pub fn capture(&self) -> OutputCapture {
        self.capture.clone()
    }

    fn check_active(&self, id: &TestId) {
        debug_assert_eq!(
            self.active.as_deref(),
            Some(id.name()),
            "outcome for '{}' recorded outside its start_test/stop_test",
            id
        );
    }

    fn attach_output(&self, mut failure: Failure) -> Failure {
        if self.capture.is_enabled() {
            failure.stdout = OutputCapture::text(&self.capture.stdout);
            failure.stderr = OutputCapture::text(&self.capture.stderr);
        }
        failure
    }

    fn fail_fast(&mut self) {
        if self.failfast {
            self.stop();
        }
    }

    pub fn add_success(&mut self, id: &TestId) {
        self.check_active(id);
        self.successes.push(id.clone());
    }

    pub fn add_error(&mut self, id: &TestId, failure: Failure) {
        self.check_active(id);
        tracing::debug!(test = %id, message = %failure.message, "test error");
        let failure = self.attach_output(failure);
        self.errors.push((id.clone(), failure));
        self.fail_fast();
    }

    pub fn add_failure(&mut self, id: &TestId, failure: Failure) {
        self.check_active(id);
        tracing::debug!(test = %id, message = %failure.message, "test failure");
        let failure = self.attach_output(failure);
        self.failures.push((id.clone(), failure));
        self.fail_fast();
    }

    pub fn add_skip(&mut self, id: &TestId, reason: impl Into<String>) {
        self.check_active(id);
        self.skipped.push((id.clone(), reason.into()));
    }

    pub fn add_expected_failure(&mut self, id: &TestId, failure: Failure) {
        self.check_active(id);
        let failure = self.attach_output(failure);
        self.expected_failures.push((id.clone(), failure));
    }

    pub fn add_unexpected_success(&mut self, id: &TestId) {
        self.check_active(id);
        self.unexpected_successes.push(id.clone());
        self.fail_fast();
    }

    /// Record the outcome of one subtest; successes leave no entry
    pub fn add_subtest(&mut self, id: &TestId, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                self.check_active(id);
                tracing::trace!(test = %id, "subtest passed");
            }
            Outcome::Skip(reason) => self.add_skip(id, reason),
            Outcome::Failure(failure) => self.add_failure(id, failure),
            Outcome::Error(failure) => self.add_error(id, failure),
        }
    }

    pub fn add_duration(&mut self, id: &TestId, elapsed: Duration) {
        self.check_active(id);
        if self.record_durations {
            self.durations.push((id.clone(), elapsed));
        }
    }

    /// Record an outcome of a suite fixture, which is not itself a test
    pub fn add_fixture_outcome(&mut self, id: &TestId, outcome: Outcome) {
        tracing::warn!(fixture = %id, ?outcome, "suite fixture did not complete");
        match outcome {
            Outcome::Success => {}
            Outcome::Skip(reason) => self.skipped.push((id.clone(), reason)),
            Outcome::Failure(failure) | Outcome::Error(failure) => {
                self.errors.push((id.clone(), failure));
                self.fail_fast();
            }
        }
    }

    /// Ask the run to stop; idempotent
    pub fn stop(&mut self) {
        if !self.should_stop {
            tracing::debug!("stop requested");
        }
        self.should_stop = true;
    }

    /// No errors, failures or unexpected successes
    pub fn was_successful(&self) -> bool {
        self.errors.is_empty() && self.failures.is_empty() && self.unexpected_successes.is_empty()
    }

    /// Fold a result from another shard into this one
    pub fn merge(&mut self, other: TestResult) {
        self.tests_started += other.tests_started;
        self.tests_run += other.tests_run;
        self.successes.extend(other.successes);
        self.errors.extend(other.errors);
        self.failures.extend(other.failures);
        self.skipped.extend(other.skipped);
        self.expected_failures.extend(other.expected_failures);
        self.unexpected_successes.extend(other.unexpected_successes);
        self.durations.extend(other.durations);
        self.should_stop |= other.should_stop;
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            tests_started: self.tests_started,
            tests_run: self.tests_run,
            successes: self.successes.len(),
            errors: self.errors.len(),
            failures: self.failures.len(),
            skipped: self.skipped.len(),
            expected_failures: self.expected_failures.len(),
            unexpected_successes: self.unexpected_successes.len(),
            successful: self.was_successful(),
        }
    }
}
