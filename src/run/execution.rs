//! Lifecycle execution for units and suites

use crate::error::Error;
use crate::result::{Failure, Outcome, TestResult};
use crate::run::environment::{Cleanup, TestContext};
use crate::suite::{Fixtures, TestSuite, SuiteItem};
use crate::unit::{Step, TestId, TestUnit};
use std::any::Any;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

/// Map an error returned by a step onto the outcome it records
///
/// The stop signal is not an outcome of its own: whatever stopped the body
/// has already been recorded.
pub(crate) fn classify(error: &anyhow::Error) -> Outcome {
    match error.downcast_ref::<Error>() {
        Some(Error::Skip { reason }) => Outcome::Skip(reason.clone()),
        Some(Error::Raised(inner)) => match classify(inner) {
            Outcome::Failure(_) => Outcome::Failure(Failure::from_error(error)),
            Outcome::Error(_) => Outcome::Error(Failure::from_error(error)),
            other => other,
        },
        Some(Error::Stop) => Outcome::Success,
        Some(e) if e.is_failure() => Outcome::Failure(Failure::from_error(error)),
        _ => Outcome::Error(Failure::from_error(error)),
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    };
    format!("panicked: {}", detail)
}

/// Await `fut`, giving up once `budget` has elapsed
async fn with_budget<F>(fut: F, budget: Option<Duration>) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>>,
{
    match budget {
        Some(budget) => match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { budget }.into()),
        },
        None => fut.await,
    }
}

/// Drives one unit's steps, owning its single-threaded runtime
struct Driver {
    runtime: Option<Runtime>,
    timeout: Option<Duration>,
    grace: Duration,
    timed_out: bool,
}

impl Driver {
    fn new(result: &TestResult) -> Self {
        Driver {
            runtime: None,
            timeout: result.timeout,
            grace: result.cleanup_grace,
            timed_out: false,
        }
    }

    /// The unit's runtime, built on first suspending step
    fn runtime(&mut self) -> crate::Result<&Runtime> {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?,
        };
        Ok(self.runtime.insert(runtime))
    }

    fn budget(&self) -> Option<Duration> {
        if self.timed_out {
            Some(self.grace)
        } else {
            self.timeout
        }
    }

    fn block_on<F>(&mut self, fut: F) -> std::thread::Result<anyhow::Result<()>>
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let budget = self.budget();
        let runtime = match self.runtime() {
            Ok(runtime) => runtime,
            Err(e) => return Ok(Err(e.into())),
        };
        let caught = catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(with_budget(fut, budget))
        }));
        if caught.is_err() {
            // a panicking future may leave tasks behind; start the next step clean
            self.runtime = None;
        }
        caught
    }

    fn run_step(&mut self, step: &Step, ctx: &mut TestContext) -> Outcome {
        let caught = match step {
            Step::Sync(f) => catch_unwind(AssertUnwindSafe(|| f(ctx))),
            Step::Async(f) => self.block_on(f(ctx)),
        };
        self.settle(caught)
    }

    fn run_cleanup(&mut self, cleanup: Cleanup) -> Outcome {
        let caught = match cleanup {
            Cleanup::Sync(f) => catch_unwind(AssertUnwindSafe(f)),
            Cleanup::Async(fut) => self.block_on(fut),
        };
        self.settle(caught)
    }

    fn settle(&mut self, caught: std::thread::Result<anyhow::Result<()>>) -> Outcome {
        match caught {
            Ok(Ok(())) => Outcome::Success,
            Ok(Err(error)) => {
                if let Some(Error::Timeout { budget }) = error.downcast_ref::<Error>() {
                    tracing::warn!(?budget, "step timed out; remaining steps get the grace period");
                    self.timed_out = true;
                }
                classify(&error)
            }
            Err(payload) => Outcome::Failure(Failure::new(panic_message(&*payload))),
        }
    }
}

/// Record the outcome of one lifecycle phase of `id`
fn record_phase(ctx: &mut TestContext, result: &mut TestResult, id: &TestId, outcome: Outcome) {
    match outcome {
        Outcome::Success => {}
        Outcome::Skip(reason) => {
            ctx.success = false;
            result.add_skip(id, reason);
        }
        Outcome::Failure(failure) | Outcome::Error(failure) if ctx.expecting_failure => {
            ctx.expected_failure = Some(failure);
        }
        Outcome::Failure(failure) => {
            ctx.success = false;
            result.add_failure(id, failure);
        }
        Outcome::Error(failure) => {
            ctx.success = false;
            result.add_error(id, failure);
        }
    }
}

/// Move the subtest outcomes a phase queued on `ctx` into `result`
fn flush_subtests(ctx: &mut TestContext, result: &mut TestResult) {
    for (sub_id, sub_outcome) in ctx.take_subtests() {
        result.add_subtest(&sub_id, sub_outcome);
    }
}

/// Run one unit's full lifecycle into `result`
pub(crate) fn run_unit(unit: &TestUnit, result: &mut TestResult, fixtures: Option<Rc<Fixtures>>) {
    let id = unit.id();
    let started = Instant::now();
    result.start_test(id);

    if let Some(reason) = unit.skip_reason() {
        tracing::debug!(test = %id, %reason, "skipped before running");
        result.add_skip(id, reason);
    } else {
        run_lifecycle(unit, result, fixtures);
    }

    result.add_duration(id, started.elapsed());
    result.stop_test(id);
}

fn run_lifecycle(unit: &TestUnit, result: &mut TestResult, fixtures: Option<Rc<Fixtures>>) {
    let id = unit.id();
    let mut ctx = TestContext::new(id.clone(), fixtures, result.capture(), result.failfast);
    let mut driver = Driver::new(result);

    if let Some(set_up) = unit.set_up_step() {
        let outcome = match driver.run_step(set_up, &mut ctx) {
            Outcome::Failure(failure) => Outcome::Error(failure),
            other => other,
        };
        flush_subtests(&mut ctx, result);
        record_phase(&mut ctx, result, id, outcome);
    }

    if ctx.success {
        ctx.expecting_failure = unit.is_expected_failure();
        let outcome = driver.run_step(unit.body(), &mut ctx);
        flush_subtests(&mut ctx, result);
        record_phase(&mut ctx, result, id, outcome);
        ctx.expecting_failure = false;

        if let Some(tear_down) = unit.tear_down_step() {
            let outcome = driver.run_step(tear_down, &mut ctx);
            flush_subtests(&mut ctx, result);
            if !matches!(outcome, Outcome::Success) {
                tracing::warn!(test = %id, "tear-down did not complete");
            }
            record_phase(&mut ctx, result, id, outcome);
        }
    } else {
        tracing::debug!(test = %id, "set-up did not complete; skipping body and tear-down");
    }

    while let Some(cleanup) = ctx.pop_cleanup() {
        let outcome = driver.run_cleanup(cleanup);
        if !matches!(outcome, Outcome::Success) {
            tracing::warn!(test = %id, "cleanup did not complete");
        }
        record_phase(&mut ctx, result, id, outcome);
    }

    if ctx.success {
        if unit.is_expected_failure() {
            match ctx.expected_failure.take() {
                Some(failure) => result.add_expected_failure(id, failure),
                None => result.add_unexpected_success(id),
            }
        } else {
            result.add_success(id);
        }
    }
}

/// Run a suite's children in order under its fixture
pub(crate) fn run_suite(suite: &TestSuite, result: &mut TestResult, parent: Option<Rc<Fixtures>>) {
    let _span = tracing::debug_span!("suite", name = suite.name()).entered();
    tracing::debug!(tests = suite.count_test_cases(), "suite started");

    if let Some(reason) = suite.skip_reason() {
        for unit in suite.units() {
            result.start_test(unit.id());
            result.add_skip(unit.id(), reason);
            result.stop_test(unit.id());
        }
        return;
    }

    let fixture = suite.fixture().filter(|_| suite.count_test_cases() > 0);
    let mut fixtures = Fixtures::nested(parent.clone());
    if let Some(set_up) = fixture.and_then(|f| f.set_up.as_ref()) {
        let fixture_id = TestId::new(format!("set_up_suite ({})", suite.name()));
        let outcome = match catch_unwind(AssertUnwindSafe(|| set_up(&mut fixtures))) {
            Ok(Ok(())) => Outcome::Success,
            Ok(Err(error)) => classify(&error),
            Err(payload) => Outcome::Error(Failure::new(panic_message(&*payload))),
        };
        if !matches!(outcome, Outcome::Success) {
            result.add_fixture_outcome(&fixture_id, outcome);
            return;
        }
    }
    let fixtures = Rc::new(fixtures);

    for item in suite.children() {
        if result.should_stop {
            tracing::debug!("stop requested; leaving suite");
            break;
        }
        match item {
            SuiteItem::Unit(unit) => run_unit(unit, result, Some(fixtures.clone())),
            SuiteItem::Suite(child) => run_suite(child, result, Some(fixtures.clone())),
        }
    }

    if let Some(tear_down) = fixture.and_then(|f| f.tear_down.as_ref()) {
        let fixture_id = TestId::new(format!("tear_down_suite ({})", suite.name()));
        let outcome = match catch_unwind(AssertUnwindSafe(|| tear_down(&fixtures))) {
            Ok(Ok(())) => Outcome::Success,
            Ok(Err(error)) => classify(&error),
            Err(payload) => Outcome::Error(Failure::new(panic_message(&*payload))),
        };
        if !matches!(outcome, Outcome::Success) {
            result.add_fixture_outcome(&fixture_id, outcome);
        }
    }
    tracing::debug!("suite finished");
}
