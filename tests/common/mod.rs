//! Shared helpers for integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use testunit_rs::TestUnit;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging once per test binary
///
/// `RUST_LOG` overrides the default of debug events from this crate.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("testunit_rs=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// An ordered log that closures in several lifecycle steps can append to
pub type EventLog = Rc<RefCell<Vec<String>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn push(log: &EventLog, event: impl Into<String>) {
    log.borrow_mut().push(event.into());
}

pub fn passing(name: &str) -> TestUnit {
    TestUnit::new(name, |_| Ok(()))
}

pub fn failing(name: &str) -> TestUnit {
    TestUnit::new(name, |_| Ok(testunit_rs::assertions::fail("forced failure")?))
}

pub fn erroring(name: &str) -> TestUnit {
    TestUnit::new(name, |_| Err(anyhow::anyhow!("unexpected condition")))
}
