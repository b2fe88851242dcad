//! Assertion helpers for test bodies
//!
//! Each helper returns [`Error::Assertion`] when its check does not hold, so
//! a body can use `?` and have the unit recorded as a failure rather than an
//! error. [`skip_test`] returns the skip signal the same way.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt::{Debug, Display};

pub fn assert_equal<T: PartialEq + Debug>(actual: T, expected: T) -> Result<()> {
    if actual == expected {
        return Ok(());
    }
    Err(Error::assertion(format!("{:?} != {:?}", actual, expected)))
}

pub fn assert_not_equal<T: PartialEq + Debug>(actual: T, unexpected: T) -> Result<()> {
    if actual != unexpected {
        return Ok(());
    }
    Err(Error::assertion(format!("{:?} == {:?}", actual, unexpected)))
}

pub fn assert_true(condition: bool, message: &str) -> Result<()> {
    if condition {
        return Ok(());
    }
    Err(Error::assertion(format!("False is not true : {}", message)))
}

pub fn assert_false(condition: bool, message: &str) -> Result<()> {
    if !condition {
        return Ok(());
    }
    Err(Error::assertion(format!("True is not false : {}", message)))
}

pub fn assert_in<T: PartialEq + Debug>(member: &T, container: &[T]) -> Result<()> {
    if container.contains(member) {
        return Ok(());
    }
    Err(Error::assertion(format!(
        "{:?} not found in {:?}",
        member, container
    )))
}

/// `text` must contain a match for `pattern`
pub fn assert_regex(text: &str, pattern: &str) -> Result<()> {
    let regex = Regex::new(pattern)?;
    if regex.is_match(text) {
        return Ok(());
    }
    Err(Error::assertion(format!(
        "Regex didn't match: '{}' not found in '{}'",
        pattern, text
    )))
}

/// `f` must fail; its error is returned for further inspection
pub fn assert_raises<T, E, F>(f: F) -> Result<E>
where
    T: Debug,
    F: FnOnce() -> std::result::Result<T, E>,
{
    match f() {
        Ok(value) => Err(Error::assertion(format!(
            "expected an error, got Ok({:?})",
            value
        ))),
        Err(error) => Ok(error),
    }
}

/// `f` must fail with an error whose message matches `pattern`
pub fn assert_raises_regex<T, E, F>(f: F, pattern: &str) -> Result<E>
where
    T: Debug,
    E: Display,
    F: FnOnce() -> std::result::Result<T, E>,
{
    let error = assert_raises(f)?;
    let regex = Regex::new(pattern)?;
    if regex.is_match(&error.to_string()) {
        return Ok(error);
    }
    Err(Error::assertion(format!(
        "\"{}\" does not match \"{}\"",
        pattern, error
    )))
}

/// Fail unconditionally
pub fn fail(message: impl Into<String>) -> Result<()> {
    Err(Error::assertion(message))
}

/// Skip the rest of the current test, subtest or fixture
pub fn skip_test(reason: impl Into<String>) -> Result<()> {
    Err(Error::skip(reason))
}
