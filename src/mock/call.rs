//! Recorded invocations and the argument lists they carry

use crate::mock::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Build [`CallArgs`] from positional arguments
///
/// ```
/// use testunit_rs::args;
///
/// let call = args![1, "two"].kw("three", 3);
/// assert_eq!(call.to_string(), "1, 'two', three=3");
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::mock::CallArgs::new()
    };
    ($($arg:expr),+ $(,)?) => {
        $crate::mock::CallArgs::new()$(.arg($arg))+
    };
}

/// Positional and keyword arguments of one invocation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument
    pub fn kw(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

impl fmt::Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", arg)?;
        }
        for (name, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// One recorded call, optionally qualified by the attribute path it was made through
///
/// Names use `.` between attributes and `()` for a call's return value, so
/// `obj.a().b(1)` is recorded on `obj` as the name `a().b`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: CallArgs,
}

impl Call {
    /// A call made directly on the mock
    pub fn new(args: CallArgs) -> Self {
        Call {
            name: String::new(),
            args,
        }
    }

    /// A call made through a child path such as `a.b` or `().json`
    pub fn named(name: impl Into<String>, args: CallArgs) -> Self {
        Call {
            name: name.into(),
            args,
        }
    }

    /// Render as `{prefix}({args})` for error messages
    pub fn signature(&self, prefix: &str) -> String {
        format!("{}({})", prefix, self.args)
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "call({})", self.args)
        } else if self.name.starts_with('(') {
            write!(f, "call{}({})", self.name, self.args)
        } else {
            write!(f, "call.{}({})", self.name, self.args)
        }
    }
}

/// Render a list of calls as `[call(..), call.a(..)]`
pub fn format_calls(calls: &[Call]) -> String {
    let parts: Vec<String> = calls.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_follows_attribute_path() {
        assert_eq!(Call::new(args![1]).to_string(), "call(1)");
        assert_eq!(Call::named("a.b", args![]).to_string(), "call.a.b()");
        assert_eq!(
            Call::named("().json", args!["x"].kw("k", 2)).to_string(),
            "call().json('x', k=2)"
        );
        assert_eq!(Call::named("a().b", args![]).to_string(), "call.a().b()");
    }

    #[test]
    fn kwargs_compare_regardless_of_insertion_order() {
        let left = args![].kw("a", 1).kw("b", 2);
        let right = args![].kw("b", 2).kw("a", 1);
        assert_eq!(left, right);
    }

    #[test]
    fn format_calls_lists_every_entry() {
        let calls = vec![Call::new(args![1]), Call::named("m", args![])];
        assert_eq!(format_calls(&calls), "[call(1), call.m()]");
    }
}
