//! Call logs and the verification queries run over them

use crate::error::{Error, Result};
use crate::mock::call::format_calls;
use crate::mock::{Call, CallArgs, Spec};

/// The invocation log owned by each mock
///
/// `calls` holds the direct invocations of this mock. `method_calls` and
/// `mock_calls` additionally hold calls made on children reachable through
/// attribute access (and, for `mock_calls`, through return values), named by
/// the path that reached them.
#[derive(Clone, Debug, Default)]
pub struct CallRecorder {
    calls: Vec<CallArgs>,
    method_calls: Vec<Call>,
    mock_calls: Vec<Call>,
}

impl CallRecorder {
    pub fn called(&self) -> bool {
        !self.calls.is_empty()
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn last_call(&self) -> Option<&CallArgs> {
        self.calls.last()
    }

    pub fn calls(&self) -> &[CallArgs] {
        &self.calls
    }

    pub fn method_calls(&self) -> &[Call] {
        &self.method_calls
    }

    pub fn mock_calls(&self) -> &[Call] {
        &self.mock_calls
    }

    /// Record a direct invocation
    pub(crate) fn record(&mut self, args: CallArgs) {
        self.mock_calls.push(Call::new(args.clone()));
        self.calls.push(args);
    }

    pub(crate) fn record_method_call(&mut self, call: Call) {
        self.method_calls.push(call);
    }

    pub(crate) fn record_mock_call(&mut self, call: Call) {
        self.mock_calls.push(call);
    }

    pub fn clear(&mut self) {
        self.calls.clear();
        self.method_calls.clear();
        self.mock_calls.clear();
    }
}

/// Read-only assertions over one mock's [`CallRecorder`]
///
/// When the mock has a spec, expected and actual arguments are both bound
/// against the relevant signature before comparison, so a call spelled with
/// keywords matches the same call spelled positionally.
pub struct Verifier<'a> {
    name: &'a str,
    recorder: &'a CallRecorder,
    spec: Option<&'a Spec>,
}

impl<'a> Verifier<'a> {
    pub fn new(name: &'a str, recorder: &'a CallRecorder, spec: Option<&'a Spec>) -> Self {
        Verifier {
            name,
            recorder,
            spec,
        }
    }

    fn args_match(&self, call_name: &str, expected: &CallArgs, actual: &CallArgs) -> bool {
        let signature = self
            .spec
            .and_then(|spec| spec.resolve(call_name))
            .and_then(Spec::signature);
        if let Some(signature) = signature {
            if let (Ok(left), Ok(right)) = (signature.bind(expected), signature.bind(actual)) {
                return left == right;
            }
        }
        expected == actual
    }

    fn call_matches(&self, expected: &Call, actual: &Call) -> bool {
        expected.name == actual.name && self.args_match(&actual.name, &expected.args, &actual.args)
    }

    fn calls_suffix(&self) -> String {
        let count = self.recorder.call_count();
        if count == 0 {
            String::new()
        } else {
            format!("\nCalls: {}", format_calls(self.recorder.mock_calls()))
        }
    }

    fn fail(&self, message: String) -> Result<()> {
        tracing::trace!(mock = self.name, %message, "mock verification failed");
        Err(Error::verification(message))
    }

    pub fn assert_called(&self) -> Result<()> {
        if self.recorder.called() {
            return Ok(());
        }
        self.fail(format!("Expected '{}' to have been called.", self.name))
    }

    pub fn assert_called_once(&self) -> Result<()> {
        let count = self.recorder.call_count();
        if count == 1 {
            return Ok(());
        }
        self.fail(format!(
            "Expected '{}' to have been called once. Called {} times.{}",
            self.name,
            count,
            self.calls_suffix()
        ))
    }

    pub fn assert_not_called(&self) -> Result<()> {
        let count = self.recorder.call_count();
        if count == 0 {
            return Ok(());
        }
        self.fail(format!(
            "Expected '{}' to not have been called. Called {} times.{}",
            self.name,
            count,
            self.calls_suffix()
        ))
    }

    /// The most recent call must equal `expected`
    pub fn assert_called_with(&self, expected: &CallArgs) -> Result<()> {
        let expected_sig = Call::new(expected.clone()).signature(self.name);
        match self.recorder.last_call() {
            None => self.fail(format!(
                "expected call not found.\nExpected: {}\n  Actual: not called.",
                expected_sig
            )),
            Some(actual) if self.args_match("", expected, actual) => Ok(()),
            Some(actual) => self.fail(format!(
                "expected call not found.\nExpected: {}\n  Actual: {}",
                expected_sig,
                Call::new(actual.clone()).signature(self.name)
            )),
        }
    }

    pub fn assert_called_once_with(&self, expected: &CallArgs) -> Result<()> {
        let count = self.recorder.call_count();
        if count != 1 {
            return self.fail(format!(
                "Expected '{}' to be called once. Called {} times.{}",
                self.name,
                count,
                self.calls_suffix()
            ));
        }
        self.assert_called_with(expected)
    }

    /// Some call, not necessarily the last, must equal `expected`
    pub fn assert_any_call(&self, expected: &CallArgs) -> Result<()> {
        if self
            .recorder
            .calls()
            .iter()
            .any(|actual| self.args_match("", expected, actual))
        {
            return Ok(());
        }
        self.fail(format!(
            "{} call not found",
            Call::new(expected.clone()).signature(self.name)
        ))
    }

    /// Check `expected` against `mock_calls`
    ///
    /// In order, the expected calls must appear as one contiguous run; calls
    /// before and after the run are ignored but nothing may interleave. With
    /// `any_order`, each expected call must be matched by a distinct recorded
    /// call, wherever it occurs.
    pub fn assert_has_calls(&self, expected: &[Call], any_order: bool) -> Result<()> {
        let actual = self.recorder.mock_calls();

        if !any_order {
            if expected.is_empty() {
                return Ok(());
            }
            let found = actual.windows(expected.len()).any(|window| {
                window
                    .iter()
                    .zip(expected)
                    .all(|(actual, expected)| self.call_matches(expected, actual))
            });
            if found {
                return Ok(());
            }
            return self.fail(format!(
                "Calls not found.\nExpected: {}\n  Actual: {}",
                format_calls(expected),
                format_calls(actual)
            ));
        }

        let mut remaining: Vec<&Call> = actual.iter().collect();
        let mut missing = Vec::new();
        for call in expected {
            match remaining
                .iter()
                .position(|candidate| self.call_matches(call, candidate))
            {
                Some(index) => {
                    remaining.remove(index);
                }
                None => missing.push(call.clone()),
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        self.fail(format!(
            "'{}' does not contain all of {} in its call list, found {} instead",
            self.name,
            format_calls(&missing),
            format_calls(actual)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::mock::Signature;

    fn recorder_with(calls: Vec<CallArgs>) -> CallRecorder {
        let mut recorder = CallRecorder::default();
        for call in calls {
            recorder.record(call);
        }
        recorder
    }

    #[test]
    fn derived_state_tracks_log() {
        let recorder = recorder_with(vec![args![1], args![2]]);
        assert!(recorder.called());
        assert_eq!(recorder.call_count(), 2);
        assert_eq!(recorder.last_call(), Some(&args![2]));
        assert_eq!(recorder.mock_calls().len(), 2);
    }

    #[test]
    fn clear_empties_every_log() {
        let mut recorder = recorder_with(vec![args![1]]);
        recorder.record_method_call(Call::named("a", args![]));
        recorder.clear();
        assert!(!recorder.called());
        assert!(recorder.method_calls().is_empty());
        assert!(recorder.mock_calls().is_empty());
    }

    #[test]
    fn called_with_reports_expected_and_actual() {
        let recorder = recorder_with(vec![args![1]]);
        let verifier = Verifier::new("get", &recorder, None);
        let err = verifier.assert_called_with(&args![1, 2]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected call not found.\nExpected: get(1, 2)\n  Actual: get(1)"
        );

        let empty = CallRecorder::default();
        let err = Verifier::new("get", &empty, None)
            .assert_called_with(&args![1])
            .unwrap_err();
        assert!(err.to_string().ends_with("Actual: not called."));
    }

    #[test]
    fn spec_normalizes_keyword_spelling() {
        let spec = Spec::function(Signature::new().positional("a").positional("b"));
        let recorder = recorder_with(vec![args![1].kw("b", 2)]);
        let verifier = Verifier::new("f", &recorder, Some(&spec));
        assert!(verifier.assert_called_with(&args![1, 2]).is_ok());
        assert!(verifier.assert_any_call(&args![].kw("a", 1).kw("b", 2)).is_ok());
        assert!(Verifier::new("f", &recorder, None)
            .assert_called_with(&args![1, 2])
            .is_err());
    }

    #[test]
    fn has_calls_in_order_requires_contiguous_run() {
        let recorder = recorder_with(vec![args![1], args![2], args![3]]);
        let verifier = Verifier::new("m", &recorder, None);
        let call = |n: i64| Call::new(args![n]);

        assert!(verifier.assert_has_calls(&[call(2), call(3)], false).is_ok());
        assert!(verifier.assert_has_calls(&[], false).is_ok());
        // 1 and 3 are ordered but not adjacent.
        assert!(verifier.assert_has_calls(&[call(1), call(3)], false).is_err());
        assert!(verifier.assert_has_calls(&[call(3), call(2)], false).is_err());
    }

    #[test]
    fn has_calls_any_order_is_multiset_containment() {
        let recorder = recorder_with(vec![args![1], args![2], args![1]]);
        let verifier = Verifier::new("m", &recorder, None);
        let call = |n: i64| Call::new(args![n]);

        assert!(verifier
            .assert_has_calls(&[call(1), call(2), call(1)], true)
            .is_ok());
        let err = verifier
            .assert_has_calls(&[call(2), call(2)], true)
            .unwrap_err();
        assert!(err.to_string().contains("does not contain all of [call(2)]"));
    }
}
