//! Reference shapes that constrain a mock: call signatures and attribute sets

use crate::error::{Error, Result};
use crate::mock::{CallArgs, Value};
use std::collections::{BTreeMap, HashSet};

/// How a parameter may be supplied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub has_default: bool,
}

/// A callable's parameter list
///
/// Build one with the chained constructors or parse the familiar textual
/// form:
///
/// ```
/// use testunit_rs::mock::Signature;
///
/// let sig = Signature::parse("(url, /, timeout=30, *rest, verify, **headers)").unwrap();
/// assert_eq!(sig.params().len(), 5);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Param>,
}

/// Arguments after binding against a signature
///
/// Two calls that bind to the same `BoundArgs` are the same call, however
/// their arguments were spelled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundArgs {
    pub named: Vec<(String, Value)>,
    pub extra_args: Vec<Value>,
    pub extra_kwargs: BTreeMap<String, Value>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    fn push(mut self, name: &str, kind: ParamKind, has_default: bool) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            kind,
            has_default,
        });
        self
    }

    /// Required positional-or-keyword parameter
    pub fn positional(self, name: &str) -> Self {
        self.push(name, ParamKind::PositionalOrKeyword, false)
    }

    /// Positional-or-keyword parameter with a default
    pub fn optional(self, name: &str) -> Self {
        self.push(name, ParamKind::PositionalOrKeyword, true)
    }

    pub fn positional_only(self, name: &str) -> Self {
        self.push(name, ParamKind::PositionalOnly, false)
    }

    pub fn var_args(self, name: &str) -> Self {
        self.push(name, ParamKind::VarPositional, false)
    }

    pub fn keyword_only(self, name: &str) -> Self {
        self.push(name, ParamKind::KeywordOnly, false)
    }

    pub fn keyword_optional(self, name: &str) -> Self {
        self.push(name, ParamKind::KeywordOnly, true)
    }

    pub fn var_kwargs(self, name: &str) -> Self {
        self.push(name, ParamKind::VarKeyword, false)
    }

    /// Parse `(a, b=1, /, c, *args, d, e=2, **kwargs)`
    ///
    /// Default values are accepted but not kept; only their presence matters.
    pub fn parse(text: &str) -> Result<Signature> {
        let inner = text
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| Error::signature(format!("signature must be parenthesized: {}", text)))?;

        let mut sig = Signature::new();
        let mut keyword_only = false;
        let mut seen_default = false;
        let mut seen = HashSet::new();

        for token in inner.split(',').map(str::trim) {
            if token.is_empty() {
                if inner.trim().is_empty() {
                    break;
                }
                return Err(Error::signature(format!("empty parameter in {}", text)));
            }
            if sig
                .params
                .last()
                .is_some_and(|p| p.kind == ParamKind::VarKeyword)
            {
                return Err(Error::signature("parameter follows **kwargs"));
            }

            if token == "/" {
                if keyword_only || sig.params.is_empty() {
                    return Err(Error::signature("'/' must follow positional parameters"));
                }
                for param in &mut sig.params {
                    if param.kind == ParamKind::PositionalOnly {
                        return Err(Error::signature("'/' may appear only once"));
                    }
                    param.kind = ParamKind::PositionalOnly;
                }
                continue;
            }
            if token == "*" {
                if keyword_only {
                    return Err(Error::signature("'*' may appear only once"));
                }
                keyword_only = true;
                continue;
            }

            let (name, kind, has_default) = if let Some(name) = token.strip_prefix("**") {
                (name, ParamKind::VarKeyword, false)
            } else if let Some(name) = token.strip_prefix('*') {
                if keyword_only {
                    return Err(Error::signature("'*args' may appear only once"));
                }
                keyword_only = true;
                (name, ParamKind::VarPositional, false)
            } else if let Some((name, _default)) = token.split_once('=') {
                let kind = if keyword_only {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::PositionalOrKeyword
                };
                (name.trim(), kind, true)
            } else if keyword_only {
                (token, ParamKind::KeywordOnly, false)
            } else {
                (token, ParamKind::PositionalOrKeyword, false)
            };

            if !is_identifier(name) {
                return Err(Error::signature(format!("invalid parameter name '{}'", name)));
            }
            if !seen.insert(name.to_string()) {
                return Err(Error::signature(format!("duplicate parameter '{}'", name)));
            }
            if kind == ParamKind::PositionalOrKeyword {
                if has_default {
                    seen_default = true;
                } else if seen_default {
                    return Err(Error::signature(
                        "non-default argument follows default argument",
                    ));
                }
            }
            sig = sig.push(name, kind, has_default);
        }

        Ok(sig)
    }

    /// Bind call arguments to parameters, rejecting calls the signature does not accept
    pub fn bind(&self, call: &CallArgs) -> Result<BoundArgs> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut bound = BoundArgs::default();
        let mut positional = call.args.iter();

        for (index, param) in self.params.iter().enumerate() {
            match param.kind {
                ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => {
                    match positional.next() {
                        Some(value) => slots[index] = Some(value.clone()),
                        None => break,
                    }
                }
                _ => break,
            }
        }

        let rest: Vec<Value> = positional.cloned().collect();
        if !rest.is_empty() {
            if self.params.iter().any(|p| p.kind == ParamKind::VarPositional) {
                bound.extra_args = rest;
            } else {
                return Err(Error::signature("too many positional arguments"));
            }
        }

        let mut kwargs = call.kwargs.clone();
        for (index, param) in self.params.iter().enumerate() {
            match param.kind {
                ParamKind::PositionalOnly => {
                    if slots[index].is_none() && !param.has_default {
                        return Err(Error::signature(format!(
                            "missing a required argument: '{}'",
                            param.name
                        )));
                    }
                }
                ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly => {
                    if slots[index].is_some() {
                        if kwargs.contains_key(&param.name) {
                            return Err(Error::signature(format!(
                                "multiple values for argument '{}'",
                                param.name
                            )));
                        }
                    } else if let Some(value) = kwargs.remove(&param.name) {
                        slots[index] = Some(value);
                    } else if !param.has_default {
                        return Err(Error::signature(format!(
                            "missing a required argument: '{}'",
                            param.name
                        )));
                    }
                }
                ParamKind::VarPositional | ParamKind::VarKeyword => {}
            }
        }

        if !kwargs.is_empty() {
            if self.params.iter().any(|p| p.kind == ParamKind::VarKeyword) {
                bound.extra_kwargs = kwargs;
            } else {
                let name = kwargs.keys().next().cloned().unwrap_or_default();
                let positional_only = self
                    .params
                    .iter()
                    .any(|p| p.kind == ParamKind::PositionalOnly && p.name == name);
                return Err(Error::signature(if positional_only {
                    format!(
                        "'{}' parameter is positional only, but was passed as a keyword",
                        name
                    )
                } else {
                    format!("got an unexpected keyword argument '{}'", name)
                }));
            }
        }

        bound.named = self
            .params
            .iter()
            .zip(slots)
            .filter_map(|(param, slot)| slot.map(|value| (param.name.clone(), value)))
            .collect();
        Ok(bound)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// The reference shape of an object a mock stands in for
///
/// Attribute names absent from the spec cannot be read from the mock, and
/// calls are checked against the signature. Attributes that carry their own
/// spec produce children constrained the same way, so a whole object graph
/// can be auto-specified.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spec {
    signature: Option<Signature>,
    callable: bool,
    attributes: BTreeMap<String, Option<Spec>>,
    returns: Option<Box<Spec>>,
}

impl Spec {
    /// A callable with the given signature
    pub fn function(signature: Signature) -> Self {
        Spec {
            signature: Some(signature),
            callable: true,
            ..Default::default()
        }
    }

    /// A non-callable object; add attributes with [`Spec::attr`] and [`Spec::method`]
    pub fn object() -> Self {
        Spec::default()
    }

    /// A constructor: callable with `init`, producing `instance`
    pub fn class(init: Signature, instance: Spec) -> Self {
        Spec::function(init).returns(instance)
    }

    /// Declare an attribute with no further constraints
    pub fn field(mut self, name: &str) -> Self {
        self.attributes.insert(name.to_string(), None);
        self
    }

    /// Declare an attribute constrained by its own spec
    pub fn attr(mut self, name: &str, spec: Spec) -> Self {
        self.attributes.insert(name.to_string(), Some(spec));
        self
    }

    /// Declare a method with the given signature
    pub fn method(self, name: &str, signature: Signature) -> Self {
        self.attr(name, Spec::function(signature))
    }

    /// Spec for the value produced by calling this object
    pub fn returns(mut self, spec: Spec) -> Self {
        self.returns = Some(Box::new(spec));
        self
    }

    pub fn is_callable(&self) -> bool {
        self.callable
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Spec for an attribute; `None` when absent or unconstrained
    pub fn child(&self, name: &str) -> Option<&Spec> {
        self.attributes.get(name).and_then(Option::as_ref)
    }

    pub fn return_spec(&self) -> Option<&Spec> {
        self.returns.as_deref()
    }

    /// Follow a recorded call name such as `a().b` down to the spec it was made against
    pub fn resolve(&self, name: &str) -> Option<&Spec> {
        let mut current = self;
        for segment in split_call_name(name) {
            current = if segment == "()" {
                current.return_spec()?
            } else {
                current.child(segment)?
            };
        }
        Some(current)
    }
}

/// Split `a().b` into `["a", "()", "b"]`
pub(crate) fn split_call_name(name: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = name;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("()") {
            segments.push("()");
            rest = after;
        } else if let Some(after) = rest.strip_prefix('.') {
            rest = after;
        } else {
            let end = rest.find(['.', '(']).unwrap_or(rest.len());
            if end == 0 {
                // Stray '(' without ')'; keep the remainder as one segment.
                segments.push(rest);
                break;
            }
            segments.push(&rest[..end]);
            rest = &rest[end..];
        }
    }
    segments
}
