//! Call-recording substitute objects
//!
//! A [`Mock`] records every call made on it, answers with a configured
//! return value or side effect, and auto-creates child mocks on attribute
//! access so call chains like `client.session().get(url)` can be recorded
//! and verified without any setup:
//!
//! ```
//! use testunit_rs::args;
//! use testunit_rs::mock::{Call, Mock};
//!
//! let client = Mock::named("client");
//! client.method("session", args![]).unwrap();
//! client.child("session").unwrap().return_value().as_mock().unwrap()
//!     .method("get", args!["https://example.com"]).unwrap();
//!
//! client
//!     .assert_has_calls(&[Call::named("session().get", args!["https://example.com"])], false)
//!     .unwrap();
//! ```

pub mod call;
pub mod patch;
pub mod recorder;
pub mod side_effect;
pub mod spec;
pub mod value;

pub use call::{Call, CallArgs};
pub use patch::{patch, PatchGuard, Patcher, Slot};
pub use recorder::{CallRecorder, Verifier};
pub use side_effect::{Effect, SideEffect, Setting};
pub use spec::{BoundArgs, Param, ParamKind, Signature, Spec};
pub use value::{Value, ANY};

use crate::error::{Error, Result};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Attribute names that belong to the verification API
const RESERVED_NAMES: &[&str] = &[
    "called",
    "call_count",
    "call_args",
    "call_args_list",
    "method_calls",
    "mock_calls",
    "side_effect",
    "reset_mock",
    "configure_mock",
];

/// Prefixes that almost always mean a mistyped assertion method
const ASSERTION_PREFIXES: &[&str] = &["assert", "assret", "asert", "aseert", "asset"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkKind {
    Attribute,
    ReturnValue,
}

struct Link {
    parent: Weak<RefCell<MockInner>>,
    name: String,
    kind: LinkKind,
}

enum Attribute {
    Child(Mock),
    Value(Value),
}

#[derive(Default)]
struct MockInner {
    name: Option<String>,
    link: Option<Link>,
    recorder: CallRecorder,
    return_value: Option<Value>,
    side_effect: Option<SideEffect>,
    children: BTreeMap<String, Attribute>,
    spec: Option<Spec>,
    spec_set: bool,
    permissive: bool,
}

enum Behavior {
    Next(Option<Effect>),
    Raise(side_effect::RaiseFn),
    Delegate(side_effect::DelegateFn),
    Return,
}

/// A call-recording stand-in for a real collaborator
///
/// `Mock` is a cheap handle; clones share the same log and configuration.
/// Mocks are single-owner within one test and are not thread-safe.
#[derive(Clone, Default)]
pub struct Mock {
    inner: Rc<RefCell<MockInner>>,
}

/// Builder for mocks that need configuration up front
#[derive(Default)]
pub struct MockBuilder {
    name: Option<String>,
    return_value: Option<Value>,
    side_effect: Option<SideEffect>,
    spec: Option<Spec>,
    spec_set: bool,
    permissive: bool,
}

impl MockBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn return_value(mut self, value: impl Into<Value>) -> Self {
        self.return_value = Some(value.into());
        self
    }

    pub fn side_effect(mut self, effect: SideEffect) -> Self {
        self.side_effect = Some(effect);
        self
    }

    /// Constrain attribute reads and call signatures
    pub fn spec(mut self, spec: Spec) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Like [`MockBuilder::spec`], and also reject assignment of unknown attributes
    pub fn spec_set(mut self, spec: Spec) -> Self {
        self.spec = Some(spec);
        self.spec_set = true;
        self
    }

    /// Allow auto-creation of children with reserved or assertion-like names
    pub fn permissive(mut self) -> Self {
        self.permissive = true;
        self
    }

    pub fn build(self) -> Mock {
        let mock = Mock::from_inner(MockInner {
            name: self.name,
            spec: self.spec,
            spec_set: self.spec_set,
            permissive: self.permissive,
            side_effect: self.side_effect,
            ..Default::default()
        });
        if let Some(value) = self.return_value {
            mock.set_return_value(value);
        }
        mock
    }
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Mock::builder().name(name).build()
    }

    pub fn with_spec(spec: Spec) -> Self {
        Mock::builder().spec(spec).build()
    }

    pub fn builder() -> MockBuilder {
        MockBuilder::default()
    }

    fn from_inner(inner: MockInner) -> Self {
        Mock {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    /// Whether two handles refer to the same mock
    pub fn ptr_eq(&self, other: &Mock) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Dotted path from the root mock, e.g. `client.session().get`
    pub fn full_name(&self) -> String {
        let mut segments = Vec::new();
        let mut root_name = None;
        let mut current = Some(self.inner.clone());
        while let Some(node) = current {
            let inner = node.borrow();
            match &inner.link {
                Some(link) => {
                    segments.push(link.name.clone());
                    current = link.parent.upgrade();
                }
                None => {
                    root_name = inner.name.clone();
                    current = None;
                }
            }
        }

        let mut name = root_name.unwrap_or_else(|| "mock".to_string());
        for segment in segments.iter().rev() {
            if segment != "()" {
                name.push('.');
            }
            name.push_str(segment);
        }
        name
    }

    fn spawn_child(&self, name: &str, kind: LinkKind, spec: Option<Spec>) -> Mock {
        let permissive = self.inner.borrow().permissive;
        let spec_set = spec.is_some() && self.inner.borrow().spec_set;
        Mock::from_inner(MockInner {
            link: Some(Link {
                parent: Rc::downgrade(&self.inner),
                name: name.to_string(),
                kind,
            }),
            spec,
            spec_set,
            permissive,
            ..Default::default()
        })
    }

    /// Whether `other` is this mock or one of its ancestors
    fn is_self_or_ancestor(&self, other: &Mock) -> bool {
        let mut current = Some(self.inner.clone());
        while let Some(node) = current {
            if Rc::ptr_eq(&node, &other.inner) {
                return true;
            }
            current = node
                .borrow()
                .link
                .as_ref()
                .and_then(|link| link.parent.upgrade());
        }
        false
    }

    /// Attach an unparented mock assigned into this one so its calls show up here
    fn adopt(&self, value: &Value, name: &str, kind: LinkKind) {
        let Value::Mock(child) = value else {
            return;
        };
        if child.inner.borrow().link.is_some() || self.is_self_or_ancestor(child) {
            return;
        }
        if child.inner.borrow().name.is_some() {
            // Explicitly named mocks keep their own identity.
            return;
        }
        child.inner.borrow_mut().link = Some(Link {
            parent: Rc::downgrade(&self.inner),
            name: name.to_string(),
            kind,
        });
    }

    fn check_attribute(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::attribute("attribute name must not be empty"));
        }
        if name.starts_with("__") && name.ends_with("__") {
            return Err(Error::attribute(name.to_string()));
        }

        let inner = self.inner.borrow();
        let declared = inner.spec.as_ref().map(|spec| spec.has_attr(name));
        if declared == Some(false) {
            return Err(Error::attribute(format!(
                "Mock object has no attribute '{}'",
                name
            )));
        }
        if inner.permissive || declared == Some(true) {
            return Ok(());
        }
        if RESERVED_NAMES.contains(&name) {
            return Err(Error::attribute(format!(
                "'{}' is reserved for the mock's verification API",
                name
            )));
        }
        if ASSERTION_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
        {
            return Err(Error::attribute(format!(
                "'{}' is not a valid assertion. Use a spec for the mock if '{}' is meant to be an attribute.",
                name, name
            )));
        }
        Ok(())
    }

    /// Read an attribute, auto-creating a child mock on first access
    ///
    /// `return_value` resolves to the mock's return value.
    pub fn get(&self, name: &str) -> Result<Value> {
        if name == "return_value" {
            return Ok(self.return_value());
        }
        if let Some(attribute) = self.inner.borrow().children.get(name) {
            return Ok(match attribute {
                Attribute::Child(mock) => Value::Mock(mock.clone()),
                Attribute::Value(value) => value.clone(),
            });
        }

        self.check_attribute(name)?;
        let child_spec = self
            .inner
            .borrow()
            .spec
            .as_ref()
            .and_then(|spec| spec.child(name))
            .cloned();
        let child = self.spawn_child(name, LinkKind::Attribute, child_spec);
        self.inner
            .borrow_mut()
            .children
            .insert(name.to_string(), Attribute::Child(child.clone()));
        Ok(Value::Mock(child))
    }

    /// Like [`Mock::get`], but the attribute must be a mock
    pub fn child(&self, name: &str) -> Result<Mock> {
        match self.get(name)? {
            Value::Mock(mock) => Ok(mock),
            other => Err(Error::attribute(format!(
                "attribute '{}' of '{}' is {}, not a mock",
                name,
                self.full_name(),
                other
            ))),
        }
    }

    /// Assign an attribute; mocks assigned here are recorded as children
    pub fn set_attr(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if name == "return_value" {
            self.set_return_value(value);
            return Ok(());
        }
        if name.is_empty() {
            return Err(Error::attribute("attribute name must not be empty"));
        }
        {
            let inner = self.inner.borrow();
            if inner.spec_set && !inner.spec.as_ref().is_some_and(|spec| spec.has_attr(name)) {
                return Err(Error::attribute(format!(
                    "Mock object has no attribute '{}'",
                    name
                )));
            }
        }
        self.adopt(&value, name, LinkKind::Attribute);
        let attribute = match value {
            Value::Mock(mock) => Attribute::Child(mock),
            other => Attribute::Value(other),
        };
        self.inner
            .borrow_mut()
            .children
            .insert(name.to_string(), attribute);
        Ok(())
    }

    /// The configured return value, or a memoized child mock named `()`
    pub fn return_value(&self) -> Value {
        if let Some(value) = &self.inner.borrow().return_value {
            return value.clone();
        }
        let spec = self
            .inner
            .borrow()
            .spec
            .as_ref()
            .and_then(Spec::return_spec)
            .cloned();
        let child = Value::Mock(self.spawn_child("()", LinkKind::ReturnValue, spec));
        self.inner.borrow_mut().return_value = Some(child.clone());
        child
    }

    pub fn set_return_value(&self, value: impl Into<Value>) {
        let value = value.into();
        self.adopt(&value, "()", LinkKind::ReturnValue);
        self.inner.borrow_mut().return_value = Some(value);
    }

    pub fn set_side_effect(&self, effect: SideEffect) {
        self.inner.borrow_mut().side_effect = Some(effect);
    }

    pub fn clear_side_effect(&self) {
        self.inner.borrow_mut().side_effect = None;
    }

    /// Invoke the mock
    ///
    /// The call is validated against the spec, recorded (here and on every
    /// ancestor), and then answered: a side-effect sequence yields its next
    /// element, a raising side effect raises, a delegate is called, and
    /// otherwise the return value is produced.
    pub fn call(&self, args: CallArgs) -> Result<Value> {
        if let Some(spec) = &self.inner.borrow().spec {
            if !spec.is_callable() {
                return Err(Error::NotCallable {
                    name: self.full_name(),
                });
            }
            if let Some(signature) = spec.signature() {
                signature.bind(&args)?;
            }
        }

        tracing::trace!(mock = %self.full_name(), args = %args, "mock called");
        self.record(&args);

        let behavior = match &mut self.inner.borrow_mut().side_effect {
            Some(SideEffect::Sequence(effects)) => Behavior::Next(effects.pop_front()),
            Some(SideEffect::Raise(raise)) => Behavior::Raise(raise.clone()),
            Some(SideEffect::Call(delegate)) => Behavior::Delegate(delegate.clone()),
            None => Behavior::Return,
        };

        match behavior {
            Behavior::Next(Some(Effect::Return(value))) => Ok(value),
            Behavior::Next(Some(Effect::Raise(raise))) | Behavior::Raise(raise) => {
                Err(Error::Raised(raise()))
            }
            Behavior::Next(None) => Err(Error::SideEffectExhausted {
                mock: self.full_name(),
            }),
            Behavior::Delegate(delegate) => match delegate(&args).map_err(Error::Raised)? {
                Some(value) => Ok(value),
                None => Ok(self.return_value()),
            },
            Behavior::Return => Ok(self.return_value()),
        }
    }

    /// Call the child named `name`
    pub fn method(&self, name: &str, args: CallArgs) -> Result<Value> {
        self.child(name)?.call(args)
    }

    fn record(&self, args: &CallArgs) {
        self.inner.borrow_mut().recorder.record(args.clone());

        let (mut method_name, mut do_method, mut mock_name, mut is_call, mut parent) = {
            let inner = self.inner.borrow();
            let Some(link) = &inner.link else {
                return;
            };
            (
                link.name.clone(),
                link.kind == LinkKind::Attribute,
                link.name.clone(),
                link.kind == LinkKind::ReturnValue,
                link.parent.upgrade(),
            )
        };

        while let Some(node) = parent {
            let mut inner = node.borrow_mut();
            if do_method {
                inner
                    .recorder
                    .record_method_call(Call::named(method_name.clone(), args.clone()));
                do_method = matches!(&inner.link, Some(link) if link.kind == LinkKind::Attribute);
                if let (true, Some(link)) = (do_method, &inner.link) {
                    method_name = format!("{}.{}", link.name, method_name);
                }
            }
            inner
                .recorder
                .record_mock_call(Call::named(mock_name.clone(), args.clone()));

            parent = match &inner.link {
                Some(link) => {
                    let dot = if is_call { "" } else { "." };
                    is_call = link.kind == LinkKind::ReturnValue;
                    mock_name = format!("{}{}{}", link.name, dot, mock_name);
                    link.parent.upgrade()
                }
                None => None,
            };
        }
    }

    pub fn called(&self) -> bool {
        self.inner.borrow().recorder.called()
    }

    pub fn call_count(&self) -> usize {
        self.inner.borrow().recorder.call_count()
    }

    /// The most recent call's arguments
    pub fn call_args(&self) -> Option<CallArgs> {
        self.inner.borrow().recorder.last_call().cloned()
    }

    pub fn call_args_list(&self) -> Vec<CallArgs> {
        self.inner.borrow().recorder.calls().to_vec()
    }

    /// Calls on this mock's attribute children (not through return values)
    pub fn method_calls(&self) -> Vec<Call> {
        self.inner.borrow().recorder.method_calls().to_vec()
    }

    /// Every call on this mock, its children and their return values
    pub fn mock_calls(&self) -> Vec<Call> {
        self.inner.borrow().recorder.mock_calls().to_vec()
    }

    /// A snapshot of the full recorder
    pub fn recorder(&self) -> CallRecorder {
        self.inner.borrow().recorder.clone()
    }

    fn verify(&self, check: impl FnOnce(&Verifier<'_>) -> Result<()>) -> Result<()> {
        let name = self.full_name();
        let inner = self.inner.borrow();
        check(&Verifier::new(&name, &inner.recorder, inner.spec.as_ref()))
    }

    pub fn assert_called(&self) -> Result<()> {
        self.verify(|v| v.assert_called())
    }

    pub fn assert_called_once(&self) -> Result<()> {
        self.verify(|v| v.assert_called_once())
    }

    pub fn assert_not_called(&self) -> Result<()> {
        self.verify(|v| v.assert_not_called())
    }

    pub fn assert_called_with(&self, expected: CallArgs) -> Result<()> {
        self.verify(|v| v.assert_called_with(&expected))
    }

    pub fn assert_called_once_with(&self, expected: CallArgs) -> Result<()> {
        self.verify(|v| v.assert_called_once_with(&expected))
    }

    pub fn assert_any_call(&self, expected: CallArgs) -> Result<()> {
        self.verify(|v| v.assert_any_call(&expected))
    }

    /// See [`Verifier::assert_has_calls`] for the matching rules
    pub fn assert_has_calls(&self, expected: &[Call], any_order: bool) -> Result<()> {
        self.verify(|v| v.assert_has_calls(expected, any_order))
    }

    /// Clear the call logs of this mock and every child
    ///
    /// Return values and side effects survive unless `clear_configuration`
    /// is set.
    pub fn reset(&self, clear_configuration: bool) {
        let mut visited = Vec::new();
        self.reset_inner(clear_configuration, &mut visited);
    }

    fn reset_inner(&self, clear_configuration: bool, visited: &mut Vec<*const RefCell<MockInner>>) {
        let ptr = Rc::as_ptr(&self.inner);
        if visited.contains(&ptr) {
            return;
        }
        visited.push(ptr);

        let (children, returned) = {
            let mut inner = self.inner.borrow_mut();
            inner.recorder.clear();
            let returned = inner.return_value.clone();
            if clear_configuration {
                inner.return_value = None;
                inner.side_effect = None;
            }
            let children: Vec<Mock> = inner
                .children
                .values()
                .filter_map(|attribute| match attribute {
                    Attribute::Child(mock) => Some(mock.clone()),
                    Attribute::Value(_) => None,
                })
                .collect();
            (children, returned)
        };

        for child in children {
            child.reset_inner(clear_configuration, visited);
        }
        if let Some(Value::Mock(returned)) = returned {
            returned.reset_inner(clear_configuration, visited);
        }
    }

    /// Bulk configuration through dotted paths
    ///
    /// `"method.return_value"` sets the return value of the child `method`;
    /// `"return_value.json.side_effect"` configures a method on the return
    /// value. Intermediate children are created as needed, and shallower
    /// paths are applied before deeper ones.
    pub fn configure<'a, I>(&self, settings: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, Setting)>,
    {
        let mut settings: Vec<(&str, Setting)> = settings.into_iter().collect();
        settings.sort_by_key(|(path, _)| path.matches('.').count());

        for (path, setting) in settings {
            let (parents, last) = match path.rsplit_once('.') {
                Some((parents, last)) => (Some(parents), last),
                None => (None, path),
            };
            let mut target = self.clone();
            if let Some(parents) = parents {
                for segment in parents.split('.') {
                    target = target.child(segment)?;
                }
            }

            match (last, setting) {
                ("return_value", Setting::Value(value)) => target.set_return_value(value),
                ("side_effect", Setting::SideEffect(effect)) => target.set_side_effect(effect),
                ("side_effect", Setting::Value(Value::List(items))) => {
                    target.set_side_effect(SideEffect::sequence(items))
                }
                ("side_effect", Setting::Value(Value::None)) => target.clear_side_effect(),
                ("side_effect", Setting::Value(other)) => {
                    return Err(Error::attribute(format!(
                        "side_effect of '{}' must be a list or a SideEffect, got {}",
                        target.full_name(),
                        other
                    )));
                }
                (name, Setting::Value(value)) => target.set_attr(name, value)?,
                (name, Setting::SideEffect(_)) => {
                    return Err(Error::attribute(format!(
                        "only 'side_effect' accepts a SideEffect, not '{}'",
                        name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Mock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Mock name='{}'>", self.full_name())
    }
}
