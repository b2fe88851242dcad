//! Configurable behavior a mock runs when called

use crate::mock::{CallArgs, Value};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Produces a fresh error each time a side effect raises
pub type RaiseFn = Rc<dyn Fn() -> anyhow::Error>;

/// Delegate for a callable side effect; `Ok(None)` falls through to the return value
pub type DelegateFn = Rc<dyn Fn(&CallArgs) -> anyhow::Result<Option<Value>>>;

/// One element of a side-effect sequence
#[derive(Clone)]
pub enum Effect {
    Return(Value),
    Raise(RaiseFn),
}

impl Effect {
    pub fn raise<F>(make: F) -> Self
    where
        F: Fn() -> anyhow::Error + 'static,
    {
        Effect::Raise(Rc::new(make))
    }
}

impl From<Value> for Effect {
    fn from(value: Value) -> Self {
        Effect::Return(value)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Return(value) => write!(f, "Return({})", value),
            Effect::Raise(_) => write!(f, "Raise(..)"),
        }
    }
}

/// What happens when a mock is called, instead of returning its return value
#[derive(Clone)]
pub enum SideEffect {
    /// Raise a fresh error on every call
    Raise(RaiseFn),
    /// Delegate to a function of the call's arguments
    Call(DelegateFn),
    /// Successive calls consume successive elements; running out is an error
    Sequence(VecDeque<Effect>),
}

impl SideEffect {
    pub fn raise<F>(make: F) -> Self
    where
        F: Fn() -> anyhow::Error + 'static,
    {
        SideEffect::Raise(Rc::new(make))
    }

    pub fn call<F>(delegate: F) -> Self
    where
        F: Fn(&CallArgs) -> anyhow::Result<Option<Value>> + 'static,
    {
        SideEffect::Call(Rc::new(delegate))
    }

    /// Return each value in turn
    pub fn sequence<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        SideEffect::Sequence(
            values
                .into_iter()
                .map(|value| Effect::Return(value.into()))
                .collect(),
        )
    }

    /// Return or raise each effect in turn
    pub fn effects<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = Effect>,
    {
        SideEffect::Sequence(effects.into_iter().collect())
    }
}

impl fmt::Debug for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Raise(_) => write!(f, "SideEffect::Raise(..)"),
            SideEffect::Call(_) => write!(f, "SideEffect::Call(..)"),
            SideEffect::Sequence(items) => write!(f, "SideEffect::Sequence({:?})", items),
        }
    }
}

/// A configuration value for [`Mock::configure`](crate::mock::Mock::configure)
#[derive(Clone, Debug)]
pub enum Setting {
    Value(Value),
    SideEffect(SideEffect),
}

impl Setting {
    pub fn value(value: impl Into<Value>) -> Self {
        Setting::Value(value.into())
    }
}

impl From<Value> for Setting {
    fn from(value: Value) -> Self {
        Setting::Value(value)
    }
}

impl From<SideEffect> for Setting {
    fn from(effect: SideEffect) -> Self {
        Setting::SideEffect(effect)
    }
}
