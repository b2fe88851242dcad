//! Suites: ordered composites of units and nested suites

use crate::result::TestResult;
use crate::run::{execution, TestContext};
use crate::unit::TestUnit;
use regex::Regex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Type alias for a suite set-up function
pub type SuiteSetUpFn = Box<dyn Fn(&mut Fixtures) -> anyhow::Result<()>>;

/// Type alias for a suite tear-down function
pub type SuiteTearDownFn = Box<dyn Fn(&Fixtures) -> anyhow::Result<()>>;

/// Values created once by a suite fixture and shared by every unit under it
///
/// Lookups fall back to the enclosing suite's fixtures. Values are read-only
/// to units; wrap them in a `RefCell` if tests need to mutate shared state.
#[derive(Default)]
pub struct Fixtures {
    parent: Option<Rc<Fixtures>>,
    values: HashMap<TypeId, Box<dyn Any>>,
}

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn nested(parent: Option<Rc<Fixtures>>) -> Self {
        Fixtures {
            parent,
            values: HashMap::new(),
        }
    }

    pub fn insert<T: 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        match self.values.get(&TypeId::of::<T>()) {
            Some(value) => value.downcast_ref::<T>(),
            None => self.parent.as_deref().and_then(Fixtures::get::<T>),
        }
    }
}

impl fmt::Debug for Fixtures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fixtures")
            .field("values", &self.values.len())
            .field("nested", &self.parent.is_some())
            .finish()
    }
}

/// Set-up and tear-down that bracket a suite's children
pub struct SuiteFixture {
    pub(crate) set_up: Option<SuiteSetUpFn>,
    pub(crate) tear_down: Option<SuiteTearDownFn>,
}

/// A child of a suite
pub enum SuiteItem {
    Unit(TestUnit),
    Suite(TestSuite),
}

impl From<TestUnit> for SuiteItem {
    fn from(unit: TestUnit) -> Self {
        SuiteItem::Unit(unit)
    }
}

impl From<TestSuite> for SuiteItem {
    fn from(suite: TestSuite) -> Self {
        SuiteItem::Suite(suite)
    }
}

impl SuiteItem {
    fn count_test_cases(&self) -> usize {
        match self {
            SuiteItem::Unit(_) => 1,
            SuiteItem::Suite(suite) => suite.count_test_cases(),
        }
    }
}

/// An ordered collection of units and nested suites
///
/// A suite typically corresponds to a test class or module. Its optional
/// fixture runs once, before the first child, and its values are visible to
/// every unit below it through [`TestContext::fixture`].
pub struct TestSuite {
    name: String,
    items: Vec<SuiteItem>,
    fixture: Option<SuiteFixture>,
    skip: Option<String>,
}

impl TestSuite {
    pub fn new(name: impl Into<String>) -> Self {
        TestSuite {
            name: name.into(),
            items: Vec::new(),
            fixture: None,
            skip: None,
        }
    }

    /// Build a suite from units or suites produced by discovery
    pub fn from_items<I, T>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SuiteItem>,
    {
        let mut suite = TestSuite::new(name);
        suite.items.extend(items.into_iter().map(Into::into));
        suite
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add(&mut self, item: impl Into<SuiteItem>) {
        self.items.push(item.into());
    }

    pub fn with(mut self, item: impl Into<SuiteItem>) -> Self {
        self.add(item);
        self
    }

    /// Run `f` once before the first child
    pub fn set_up_suite<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Fixtures) -> anyhow::Result<()> + 'static,
    {
        self.fixture
            .get_or_insert(SuiteFixture {
                set_up: None,
                tear_down: None,
            })
            .set_up = Some(Box::new(f));
        self
    }

    /// Run `f` once after the last child, if set-up succeeded
    pub fn tear_down_suite<F>(mut self, f: F) -> Self
    where
        F: Fn(&Fixtures) -> anyhow::Result<()> + 'static,
    {
        self.fixture
            .get_or_insert(SuiteFixture {
                set_up: None,
                tear_down: None,
            })
            .tear_down = Some(Box::new(f));
        self
    }

    /// Record every unit as skipped without running fixtures
    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }

    /// Add one unit per case, named `{base}_{index}_{label}`
    pub fn parameterized<'l, T, I, F>(mut self, base: &str, cases: I, body: F) -> Self
    where
        T: 'static,
        I: IntoIterator<Item = (&'l str, T)>,
        F: Fn(&mut TestContext, &T) -> anyhow::Result<()> + 'static,
    {
        let body = Rc::new(body);
        for (index, (label, case)) in cases.into_iter().enumerate() {
            let name = match safe_name(label) {
                label if label.is_empty() => format!("{}_{}", base, index),
                label => format!("{}_{}_{}", base, index, label),
            };
            let body = body.clone();
            self.add(TestUnit::new(name, move |ctx| body(ctx, &case)));
        }
        self
    }

    pub fn children(&self) -> &[SuiteItem] {
        &self.items
    }

    pub(crate) fn fixture(&self) -> Option<&SuiteFixture> {
        self.fixture.as_ref()
    }

    pub(crate) fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    /// Number of leaf units, however deeply nested
    pub fn count_test_cases(&self) -> usize {
        self.items.iter().map(SuiteItem::count_test_cases).sum()
    }

    /// Every leaf unit in execution order
    pub fn units(&self) -> Vec<&TestUnit> {
        let mut units = Vec::new();
        self.collect_units(&mut units);
        units
    }

    fn collect_units<'a>(&'a self, units: &mut Vec<&'a TestUnit>) {
        for item in &self.items {
            match item {
                SuiteItem::Unit(unit) => units.push(unit),
                SuiteItem::Suite(suite) => suite.collect_units(units),
            }
        }
    }

    /// Keep only units whose name matches `pattern`, dropping suites left empty
    pub fn retain_matching(&mut self, pattern: &Regex) {
        self.items.retain_mut(|item| match item {
            SuiteItem::Unit(unit) => pattern.is_match(unit.id().name()),
            SuiteItem::Suite(suite) => {
                suite.retain_matching(pattern);
                suite.count_test_cases() > 0
            }
        });
    }

    /// Run every child in order, halting when the result asks to stop
    pub fn run(&self, result: &mut TestResult) {
        execution::run_suite(self, result, None);
    }
}

impl fmt::Debug for TestSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuite")
            .field("name", &self.name)
            .field("tests", &self.count_test_cases())
            .field("fixture", &self.fixture.is_some())
            .finish()
    }
}

/// Reduce a case label to identifier characters
fn safe_name(label: &str) -> String {
    let mut name = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name.trim_matches('_').to_string()
}
