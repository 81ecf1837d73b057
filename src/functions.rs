//! Function Registry
//!
//! Named callables exposed to SQL templates. A registry starts out seeded with
//! the placeholder helpers and is extended with [`FunctionRegistry::register`]
//! before it is handed to a template.
//!
//! Built-in helpers (template spelling):
//!
//! | name              | shape         | emits                                  |
//! |-------------------|---------------|----------------------------------------|
//! | `in`              | text / error  | ` = ?` or ` IN (?,?,...)`              |
//! | `inPositional`    | text / error  | ` = $K` or ` IN ($K,$K+1,...)`         |
//! | `positionalParam` | text          | `$K` (or `?` for anonymous renders)    |
//! | `isSet`           | bool          | whether the argument is bound/non-zero |
//!
//! A template compiled from a registry takes a snapshot of it: names
//! registered afterwards are not visible to already-built templates.

use crate::placeholder::{
    equals_or_in, equals_or_in_positional, next_positional_param, Membership,
    PlaceholderCounter, PlaceholderStyle, Presence,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Error returned by a fallible template function
pub type FunctionError = Box<dyn std::error::Error + Send + Sync>;

/// A template function panicked during a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPanic {
    message: String,
}

impl FunctionPanic {
    pub(crate) fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self { message }
    }

    /// The panic message, when the payload was a string.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for FunctionPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panicked: {}", self.message)
    }
}

impl std::error::Error for FunctionPanic {}

type TextFn = dyn Fn(&mut RenderScope, &[Value]) -> String + Send + Sync;
type TextResultFn = dyn Fn(&mut RenderScope, &[Value]) -> Result<String, FunctionError> + Send + Sync;
type BoolFn = dyn Fn(&mut RenderScope, &[Value]) -> bool + Send + Sync;

/// Names owned by the template engine's built-in helpers.
const RESERVED_NAMES: &[&str] = &[
    "if", "unless", "each", "with", "lookup", "log", "eq", "ne", "gt", "gte", "lt", "lte", "and",
    "or", "not", "len", "this", "else",
];

/// Per-render state handed to every template function.
///
/// Holds the placeholder counter for numbered renders (none for anonymous
/// renders), the number of placeholders emitted so far and the first
/// function failure.
#[derive(Debug)]
pub struct RenderScope {
    counter: Option<PlaceholderCounter>,
    emitted: usize,
    failure: Option<(String, FunctionError)>,
}

impl RenderScope {
    pub fn new(style: PlaceholderStyle) -> Self {
        let counter = match style {
            PlaceholderStyle::Anonymous => None,
            PlaceholderStyle::Numbered => Some(PlaceholderCounter::new()),
        };
        Self {
            counter,
            emitted: 0,
            failure: None,
        }
    }

    /// Numbered render whose first placeholder is `$bound+1`.
    pub fn numbered_after(bound: usize) -> Self {
        Self {
            counter: Some(PlaceholderCounter::starting_at(bound)),
            emitted: 0,
            failure: None,
        }
    }

    pub fn style(&self) -> PlaceholderStyle {
        if self.counter.is_some() {
            PlaceholderStyle::Numbered
        } else {
            PlaceholderStyle::Anonymous
        }
    }

    /// The render's counter, absent for anonymous renders.
    pub fn counter(&mut self) -> Option<&mut PlaceholderCounter> {
        self.counter.as_mut()
    }

    /// Emit one placeholder in the render's dialect.
    pub fn next_placeholder(&mut self) -> String {
        self.emitted += 1;
        next_positional_param(self.counter.as_mut())
    }

    /// Account for placeholders a function wrote without [`Self::next_placeholder`].
    pub fn record_placeholders(&mut self, count: usize) {
        self.emitted += count;
    }

    /// Placeholders emitted by helpers during this render.
    pub fn placeholders(&self) -> usize {
        self.emitted
    }

    pub(crate) fn record_failure(&mut self, function: &str, error: FunctionError) {
        if self.failure.is_none() {
            self.failure = Some((function.to_string(), error));
        }
    }

    pub(crate) fn take_failure(&mut self) -> Option<(String, FunctionError)> {
        self.failure.take()
    }
}

/// Return shape of a template function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionShape {
    /// `(text)`
    Text,
    /// `(text, error)`
    TextResult,
    /// `(boolean)`
    Bool,
}

impl fmt::Display for FunctionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionShape::Text => write!(f, "(text)"),
            FunctionShape::TextResult => write!(f, "(text, error)"),
            FunctionShape::Bool => write!(f, "(boolean)"),
        }
    }
}

/// A callable a template may invoke.
///
/// The accepted return shapes form a closed set; a closure returning anything
/// else is rejected by the compiler:
///
/// ```compile_fail
/// use sql_templater::TemplateFn;
///
/// // (int, error) is not an accepted shape
/// let f = TemplateFn::text_result(|_, _| Ok::<i64, std::io::Error>(42));
/// ```
///
/// ```compile_fail
/// use sql_templater::TemplateFn;
///
/// // not invocable at all
/// let f = TemplateFn::text("SELECT 1");
/// ```
#[derive(Clone)]
pub enum TemplateFn {
    Text(Arc<TextFn>),
    TextResult(Arc<TextResultFn>),
    Bool(Arc<BoolFn>),
}

impl TemplateFn {
    pub fn text<F>(f: F) -> Self
    where
        F: Fn(&mut RenderScope, &[Value]) -> String + Send + Sync + 'static,
    {
        TemplateFn::Text(Arc::new(f))
    }

    pub fn text_result<F, E>(f: F) -> Self
    where
        F: Fn(&mut RenderScope, &[Value]) -> Result<String, E> + Send + Sync + 'static,
        E: Into<FunctionError>,
    {
        TemplateFn::TextResult(Arc::new(move |scope: &mut RenderScope, args: &[Value]| {
            f(scope, args).map_err(Into::into)
        }))
    }

    pub fn boolean<F>(f: F) -> Self
    where
        F: Fn(&mut RenderScope, &[Value]) -> bool + Send + Sync + 'static,
    {
        TemplateFn::Bool(Arc::new(f))
    }

    pub fn shape(&self) -> FunctionShape {
        match self {
            TemplateFn::Text(_) => FunctionShape::Text,
            TemplateFn::TextResult(_) => FunctionShape::TextResult,
            TemplateFn::Bool(_) => FunctionShape::Bool,
        }
    }

    /// Call the function, normalising its result to a template value.
    pub fn invoke(&self, scope: &mut RenderScope, args: &[Value]) -> Result<Value, FunctionError> {
        match self {
            TemplateFn::Text(f) => Ok(Value::String(f(scope, args))),
            TemplateFn::TextResult(f) => f(scope, args).map(Value::String),
            TemplateFn::Bool(f) => Ok(Value::Bool(f(scope, args))),
        }
    }
}

impl fmt::Debug for TemplateFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TemplateFn").field(&self.shape()).finish()
    }
}

/// Which built-ins a registry is seeded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionSet {
    /// `in`, `inPositional`, `positionalParam`, `isSet`; accepts boolean functions
    #[default]
    Standard,
    /// `in`, `positionalParam`; text functions only
    Basic,
}

/// Registration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is already registered
    DuplicateName(String),
    /// The name belongs to one of the template engine's own helpers
    ReservedName(String),
    /// The name cannot be spelled as a helper call in template source
    InvalidName(String),
    /// The function's return shape is not accepted by this registry
    Signature { name: String, shape: FunctionShape },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => {
                write!(f, "function name already registered: {name}")
            }
            RegistryError::ReservedName(name) => {
                write!(f, "function name is reserved by the template engine: {name}")
            }
            RegistryError::InvalidName(name) => {
                write!(f, "invalid function name: {name:?}")
            }
            RegistryError::Signature { name, shape } => {
                write!(
                    f,
                    "function {name} must return (text) or (text, error), got {shape}"
                )
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Name to callable mapping exposed to templates.
///
/// # Examples
///
/// ```
/// use sql_templater::{FunctionRegistry, TemplateFn};
///
/// let mut functions = FunctionRegistry::new();
/// functions
///     .register("like", TemplateFn::text(|scope, _| format!(" LIKE {}", scope.next_placeholder())))
///     .unwrap();
///
/// assert!(functions.register("in", TemplateFn::text(|_, _| String::new())).is_err());
/// assert!(functions.contains("like"));
/// ```
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    set: FunctionSet,
    functions: BTreeMap<String, TemplateFn>,
}

impl FunctionRegistry {
    /// Registry seeded with the full set of built-ins.
    pub fn new() -> Self {
        Self::with_set(FunctionSet::Standard)
    }

    /// Registry seeded with `in` and `positionalParam` only.
    pub fn basic() -> Self {
        Self::with_set(FunctionSet::Basic)
    }

    pub fn with_set(set: FunctionSet) -> Self {
        let mut functions = BTreeMap::new();
        functions.insert("in".to_string(), TemplateFn::text_result(builtin_in));
        functions.insert(
            "positionalParam".to_string(),
            TemplateFn::text(builtin_positional_param),
        );
        if set == FunctionSet::Standard {
            functions.insert(
                "inPositional".to_string(),
                TemplateFn::text_result(builtin_in_positional),
            );
            functions.insert("isSet".to_string(), TemplateFn::boolean(builtin_is_set));
        }
        Self { set, functions }
    }

    pub fn set(&self) -> FunctionSet {
        self.set
    }

    /// Add `f` under `name`.
    ///
    /// # Errors
    ///
    /// Fails without touching the registry when `name` is taken, reserved or
    /// unspellable, or when `f` returns a boolean and this is a
    /// [`FunctionSet::Basic`] registry.
    pub fn register(&mut self, name: impl Into<String>, f: TemplateFn) -> Result<(), RegistryError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(RegistryError::ReservedName(name));
        }
        if !is_valid_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.set == FunctionSet::Basic && f.shape() == FunctionShape::Bool {
            return Err(RegistryError::Signature {
                name,
                shape: FunctionShape::Bool,
            });
        }

        log::debug!("registered template function {name} {}", f.shape());
        self.functions.insert(name, f);
        Ok(())
    }

    /// Read-only view of the registry for the template engine.
    pub fn export(&self) -> &BTreeMap<String, TemplateFn> {
        &self.functions
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug)]
struct ArityError {
    function: &'static str,
    expected: usize,
    got: usize,
}

impl fmt::Display for ArityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} expects {} argument(s), got {}",
            self.function, self.expected, self.got
        )
    }
}

impl std::error::Error for ArityError {}

fn single_arg<'a>(function: &'static str, args: &'a [Value]) -> Result<&'a Value, FunctionError> {
    match args {
        [value] => Ok(value),
        _ => Err(Box::new(ArityError {
            function,
            expected: 1,
            got: args.len(),
        })),
    }
}

fn builtin_in(scope: &mut RenderScope, args: &[Value]) -> Result<String, FunctionError> {
    let values = single_arg("in", args)?;
    let fragment = equals_or_in(values)?;
    scope.record_placeholders(values.cardinality());
    Ok(fragment)
}

fn builtin_in_positional(scope: &mut RenderScope, args: &[Value]) -> Result<String, FunctionError> {
    let values = single_arg("inPositional", args)?;
    let fragment = equals_or_in_positional(values, scope.counter())?;
    scope.record_placeholders(values.cardinality());
    Ok(fragment)
}

fn builtin_positional_param(scope: &mut RenderScope, _: &[Value]) -> String {
    scope.next_placeholder()
}

fn builtin_is_set(_: &mut RenderScope, args: &[Value]) -> bool {
    args.first().is_some_and(Presence::is_present)
}
