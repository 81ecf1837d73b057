//! Placeholder Generator
//!
//! Translates the cardinality of a value into a SQL membership fragment
//! (`= ?`, `IN (?,?)`, `= $3`, `IN ($4,$5)`) in one of two placeholder dialects.
//!
//! Everything here is pure apart from advancing a [`PlaceholderCounter`].
//! A counter belongs to exactly one render: create a fresh one per render and
//! thread it by `&mut` through every call that emits a placeholder.

use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

/// Placeholder dialect understood by the target driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderStyle {
    /// Anonymous `?` markers (MySQL, SQLite, most `database/sql`-style drivers)
    Anonymous,
    /// Numbered `$1, $2, ...` markers (PostgreSQL)
    #[default]
    Numbered,
}

impl fmt::Display for PlaceholderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderStyle::Anonymous => write!(f, "anonymous"),
            PlaceholderStyle::Numbered => write!(f, "numbered"),
        }
    }
}

/// Placeholder generation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceholderError {
    /// A membership filter was asked to render for a zero-length set
    EmptySet,
}

impl fmt::Display for PlaceholderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceholderError::EmptySet => {
                write!(f, "must have at least one item for a membership clause")
            }
        }
    }
}

impl std::error::Error for PlaceholderError {}

/// Last-used positional parameter index for a single render.
///
/// Indices are 1-based, strictly increasing and gapless. The counter is
/// deliberately not `Clone`: two copies of one counter would hand out the
/// same index twice.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlaceholderCounter {
    last: usize,
}

impl PlaceholderCounter {
    /// A counter that will hand out `$1` next.
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// A counter resuming after `bound` parameters the caller already placed
    /// by hand, so the next placeholder is `$bound+1`.
    pub fn starting_at(bound: usize) -> Self {
        Self { last: bound }
    }

    /// The last index handed out (0 when nothing was emitted yet).
    pub fn last(&self) -> usize {
        self.last
    }

    fn advance(&mut self) -> usize {
        self.last += 1;
        self.last
    }
}

/// "Is this a finite ordered collection, and how long is it?"
///
/// Sequences report their length; every other kind is a scalar and counts
/// as a single-element set.
pub trait Membership {
    fn cardinality(&self) -> usize {
        1
    }
}

impl<T> Membership for [T] {
    fn cardinality(&self) -> usize {
        self.len()
    }
}

impl<T, const N: usize> Membership for [T; N] {
    fn cardinality(&self) -> usize {
        N
    }
}

impl<T> Membership for Vec<T> {
    fn cardinality(&self) -> usize {
        self.len()
    }
}

impl<T> Membership for VecDeque<T> {
    fn cardinality(&self) -> usize {
        self.len()
    }
}

impl<M: Membership + ?Sized> Membership for &M {
    fn cardinality(&self) -> usize {
        (**self).cardinality()
    }
}

macro_rules! scalar_membership {
    ($($ty:ty),* $(,)?) => {
        $(impl Membership for $ty {})*
    };
}

scalar_membership!(
    str, String, char, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32,
    f64,
);

/// Template values: arrays are sets, null (a missing or unset field) is an
/// empty set, everything else is a scalar.
impl Membership for Value {
    fn cardinality(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Null => 0,
            _ => 1,
        }
    }
}

/// Membership fragment using anonymous `?` placeholders.
///
/// ```
/// use sql_templater::placeholder::equals_or_in;
///
/// assert_eq!(equals_or_in(&["a", "b", "c"]).unwrap(), " IN (?,?,?)");
/// assert_eq!(equals_or_in("x").unwrap(), " = ?");
/// assert!(equals_or_in(&Vec::<i64>::new()).is_err());
/// ```
pub fn equals_or_in<M: Membership + ?Sized>(values: &M) -> Result<String, PlaceholderError> {
    membership_fragment(values.cardinality(), || "?".to_string())
}

/// Membership fragment whose placeholders come from [`next_positional_param`].
///
/// Each element consumes its own index, so a call for `n` elements advances
/// the counter by exactly `max(1, n)`. Without a counter this degrades to
/// anonymous `?` markers.
pub fn equals_or_in_positional<M: Membership + ?Sized>(
    values: &M,
    mut counter: Option<&mut PlaceholderCounter>,
) -> Result<String, PlaceholderError> {
    membership_fragment(values.cardinality(), || {
        next_positional_param(counter.as_deref_mut())
    })
}

/// Next placeholder for the render owning `counter`.
///
/// Absent counter: `?` on every call. Otherwise the counter advances and the
/// result is `$<counter>`.
pub fn next_positional_param(counter: Option<&mut PlaceholderCounter>) -> String {
    match counter {
        None => "?".to_string(),
        Some(counter) => format!("${}", counter.advance()),
    }
}

fn membership_fragment<F>(cardinality: usize, mut placeholder: F) -> Result<String, PlaceholderError>
where
    F: FnMut() -> String,
{
    match cardinality {
        0 => Err(PlaceholderError::EmptySet),
        1 => Ok(format!(" = {}", placeholder())),
        n => {
            let mut fragment = String::with_capacity(6 + n * 4);
            fragment.push_str(" IN (");
            for i in 0..n {
                if i > 0 {
                    fragment.push(',');
                }
                fragment.push_str(&placeholder());
            }
            fragment.push(')');
            Ok(fragment)
        }
    }
}

/// Whether a scalar counts as "set".
///
/// Zero, the empty string and `false` all count as unset. Note that this
/// makes a legitimate zero indistinguishable from an absent value.
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for str {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        *self
    }
}

macro_rules! numeric_presence {
    ($zero:expr => $($ty:ty),*) => {
        $(impl Presence for $ty {
            fn is_present(&self) -> bool {
                *self != $zero
            }
        })*
    };
}

numeric_presence!(0 => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
numeric_presence!(0.0 => f32, f64);

/// Template values. Null, arrays and objects are never "set".
impl Presence for Value {
    fn is_present(&self) -> bool {
        match self {
            Value::Null | Value::Array(_) | Value::Object(_) => false,
            Value::Bool(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i != 0
                } else if let Some(u) = n.as_u64() {
                    u != 0
                } else {
                    n.as_f64().is_some_and(|f| f != 0.0)
                }
            }
        }
    }
}

/// Bound and non-zero / non-empty.
///
/// ```
/// use sql_templater::placeholder::is_present;
///
/// let missing: Option<&i64> = None;
/// assert!(!is_present(missing));
/// assert!(!is_present(Some(&0i64)));
/// assert!(is_present(Some(&7i64)));
/// ```
pub fn is_present<T: Presence + ?Sized>(value: Option<&T>) -> bool {
    value.is_some_and(|v| v.is_present())
}
