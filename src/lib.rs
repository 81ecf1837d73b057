//! # sql-templater
//!
//! Parameterized SQL from text templates. Templates call a small set of
//! helpers that turn variable-length membership filters into `= ?` /
//! `IN (?,?,...)` fragments and hand out numbered `$N` placeholders from a
//! counter scoped to a single render. Rendered queries run over
//! `may_postgres` through [`TemplatedQuery`], which adds ordering, paging and
//! row counting.
//!
//! ```
//! use sql_templater::SqlTemplate;
//! use serde_json::json;
//!
//! let template = SqlTemplate::new(
//!     "open_orders",
//!     "SELECT * FROM orders WHERE customer_id{{inPositional customers}}\
//!      {{#if (isSet status)}} AND status = {{positionalParam}}{{/if}}",
//! )?;
//!
//! let query = template.render(&json!({ "customers": [7, 9], "status": "open" }))?;
//! assert_eq!(
//!     query.sql(),
//!     "SELECT * FROM orders WHERE customer_id IN ($1,$2) AND status = $3"
//! );
//! # Ok::<(), sql_templater::TemplateError>(())
//! ```

pub mod config;
pub mod connection;
mod engine;
pub mod executor;
pub mod functions;
#[cfg(any(feature = "metrics", feature = "tracing"))]
pub mod metrics;
pub mod placeholder;
pub mod query;
pub mod template;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use config::{DatabaseConfig, TemplateConfig, TemplaterConfig};
pub use executor::{MayPostgresExecutor, SqlError, SqlExecutor};
pub use functions::{
    FunctionError, FunctionPanic, FunctionRegistry, FunctionSet, FunctionShape, RegistryError,
    RenderScope, TemplateFn,
};
pub use may_postgres::types::ToSql;
pub use placeholder::{
    equals_or_in, equals_or_in_positional, is_present, next_positional_param, Membership,
    PlaceholderCounter, PlaceholderError, PlaceholderStyle, Presence,
};
pub use query::{ParamHandler, TemplatedQuery, TemplatedQueryError};
pub use template::{RenderedQuery, SqlTemplate, SqlTemplateBuilder, TemplateError};
