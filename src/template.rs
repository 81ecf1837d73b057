//! Compiled SQL templates.
//!
//! A [`SqlTemplate`] pairs a handlebars template with a snapshot of a
//! [`FunctionRegistry`] and a placeholder dialect. Rendering produces a
//! [`RenderedQuery`]; nothing is cached between renders.
//!
//! ```
//! use sql_templater::SqlTemplate;
//! use serde_json::json;
//!
//! let template = SqlTemplate::new(
//!     "users_by_id",
//!     "SELECT id, name FROM users WHERE id{{inPositional ids}}",
//! )?;
//! let query = template.render(&json!({ "ids": [4, 8, 15] }))?;
//! assert_eq!(query.sql(), "SELECT id, name FROM users WHERE id IN ($1,$2,$3)");
//! # Ok::<(), sql_templater::TemplateError>(())
//! ```

use crate::config::TemplateConfig;
use crate::engine::{self, SharedScope};
use crate::functions::{FunctionError, FunctionRegistry, RenderScope};
use crate::placeholder::PlaceholderStyle;
use handlebars::Handlebars;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

const DEFAULT_TEMPLATE_NAME: &str = "tpl";

/// Template compilation or render error
#[derive(Debug)]
pub enum TemplateError {
    /// A builder option was rejected
    InvalidOption(String),
    /// The template source could not be parsed
    Parse {
        template: String,
        source: Box<handlebars::TemplateError>,
    },
    /// The engine failed while rendering
    Render {
        template: String,
        input: String,
        source: Box<handlebars::RenderError>,
    },
    /// A registry function returned an error while rendering
    Function {
        template: String,
        function: String,
        input: String,
        source: FunctionError,
    },
}

impl TemplateError {
    /// The function error, if a registry function caused the failure.
    ///
    /// Lets callers tell an empty membership set (see
    /// [`PlaceholderError::EmptySet`](crate::PlaceholderError::EmptySet))
    /// apart from genuine faults.
    pub fn function_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TemplateError::Function { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::InvalidOption(s) => {
                write!(f, "Invalid template option: {s}")
            }
            TemplateError::Parse { template, source } => {
                write!(f, "unable to parse template {template}: {source}")
            }
            TemplateError::Render {
                template,
                input,
                source,
            } => {
                write!(
                    f,
                    "unable to execute template {template} with object {input}: {source}"
                )
            }
            TemplateError::Function {
                template,
                function,
                input,
                source,
            } => {
                write!(
                    f,
                    "unable to execute template {template} with object {input}: function {function}: {source}"
                )
            }
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TemplateError::InvalidOption(_) => None,
            TemplateError::Parse { source, .. } => Some(source.as_ref()),
            TemplateError::Render { source, .. } => Some(source.as_ref()),
            TemplateError::Function { source, .. } => Some(source.as_ref()),
        }
    }
}

/// Output of one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    sql: String,
    style: PlaceholderStyle,
    placeholders: usize,
}

impl RenderedQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn into_sql(self) -> String {
        self.sql
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    /// Placeholders emitted by registry helpers. Placeholders written
    /// literally in the template source are not counted.
    pub fn placeholders(&self) -> usize {
        self.placeholders
    }
}

impl fmt::Display for RenderedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Builder for [`SqlTemplate`].
#[derive(Debug, Clone)]
pub struct SqlTemplateBuilder {
    source: String,
    name: String,
    schema: Option<(String, String)>,
    functions: Option<FunctionRegistry>,
    style: PlaceholderStyle,
    strict: bool,
}

impl SqlTemplateBuilder {
    fn new(source: String) -> Self {
        Self {
            source,
            name: DEFAULT_TEMPLATE_NAME.to_string(),
            schema: None,
            functions: None,
            style: PlaceholderStyle::default(),
            strict: false,
        }
    }

    /// Template name used in error messages (default `tpl`).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rewrite every quoted `"placeholder"` identifier in the source to the
    /// data field `param`, so one template can address several schemas.
    ///
    /// ```
    /// use sql_templater::SqlTemplate;
    /// use serde_json::json;
    ///
    /// let template = SqlTemplate::builder(r#"SELECT * FROM "public".users"#)
    ///     .dynamic_schema("public", "tenant")
    ///     .build()?;
    /// let query = template.render(&json!({ "tenant": "acme" }))?;
    /// assert_eq!(query.sql(), r#"SELECT * FROM "acme".users"#);
    /// # Ok::<(), sql_templater::TemplateError>(())
    /// ```
    pub fn dynamic_schema(mut self, placeholder: impl Into<String>, param: impl Into<String>) -> Self {
        self.schema = Some((placeholder.into(), param.into()));
        self
    }

    /// Use `functions` instead of the default registry.
    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn style(mut self, style: PlaceholderStyle) -> Self {
        self.style = style;
        self
    }

    /// Fail renders that reference missing fields.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Apply the `[templates]` configuration section.
    pub fn config(self, config: &TemplateConfig) -> Self {
        self.style(config.placeholder_style).strict(config.strict_mode)
    }

    /// Validate options and compile the template.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::InvalidOption` for an empty name or an
    /// incomplete dynamic schema, and `TemplateError::Parse` when the source
    /// does not parse.
    pub fn build(self) -> Result<SqlTemplate, TemplateError> {
        if self.name.is_empty() {
            return Err(TemplateError::InvalidOption(
                "name cannot be empty".to_string(),
            ));
        }

        let mut source = self.source;
        if let Some((placeholder, param)) = &self.schema {
            if placeholder.is_empty() || param.is_empty() {
                return Err(TemplateError::InvalidOption(
                    "schema placeholder and parameter cannot be empty".to_string(),
                ));
            }
            source = source.replace(&format!("\"{placeholder}\""), &format!("\"{{{{{param}}}}}\""));
        }

        let mut engine = engine::new_engine(self.strict);
        engine
            .register_template_string(&self.name, &source)
            .map_err(|e| TemplateError::Parse {
                template: self.name.clone(),
                source: Box::new(e),
            })?;

        Ok(SqlTemplate {
            name: self.name,
            engine,
            functions: self.functions.unwrap_or_default(),
            style: self.style,
        })
    }
}

/// A compiled, render-ready SQL template.
///
/// Safe to share between threads; each render gets its own
/// [`RenderScope`](crate::RenderScope).
#[derive(Debug, Clone)]
pub struct SqlTemplate {
    name: String,
    engine: Handlebars<'static>,
    functions: FunctionRegistry,
    style: PlaceholderStyle,
}

impl SqlTemplate {
    /// Compile `source` under `name` with the default registry and numbered
    /// placeholders.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Result<Self, TemplateError> {
        Self::builder(source).name(name).build()
    }

    pub fn builder(source: impl Into<String>) -> SqlTemplateBuilder {
        SqlTemplateBuilder::new(source.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style(&self) -> PlaceholderStyle {
        self.style
    }

    /// The registry snapshot this template renders with.
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Render against `data` with a fresh placeholder counter.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError::Function` when a registry function fails
    /// (for instance an empty membership set) and `TemplateError::Render` for
    /// any other engine failure. Both carry the template name and the input.
    pub fn render<T: Serialize>(&self, data: &T) -> Result<RenderedQuery, TemplateError> {
        self.render_in(data, RenderScope::new(self.style))
    }

    /// Render with numbered placeholders starting at `$bound+1`, for
    /// templates appended to a statement that already binds `bound`
    /// parameters.
    pub fn render_after<T: Serialize>(
        &self,
        data: &T,
        bound: usize,
    ) -> Result<RenderedQuery, TemplateError> {
        self.render_in(data, RenderScope::numbered_after(bound))
    }

    fn render_in<T: Serialize>(
        &self,
        data: &T,
        scope: RenderScope,
    ) -> Result<RenderedQuery, TemplateError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::render_template_span(&self.name).entered();

        let style = scope.style();
        let scope: SharedScope = Arc::new(Mutex::new(scope));
        let engine = engine::bind_functions(&self.engine, &self.functions, &scope);
        let result = engine.render(&self.name, data);
        drop(engine);

        let mut scope = engine::lock_scope(&scope);
        match result {
            Ok(sql) => {
                #[cfg(feature = "metrics")]
                METRICS.record_render();
                Ok(RenderedQuery {
                    sql,
                    style,
                    placeholders: scope.placeholders(),
                })
            }
            Err(err) => {
                #[cfg(feature = "metrics")]
                METRICS.record_render_error();
                let input = describe_input(data);
                let err = match scope.take_failure() {
                    Some((function, source)) => TemplateError::Function {
                        template: self.name.clone(),
                        function,
                        input,
                        source,
                    },
                    None => TemplateError::Render {
                        template: self.name.clone(),
                        input,
                        source: Box::new(err),
                    },
                };
                log::error!("render of template {} failed: {err}", self.name);
                Err(err)
            }
        }
    }
}

fn describe_input<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string(data).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}
