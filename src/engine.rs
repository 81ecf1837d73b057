//! Binds a [`FunctionRegistry`] into the `handlebars` engine.
//!
//! Every registry entry becomes a helper bound to one render's
//! [`RenderScope`]. Helpers are registered on a per-render copy of the engine,
//! so two renders never share a counter. A panicking function fails the
//! render like any other function error.

use crate::functions::{FunctionError, FunctionPanic, FunctionRegistry, RenderScope, TemplateFn};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson,
};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) type SharedScope = Arc<Mutex<RenderScope>>;

/// Lock a render scope, recovering it if a helper panicked mid-render.
pub(crate) fn lock_scope(scope: &SharedScope) -> MutexGuard<'_, RenderScope> {
    scope.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A fresh engine with SQL-friendly settings: no HTML escaping.
pub(crate) fn new_engine(strict: bool) -> Handlebars<'static> {
    let mut engine = Handlebars::new();
    engine.register_escape_fn(handlebars::no_escape);
    engine.set_strict_mode(strict);
    engine
}

/// Copy of `base` whose helpers all write into `scope`.
pub(crate) fn bind_functions(
    base: &Handlebars<'static>,
    functions: &FunctionRegistry,
    scope: &SharedScope,
) -> Handlebars<'static> {
    let mut engine = base.clone();
    for (name, func) in functions.export() {
        engine.register_helper(
            name,
            Box::new(ScopedHelper {
                name: name.clone(),
                func: func.clone(),
                scope: Arc::clone(scope),
            }),
        );
    }
    engine
}

struct ScopedHelper {
    name: String,
    func: TemplateFn,
    scope: SharedScope,
}

impl HelperDef for ScopedHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        let mut scope = lock_scope(&self.scope);
        let invoke = AssertUnwindSafe(|| self.func.invoke(&mut scope, &args));
        let outcome = panic::catch_unwind(invoke).unwrap_or_else(|payload| {
            log::error!("template function {} panicked", self.name);
            Err(FunctionError::from(FunctionPanic::from_payload(&*payload)))
        });
        match outcome {
            Ok(value) => Ok(ScopedJson::Derived(value)),
            Err(err) => {
                let message = format!("function {} failed: {err}", self.name);
                scope.record_failure(&self.name, err);
                Err(RenderErrorReason::Other(message).into())
            }
        }
    }
}
