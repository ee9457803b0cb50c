//! Script runtime management
//!
//! One QuickJS runtime and context. Natives are injected into the context's
//! globals by [`install_natives`](crate::install_natives).

use rquickjs::{Context, FromJs, Runtime};
use std::path::Path;

use crate::error::ScriptError;

/// Script execution context
pub struct ScriptRuntime {
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
    pub context: Context,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;

        Ok(Self { runtime, context })
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "executing script file");
        self.execute(&source)
    }

    pub fn execute(&self, source: &str) -> Result<(), ScriptError> {
        self.evaluate::<()>(source)
    }

    /// Evaluate `source` and convert its completion value.
    pub fn evaluate<T>(&self, source: &str) -> Result<T, ScriptError>
    where
        T: for<'js> FromJs<'js>,
    {
        let value = self.context.with(|ctx| ctx.eval::<T, _>(source))?;
        Ok(value)
    }

    /// Call a JavaScript function by name with no arguments.
    pub fn call_function(&self, name: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            let func: rquickjs::Function = ctx.globals().get(name)?;
            func.call::<_, ()>(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_expressions() {
        let runtime = ScriptRuntime::new().unwrap();
        assert_eq!(runtime.evaluate::<i32>("1 + 2").unwrap(), 3);
        assert!(runtime.evaluate::<bool>("typeof print === 'undefined'").unwrap());
    }

    #[test]
    fn calls_global_functions() {
        let runtime = ScriptRuntime::new().unwrap();
        runtime
            .execute("var hits = 0; function tick() { hits += 1; }")
            .unwrap();
        runtime.call_function("tick").unwrap();
        runtime.call_function("tick").unwrap();
        assert_eq!(runtime.evaluate::<i32>("hits").unwrap(), 2);
    }

    #[test]
    fn reports_script_errors() {
        let runtime = ScriptRuntime::new().unwrap();
        assert!(matches!(
            runtime.execute("throw new Error('boom')"),
            Err(ScriptError::Js(_))
        ));
        assert!(matches!(
            runtime.call_function("missing"),
            Err(ScriptError::Js(_))
        ));
        assert!(matches!(
            runtime.execute_file(Path::new("/nonexistent/morphs.js")),
            Err(ScriptError::Io(_))
        ));
    }
}
