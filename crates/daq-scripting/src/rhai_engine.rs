//! Rhai ScriptEngine Implementation
//!
//! Wraps a Rhai [`Engine`] with the camera bindings registered and a global
//! [`Scope`] that persists across executions. Scripts are evaluated on tokio's
//! blocking pool because camera readouts block until the frame arrives.
//!
//! # Example
//!
//! ```rust,ignore
//! let session = Arc::new(Mutex::new(PicamDriver::new(sdk, persist, options)));
//! let mut engine = RhaiEngine::new(session)?;
//!
//! let path = engine
//!     .execute_script(r#"start(); let cam = list()[0]; set(cam, 1.0, 2, 1, 2.0); acquire(cam)"#)
//!     .await?;
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, EvalAltResult, Scope};
use std::sync::Arc;

use crate::bindings::{register_camera, CameraSession};
use crate::traits::{ScriptEngine, ScriptError, ScriptValue};

/// Default cap on Rhai operations per execution.
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Rhai-based scripting engine bound to one camera session.
pub struct RhaiEngine {
    engine: Arc<Engine>,
    scope: Arc<Mutex<Scope<'static>>>,
    session: CameraSession,
}

impl RhaiEngine {
    pub fn new(session: CameraSession) -> Result<Self, ScriptError> {
        Self::with_limit(session, DEFAULT_MAX_OPERATIONS)
    }

    /// Engine that aborts a script after `max_operations` Rhai operations.
    pub fn with_limit(session: CameraSession, max_operations: u64) -> Result<Self, ScriptError> {
        let mut engine = Engine::new();

        engine.on_progress(move |count| {
            if count > max_operations {
                Some(format!("Safety limit exceeded: maximum {} operations", max_operations).into())
            } else {
                None
            }
        });

        engine.on_print(|text| tracing::info!(target: "daq_scripting::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            tracing::debug!(
                target: "daq_scripting::script",
                source = source.unwrap_or(""),
                %pos,
                "{}",
                text
            )
        });

        register_camera(&mut engine, session.clone());

        Ok(Self {
            engine: Arc::new(engine),
            scope: Arc::new(Mutex::new(Scope::new())),
            session,
        })
    }

    /// The camera session the bindings drive.
    pub fn session(&self) -> &CameraSession {
        &self.session
    }

    fn dynamic_to_script_value(value: Dynamic) -> ScriptValue {
        if value.is::<i64>() {
            ScriptValue::new(value.cast::<i64>())
        } else if value.is::<f64>() {
            ScriptValue::new(value.cast::<f64>())
        } else if value.is::<bool>() {
            ScriptValue::new(value.cast::<bool>())
        } else if value.is::<String>() {
            ScriptValue::new(value.cast::<String>())
        } else if value.is::<()>() {
            ScriptValue::new(())
        } else {
            ScriptValue::new(value)
        }
    }

    fn script_value_to_dynamic(value: ScriptValue) -> Result<Dynamic, ScriptError> {
        if let Some(i) = value.downcast_ref::<i64>() {
            Ok(Dynamic::from(*i))
        } else if let Some(f) = value.downcast_ref::<f64>() {
            Ok(Dynamic::from(*f))
        } else if let Some(b) = value.downcast_ref::<bool>() {
            Ok(Dynamic::from(*b))
        } else if let Some(s) = value.downcast_ref::<String>() {
            Ok(Dynamic::from(s.clone()))
        } else if let Some(s) = value.downcast_ref::<&str>() {
            Ok(Dynamic::from(s.to_string()))
        } else if value.downcast_ref::<()>().is_some() {
            Ok(Dynamic::UNIT)
        } else if let Ok(dynamic) = value.downcast::<Dynamic>() {
            Ok(dynamic)
        } else {
            Err(ScriptError::TypeConversionError {
                expected: "i64, f64, bool, String or Dynamic".to_string(),
                found: "unknown type".to_string(),
            })
        }
    }

    #[allow(clippy::boxed_local)] // Rhai hands errors back boxed
    fn convert_rhai_error(err: Box<EvalAltResult>) -> ScriptError {
        match *err {
            EvalAltResult::ErrorParsing(parse_error, pos) => ScriptError::SyntaxError {
                message: format!("{} at position {}", parse_error, pos),
            },
            EvalAltResult::ErrorRuntime(msg, pos) => ScriptError::RuntimeError {
                message: format!("{} at position {}", msg, pos),
            },
            EvalAltResult::ErrorVariableNotFound(name, pos) => ScriptError::VariableNotFound {
                name: format!("{} at position {}", name, pos),
            },
            other => ScriptError::RuntimeError {
                message: other.to_string(),
            },
        }
    }
}

#[async_trait]
impl ScriptEngine for RhaiEngine {
    async fn execute_script(&mut self, script: &str) -> Result<ScriptValue, ScriptError> {
        let engine = self.engine.clone();
        let scope = self.scope.clone();
        let script = script.to_string();

        tokio::task::spawn_blocking(move || {
            let mut scope_guard = scope.lock();
            let result = engine
                .eval_with_scope::<Dynamic>(&mut scope_guard, &script)
                .map_err(Self::convert_rhai_error)?;
            Ok(Self::dynamic_to_script_value(result))
        })
        .await
        .map_err(|e| ScriptError::AsyncError {
            message: format!("Task join error: {}", e),
        })?
    }

    async fn validate_script(&self, script: &str) -> Result<(), ScriptError> {
        self.engine
            .compile(script)
            .map_err(|parse_error| ScriptError::SyntaxError {
                message: format!("Parse error: {}", parse_error),
            })?;
        Ok(())
    }

    fn set_global(&mut self, name: &str, value: ScriptValue) -> Result<(), ScriptError> {
        let dynamic = Self::script_value_to_dynamic(value)?;
        self.scope.lock().set_or_push(name.to_string(), dynamic);
        Ok(())
    }

    fn get_global(&self, name: &str) -> Result<ScriptValue, ScriptError> {
        self.scope
            .lock()
            .get_value::<Dynamic>(name)
            .map(Self::dynamic_to_script_value)
            .ok_or_else(|| ScriptError::VariableNotFound {
                name: name.to_string(),
            })
    }

    fn clear_globals(&mut self) {
        *self.scope.lock() = Scope::new();
    }

    fn backend_name(&self) -> &str {
        "Rhai"
    }
}
