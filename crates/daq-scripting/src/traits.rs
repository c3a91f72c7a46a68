//! ScriptEngine Trait - Scripting Interface
//!
//! Callers (the CLI, tests) drive scripts through [`ScriptEngine`] and never
//! touch the Rhai types directly. Execution is async so a script that blocks
//! on a camera readout does not stall the tokio runtime.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let mut engine = RhaiEngine::new(session)?;
//! engine.set_global("exptime", ScriptValue::new(0.5_f64))?;
//!
//! let script = r#"
//!     start();
//!     let cam = list()[0];
//!     set(cam, exptime, 2, 1, 2.0);
//!     acquire(cam)
//! "#;
//!
//! let path: String = engine.execute_script(script).await?.downcast().unwrap();
//! ```

use async_trait::async_trait;
use std::any::Any;
use std::fmt;

// =============================================================================
// ScriptValue - Type-Erased Value Container
// =============================================================================

/// Type-erased container for values passed between Rust and scripts.
///
/// The backend converts between its native values and the common Rust
/// scalars (`i64`, `f64`, `bool`, `String`, `()`).
pub struct ScriptValue {
    inner: Box<dyn Any + Send + Sync>,
}

impl ScriptValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// Take the value out if it has type `T`; hands `self` back otherwise.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        match self.inner.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(inner) => Err(Self { inner }),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.downcast_ref::<String>() {
            write!(f, "ScriptValue(String: {:?})", s)
        } else if let Some(i) = self.downcast_ref::<i64>() {
            write!(f, "ScriptValue(i64: {})", i)
        } else if let Some(fl) = self.downcast_ref::<f64>() {
            write!(f, "ScriptValue(f64: {})", fl)
        } else if let Some(b) = self.downcast_ref::<bool>() {
            write!(f, "ScriptValue(bool: {})", b)
        } else if self.downcast_ref::<()>().is_some() {
            write!(f, "ScriptValue(())")
        } else {
            write!(f, "ScriptValue(<unknown type>)")
        }
    }
}

// =============================================================================
// ScriptError - Unified Error Type
// =============================================================================

/// Error type for script execution failures.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The script does not parse.
    #[error("Syntax error: {message}")]
    SyntaxError { message: String },

    /// The script parsed but failed while running, including camera and file
    /// errors raised by the bindings.
    #[error("Runtime error: {message}")]
    RuntimeError { message: String },

    #[error("Variable not found: {name}")]
    VariableNotFound { name: String },

    #[error("Type conversion error: expected {expected}, found {found}")]
    TypeConversionError { expected: String, found: String },

    /// The blocking evaluation task panicked or was cancelled.
    #[error("Async error: {message}")]
    AsyncError { message: String },
}

// =============================================================================
// ScriptEngine Trait
// =============================================================================

/// Scripting backend interface.
///
/// Methods take `&mut self` for exclusive access; implementations share
/// state internally through `Arc<Mutex<..>>`.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Run `script` to completion and return the value of its last expression.
    async fn execute_script(&mut self, script: &str) -> Result<ScriptValue, ScriptError>;

    /// Check that `script` parses, without running it.
    async fn validate_script(&self, script: &str) -> Result<(), ScriptError>;

    /// Set a global visible to every subsequent execution.
    fn set_global(&mut self, name: &str, value: ScriptValue) -> Result<(), ScriptError>;

    fn get_global(&self, name: &str) -> Result<ScriptValue, ScriptError>;

    /// Drop every global variable.
    fn clear_globals(&mut self);

    fn backend_name(&self) -> &str;
}
