//! Native execution of kiln modules.
//!
//! A module is compiled once by the process-wide [`ExecutionEngine`]; its
//! functions are then called with dynamically typed host [`Value`]s through
//! [`invoke`] or with raw integers through [`invoke_raw`].

pub mod config;
pub mod engine;
pub mod error;
pub mod invoke;
pub mod marshal;
mod symbols;
mod translator;
pub mod value;

pub use config::{EngineConfig, OptLevel};
pub use engine::ExecutionEngine;
pub use error::{EngineError, InvokeError, MarshalError};
pub use invoke::{invoke, invoke_raw};
pub use marshal::{host_to_native, native_to_host, NativeInt, NativePtr, NativeValue};
pub use value::{ClassInfo, HandleOrigin, HostCategory, Object, OpaqueHandle, Value};
