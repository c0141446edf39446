//! Task dispatch: handler registry, error types and the consumer pool.

pub mod error;
pub mod pool;
pub mod registry;

pub use error::{DispatchError, TaskError};
pub use pool::{Dispatcher, DispatcherConfig, TaskOutcome};
pub use registry::{boxed, BoxFuture, HandlerOptions, HandlerRegistry, TaskContext};
