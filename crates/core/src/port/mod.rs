// Port Layer - Interfaces injected into the worker pool

pub mod observer;
pub mod time_provider;
pub mod transform;

// Re-exports
pub use observer::{
    CollectingObserver, EventKind, NoopObserver, PoolObserver, TracingObserver, WorkerEvent,
};
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use transform::{Doubling, Transform};
