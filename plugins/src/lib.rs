//! Concrete plugins for tribridge: backend adapters, retry/concurrency
//! strategies, event renderers and the factory wiring them from `AppConfig`.

pub mod backend;
pub mod executor;
pub mod factory;
