//! Routing and workflow orchestration over three interchangeable backends.

pub mod api;
pub mod backend;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod planner;
pub mod quota;
pub mod router;
