pub mod config;
pub mod determinism;
pub mod draft;
pub mod engine;
pub mod export;
pub mod filters;
pub mod journal;
pub mod model;
pub mod mutate;
pub mod progress;
pub mod resolve;
pub mod signals;
pub mod snapshot;
pub mod sources;
pub mod store;
pub mod worker;

pub mod error;
