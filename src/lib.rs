pub mod config;
pub mod engine;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod repository;
pub mod types;

pub use error::{EngineError, EngineResult};
pub use pipeline::Engine;
