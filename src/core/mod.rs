pub mod config;
pub mod errors;
pub mod extractor;
pub mod handler;
pub mod kernel;
pub mod registry;
pub mod types;
