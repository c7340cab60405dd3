pub mod cache;
pub mod config;
pub mod error;
pub mod maven;
pub mod models;
pub mod pipeline;
pub mod replacement;
pub mod reporter;
pub mod repository;
pub mod session;
pub mod utils;

pub use error::Error;
pub use session::Session;
