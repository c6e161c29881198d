pub mod aggregate;
pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fake_source;
pub mod lock;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod query;
pub mod scheduler;
pub mod source;
pub mod staging;
pub mod validate;
