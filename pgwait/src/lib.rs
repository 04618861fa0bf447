pub mod config;
pub mod error;
pub mod exec;
pub mod wait;
