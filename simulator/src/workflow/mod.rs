pub mod config;
pub mod runner;
pub mod runtime;
pub mod sink;
