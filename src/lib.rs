pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod relay;
pub mod store;
