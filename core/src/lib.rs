pub mod account;
pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod plugin;
pub mod retry;
pub mod session;
pub mod workflow;
