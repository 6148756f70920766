//! Shared types for Runfence: the error taxonomy, configuration tree,
//! lifecycle event model, tool capability, and structured trace events.

pub mod config;
pub mod error;
pub mod event;
pub mod tool;
pub mod trace;
