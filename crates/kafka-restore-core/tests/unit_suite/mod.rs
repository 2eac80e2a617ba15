//! Unit tests for kafka-restore-core.

pub mod config;
pub mod helpers;
pub mod pipeline;
