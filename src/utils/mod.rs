//! Shared utilities.

pub mod retry;
