//! Turnstile - In-Process Admission Control
//!
//! This crate gates access to expensive downstream operations (image
//! generation, search, daily quotes) with fixed-window request counting per
//! client. All state is in-memory and scoped to a single process; there is no
//! cross-instance coordination.

pub mod admission;
pub mod config;
pub mod error;
pub mod guard;
