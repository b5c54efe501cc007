//! Core domain types
//!
//! This module contains the core domain structures used across Framewise services.
//! These types are shared between the orchestrator (which creates and reads job
//! records) and the runner (which drives jobs to a terminal state).

pub mod analysis;
pub mod error;
pub mod job;
