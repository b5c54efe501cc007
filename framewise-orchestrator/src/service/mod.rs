//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services sit between the HTTP handlers and the job lifecycle.

pub mod job;

pub use job as job_service;
