//! Data Transfer Objects
//!
//! Shapes returned to API consumers. DTOs are derived from domain records and
//! carry presentation details (links, computed durations) the records do not.

pub mod job;
