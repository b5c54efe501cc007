//! Framewise Core
//!
//! Core types and abstractions for the Framewise video-analysis job system.
//!
//! This crate contains:
//! - Domain types: job records, the status state machine, analysis payloads
//!   and the error taxonomy shared by every service
//! - DTOs: the shapes returned to API consumers

pub mod domain;
pub mod dto;
