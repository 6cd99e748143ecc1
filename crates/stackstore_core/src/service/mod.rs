//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own the connection and the lock that serializes access to it.

pub mod stack_service;
