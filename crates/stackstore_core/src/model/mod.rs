//! Domain model for the persisted stack.
//!
//! # Responsibility
//! - Define the entry record and its link encoding.
//! - Define the singleton direction configuration.
//!
//! # Invariants
//! - Every entry is identified by a stable `EntryId`.
//! - Entries are hard-deleted only when popped.

pub mod entry;
