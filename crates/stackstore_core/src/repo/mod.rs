//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the stack data access contract.
//! - Isolate SQLite link bookkeeping from service orchestration.
//!
//! # Invariants
//! - Every repository operation is one unit of work: it commits fully or
//!   leaves persisted state untouched.
//! - Repository APIs return semantic errors (`InvalidInput`, `BrokenChain`)
//!   in addition to DB transport errors.

pub mod stack_repo;
