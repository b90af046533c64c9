//! Business-object graph model and planned-statement types.
//!
//! # Responsibility
//! - Define the object graph persisted by the batch repository.
//! - Define statements, notifications and batches produced from that graph.
//! - Define the save-action phases driving lifecycle processing.
//!
//! # Invariants
//! - Child composition is described by explicit `FieldValue` variants; no
//!   component inspects value types at runtime.

pub mod business_object;
pub mod save_action;
pub mod statement;
