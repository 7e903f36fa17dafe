//! Storage abstraction and implementations for EvMan.
//!
//! This crate provides a trait-based store for task-list definitions,
//! baseline snapshots and the project hierarchy, with a JSON file
//! implementation.

#![warn(missing_docs)]

pub mod store;
pub mod json_store;

pub use store::{Result, ScheduleStore, StorageError};
pub use json_store::JsonStore;
