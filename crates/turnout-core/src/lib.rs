//! Core types, the reconciliation engine and the `TallyStore` trait for
//! turnout.
//!
//! This crate is free of HTTP and database dependencies. Every other crate
//! depends on it; the engine here is pure and is driven by the storage
//! backends from inside their write transactions.

// Native `async fn` in traits; the store trait spells out `Send` bounds on
// its returned futures explicitly.
#![allow(async_fn_in_trait)]

pub mod calendar;
pub mod error;
pub mod reconcile;
pub mod report;
pub mod resync;
pub mod station;
pub mod store;
pub mod tally;
pub mod trigger;
pub mod vote;

pub use error::{Error, Result};
