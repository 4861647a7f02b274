//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - MongoDB testcontainer setup and fixture seeding
//! - Recording mocks for `AggregationSource` and `SnapshotStore`

#![allow(dead_code)]

pub mod containers;
pub mod mock_store;

pub use containers::*;
pub use mock_store::*;
