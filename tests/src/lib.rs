//! # Hemoflow Test Suite
//!
//! Unified test crate for cross-module scenarios.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── allocation_flow.rs   # Engine scenarios end to end
//!     └── reconciliation.rs    # Scheduler lifecycle and dual triggers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p hemoflow-tests
//!
//! # By category
//! cargo test -p hemoflow-tests integration::
//! ```

#![allow(dead_code)]

pub mod integration;
