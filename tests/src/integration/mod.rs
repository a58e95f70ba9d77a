//! Cross-module integration scenarios.

mod allocation_flow;
mod reconciliation;
