//! tradecel — trading rule expressions, variable context and market regimes.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. [`ExpressionEngine`] is the entry
//! point for hosts.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;

pub use domain::engine::ExpressionEngine;
