//! HTLC atomic swaps between an EVM chain and a Cairo chain.
//!
//! A maker locks funds in a source escrow, a resolver mirrors them in a
//! destination escrow, and revealing the secret to claim one side publishes
//! it for the other. `cross_chain::OrderCoordinator` drives the whole flow
//! through the `onchain::ChainAdapter` interface.

pub mod config;
pub mod cross_chain;
pub mod data_structures;
pub mod errors;
pub mod htlc;
pub mod onchain;
pub mod order;

pub mod test_utils;

pub use errors::{Result, SwapError};
