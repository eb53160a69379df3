// Cross-chain swap orchestration

pub mod retry;
pub mod signer;
pub mod swap_coordinator;
pub mod types;

pub use signer::{ChainSigner, SwapCapabilities};
pub use swap_coordinator::{OrderCoordinator, SwapRequest};
pub use types::{AbandonReason, SwapCheckpoint, SwapOutcome, SwapPhase, SwapReport, SwapSession};
