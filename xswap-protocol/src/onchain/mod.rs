// On-chain side of a swap: the adapter contract, the escrow state machine
// and an in-process chain implementing both.

pub mod chain_simulator;
pub mod escrow_contract;
pub mod interface;

pub use chain_simulator::{ChainSimulator, SimClock};
pub use escrow_contract::{Escrow, Payout};
pub use interface::{
    ChainAdapter, Confirmation, ConfirmedDeployment, DeploymentEvent, EscrowId, EscrowParams, EscrowSnapshot,
    EscrowStatus, TransactionId, WithdrawalEvent,
};
