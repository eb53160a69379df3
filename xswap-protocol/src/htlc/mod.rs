// Hashlock/timelock primitives shared by both escrow legs

pub mod felt;
pub mod hashlock;
pub mod secret;
pub mod timelocks;

pub use hashlock::HashLock;
pub use secret::{Secret, SecretMaterial, SplitSecret};
pub use timelocks::{Deadlines, Stage, Standing, TimeLockConfig, TimeLocks};
