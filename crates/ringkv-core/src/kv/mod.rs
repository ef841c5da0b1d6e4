//! Replicated key/value layer.
//!
//! Keys live on three ring successors. Client calls go through the
//! [`QuorumCoordinator`], replicas execute them with [`serve`], and the
//! [`Stabilizer`] moves keys around when the ring changes.

pub mod coordinator;
pub mod messages;
pub mod replica;
pub mod stabilizer;
pub mod store;
pub mod transaction;

pub use coordinator::{QUORUM, QuorumCoordinator};
pub use messages::{KvMessage, KvPayload};
pub use replica::serve;
pub use stabilizer::Stabilizer;
pub use store::{LocalStore, StoreError};
pub use transaction::{CrudKind, TransactionCounter, TransactionId};
