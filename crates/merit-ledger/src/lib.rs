pub mod ledger;
pub mod storage;
pub mod supply;
pub mod types;

pub use ledger::{BondingLedger, LedgerConfig};
pub use storage::{LedgerStorage, MemoryLedgerStorage};
pub use supply::{RepSupply, SupplyMetrics};
pub use types::{
    ActorLedgerState, ForfeitureOutcome, Stake, StakeStatus, StakeSummary, Ticket, TicketStatus,
};
