// Order execution and position tracking
pub mod executor;
pub mod gateway;
pub mod ledger;
pub mod paper;

pub use executor::{ExecutionAction, ExecutionDecision, ExecutionOutcome, Executor, ExecutorConfig};
pub use gateway::{ExecutionGateway, OpenOrder, OrderFilter, OrderRequest, OrderType};
pub use ledger::PositionLedger;
pub use paper::{PaperFill, PaperGateway};
