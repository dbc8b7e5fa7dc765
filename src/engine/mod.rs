//! Core engine — race state, lifecycle transitions, the scheduler loop,
//! settlement and the wager gateway.

pub mod gateway;
pub mod lifecycle;
pub mod scheduler;
pub mod settlement;
pub mod state;

pub use gateway::{WagerGateway, WagerReceipt, WagerRequest};
pub use lifecycle::{AdvanceOutcome, FinishOutcome, RaceLifecycle, RaceTiming, ScheduleOutcome, SchedulerEvent};
pub use scheduler::{Scheduler, TickOutcome};
pub use settlement::{RandomWinner, SettlementEngine, SettlementReport, WinnerSelector};
pub use state::{RaceState, StateView};
