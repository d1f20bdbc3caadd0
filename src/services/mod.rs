//! Background services

pub mod scheduler;

pub use scheduler::{
    next_daily_run, BlockSweepSummary, RankSweepSummary, Scheduler, SchedulerHandle,
    SchedulerStatus, SweepGuard, SweepOutcome, SweepPermit,
};
