//! Background jobs for rmadesk.
//!
//! - **Scheduler**: runs the archival sweep at start and then on a fixed
//!   interval, never overlapping itself
//! - **Executor**: binds the scheduler to the core archival service

pub mod executor;
pub mod scheduler;

pub use executor::ArchivalJobExecutor;
pub use scheduler::{JobExecutor, SchedulerConfig, run_archival_scheduler, spawn_archival_scheduler};
