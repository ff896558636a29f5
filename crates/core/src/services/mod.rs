//! Business logic services.

#![allow(missing_docs)]

pub mod activity;
pub mod archival;
pub mod ticket;
pub mod ticket_store;

pub use activity::{
    ActivityEntry, ActivityLogService, ActivityLogger, DbActivityLogger, NoOpActivityLogger,
};
#[cfg(any(test, feature = "test-utils"))]
pub use activity::RecordingActivityLogger;
pub use archival::ArchivalService;
pub use ticket::{
    ChangeStatusInput, CreateTicketInput, TicketService, TicketStatistics, Transition,
    UpdateTicketInput, next_updated_at,
};
#[cfg(any(test, feature = "test-utils"))]
pub use ticket_store::InMemoryTicketStore;
pub use ticket_store::TicketStore;
