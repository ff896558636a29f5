//! Repositories wrapping database access per entity.

mod activity_log;
mod support_ticket;

pub use activity_log::ActivityLogRepository;
pub use support_ticket::{SupportTicketRepository, TicketChanges};
