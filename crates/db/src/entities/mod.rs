//! Database entities.

pub mod activity_log;
pub mod support_ticket;

pub use activity_log::Entity as ActivityLog;
pub use support_ticket::Entity as SupportTicket;
