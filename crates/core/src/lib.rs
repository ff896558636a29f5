//! Ticket lifecycle logic for rmadesk.
//!
//! Status transitions, general updates and the archival sweep live here, on
//! top of the [`TicketStore`] and [`ActivityLogger`] seams.

pub mod services;

pub use services::*;
