//! In-memory tracker state.
//!
//! - `registry`: the symbol -> latest `Stock` map shared by the tracking loop
//!   and the query service.

pub mod registry;
