//!
//! Common types and utilities shared by the tracker server and client.
//!
//! This crate aggregates:
//! - `error`: unified error type `TrackerError` plus `FetchError` and `StoreError`.
//! - `result`: handy `Result<T, TrackerError>` alias.
//! - `model`: `Stock`, `PriceRecord`, `Alert` and the subscriber `Message` envelope.
//! - `query`: request/response types of the query port.
//! - `symbols`: symbol normalisation and watch-list parsing.
//! - `net`: networking constants and small helpers.
#![warn(missing_docs)]
pub mod error;
pub mod model;
pub mod net;
pub mod query;
pub mod result;
pub mod symbols;

pub use error::{FetchError, StoreError, TrackerError};
pub use model::{Alert, AlertType, Message, PriceRecord, Stock};
pub use query::{Query, QueryResponse};
pub use result::Result;
