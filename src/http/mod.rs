//! Example HTTP/1.0 protocol served on top of the listener.
//!
//! - `request`: request-line reading and `/set` parameter parsing
//! - `response`: header block and error responses
//! - `api`: the `GridApi` handler tying both together

pub mod api;
pub mod request;
pub mod response;

pub use api::GridApi;
pub use request::{Cell, RequestError};
pub use response::Status;
