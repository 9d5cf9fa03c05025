//! HTTP control API
//!
//! Comment intake, stage cancellation, status, and a live event stream.

pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, serve, AppState};
