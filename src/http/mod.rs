//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → handlers.rs (path → upstream URL, bypass check)
//!     → FetchOrchestrator::resolve
//!     → handlers.rs (status + headers + body) / error.rs (400, 500)
//!     → Send to client
//! ```

pub mod error;
pub mod handlers;
pub mod request;
pub mod server;

pub use error::AppError;
pub use handlers::Dispatch;
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
