//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with the health and extract endpoints
//! - Source resolution (multipart upload or default media file)
//! - MP3 response streaming with download headers
//! - Request logging middleware
//! - HTTP/1 accept loop with a request-head timeout

pub mod handlers;
pub mod input;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod stream;

pub use routes::create_router;
pub use server::{serve, HEADER_READ_TIMEOUT};
