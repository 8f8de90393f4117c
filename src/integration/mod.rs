//! Integration testing module
//!
//! End-to-end tests for the extract server, driven through the real router
//! with a shell script standing in for ffmpeg:
//! - Upload and default-media conversions
//! - Response headers and body
//! - Scratch directory cleanup on success, failure and disconnect

pub mod fixtures;
