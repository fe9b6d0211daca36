//! HTTP service implementation.
//!
//! This module contains the axum handlers for the handle workflow and the
//! mapping from library errors onto HTTP responses.
//!
//! ## Structure
//!
//! - [`handler`] - shared state (`HandleService`), routes and handlers.
//! - [`error`] - `ApiError`, the `IntoResponse` wrapper for `subhandle::Error`.

pub mod error;
pub mod handler;
