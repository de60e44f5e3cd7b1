//! API Module
//!
//! HTTP handlers and routing for the table cache host.
//!
//! # Endpoints
//! - `GET /cache/:segment/:id` - Read an entry
//! - `PUT /cache/:segment/:id` - Write an entry
//! - `DELETE /cache/:segment/:id` - Drop an entry
//! - `POST /sweep` - Run one eviction pass
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Readiness check

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
