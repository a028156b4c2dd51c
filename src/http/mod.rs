//! HTTP surface for frame and health polling

pub mod routes;

pub use routes::build_router;
