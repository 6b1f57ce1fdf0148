//! # Cronhook Server
//!
//! Wires the store, engine, sweeper, and REST surface into one process
//! and drives the serve/shutdown lifecycle.

pub mod middleware;
pub mod routes;
pub mod shutdown;

pub use routes::create_router;
pub use shutdown::ShutdownController;
