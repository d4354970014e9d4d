//! WebSocket server that authenticates clients by their self-certifying identifier.

pub mod config;
pub mod routes;
pub mod serve;
pub mod socket;
