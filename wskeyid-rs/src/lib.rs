//! wskeyid Base Crate
//!
//! This crate contains the self-certifying identifier format, the challenge
//! and response types exchanged over the websocket, and the handshake state
//! machine that authenticates a connecting client. It does not contain any
//! transport; servers and clients plug their websocket into
//! [`handshake::HandshakeChannel`].

pub mod api;
pub mod challenge;
pub mod client_id;
pub mod handshake;
pub mod util;
pub mod verify;
