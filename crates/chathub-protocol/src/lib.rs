//! Wire formats shared by the text control plane and the voice data plane.
//!
//! This crate has no knowledge of sockets, tasks, or server state — it
//! only knows how to turn bytes into protocol pieces and back.

pub mod error;
pub mod frame;
pub mod line;

pub use error::ProtocolError;
