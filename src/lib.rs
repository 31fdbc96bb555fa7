//! Client library for the Trellis ticket tracker.
//!
//! The pieces with real lifecycle live here: the credential store, the
//! session state machine, the realtime channel bound to it, and the HTTP
//! client whose middleware expires the session on any 401. The `trellis`
//! binary builds its terminal views on top.

pub mod api;
pub mod board;
pub mod client;
pub mod config;
pub mod credential;
pub mod display;
pub mod errors;
pub mod http;
pub mod logging;
pub mod realtime;
pub mod session;

pub use client::{Trellis, TrellisBuilder};
pub use errors::{ClientError, RealtimeError};
pub use trellis_common as models;
