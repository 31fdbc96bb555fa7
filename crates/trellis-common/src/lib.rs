//! Shared domain types for the Trellis ticket-tracker client.
//!
//! Everything here is a plain serde record mirroring the JSON the tracker
//! backend produces or accepts. The client holds transient copies of these
//! records per view; the server stays authoritative.

pub mod models;
pub mod requests;

pub use models::*;
pub use requests::*;

/// Records that carry a server-assigned integer identity.
///
/// Realtime patching matches records by this id and nothing else.
pub trait Identified {
    fn id(&self) -> i64;
}
