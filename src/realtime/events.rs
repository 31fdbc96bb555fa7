//! Push events carried by the realtime channel.
//!
//! Frames are JSON text. The canonical shape is
//! `{"event": "ticket_update", "data": {...ticket...}}`; the two-element
//! array form `["ticket_update", {...}]` is accepted too.

use serde::{Deserialize, Serialize};
use trellis_common::Ticket;

use crate::errors::RealtimeError;

pub const TICKET_UPDATE: &str = "ticket_update";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// A full, updated ticket record.
    TicketUpdate(Ticket),
}

impl PushEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PushEvent::TicketUpdate(_) => TICKET_UPDATE,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope {
    Named {
        event: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    Pair(String, serde_json::Value),
}

/// Decode one text frame.
///
/// `Ok(None)` for well-formed frames naming an event this client does not
/// handle; `Err` when the frame or its payload is malformed.
pub fn decode_frame(text: &str) -> Result<Option<PushEvent>, RealtimeError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| RealtimeError::Protocol(format!("invalid frame: {}", e)))?;
    let (event, data) = match envelope {
        Envelope::Named { event, data } => (event, data),
        Envelope::Pair(event, data) => (event, data),
    };

    match event.as_str() {
        TICKET_UPDATE => serde_json::from_value::<Ticket>(data)
            .map(|ticket| Some(PushEvent::TicketUpdate(ticket)))
            .map_err(|e| RealtimeError::Protocol(format!("invalid {} payload: {}", event, e))),
        _ => Ok(None),
    }
}
