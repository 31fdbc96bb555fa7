//! Local, non-authoritative views patched by push events.
//!
//! Push events only replace records the view already holds. A ticket the
//! view has never seen is ignored rather than inserted.

use trellis_common::{Board, Identified, Ticket};

use crate::realtime::PushEvent;

/// Replace the element with `updated`'s id, keeping every other element
/// and the order untouched. Returns false when no element matches.
pub fn patch_in_place<T: Identified + Clone>(items: &mut [T], updated: &T) -> bool {
    match items.iter_mut().find(|item| item.id() == updated.id()) {
        Some(slot) => {
            *slot = updated.clone();
            true
        }
        None => false,
    }
}

/// A board with its columns and their tickets.
#[derive(Debug, Clone)]
pub struct BoardView {
    pub board: Board,
}

impl BoardView {
    pub fn new(board: Board) -> Self {
        Self { board }
    }

    /// Apply a push event. Returns whether anything changed.
    pub fn apply(&mut self, event: &PushEvent) -> bool {
        match event {
            PushEvent::TicketUpdate(ticket) => self
                .board
                .columns
                .iter_mut()
                .any(|column| patch_in_place(&mut column.tickets, ticket)),
        }
    }

    pub fn ticket(&self, id: i64) -> Option<&Ticket> {
        self.board
            .columns
            .iter()
            .flat_map(|column| column.tickets.iter())
            .find(|ticket| ticket.id == id)
    }

    pub fn ticket_count(&self) -> usize {
        self.board.columns.iter().map(|c| c.tickets.len()).sum()
    }
}

/// A flat ticket list, as shown by the ticket list and dashboard views.
#[derive(Debug, Clone, Default)]
pub struct TicketListView {
    pub tickets: Vec<Ticket>,
}

impl TicketListView {
    pub fn new(tickets: Vec<Ticket>) -> Self {
        Self { tickets }
    }

    pub fn apply(&mut self, event: &PushEvent) -> bool {
        match event {
            PushEvent::TicketUpdate(ticket) => patch_in_place(&mut self.tickets, ticket),
        }
    }
}
