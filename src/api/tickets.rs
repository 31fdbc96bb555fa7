use trellis_common::{Comment, NewComment, NewTicket, Ticket, TicketHistory, TicketQuery, TicketUpdate};

use crate::errors::ClientError;
use crate::http::ApiClient;

impl ApiClient {
    /// Query parameters are passed through as given; absent ones are omitted.
    pub async fn list_tickets(&self, query: &TicketQuery) -> Result<Vec<Ticket>, ClientError> {
        self.get_query("/api/tickets", query).await
    }

    pub async fn create_ticket(&self, ticket: &NewTicket) -> Result<Ticket, ClientError> {
        self.post("/api/tickets", ticket).await
    }

    pub async fn get_ticket(&self, id: i64) -> Result<Ticket, ClientError> {
        self.get(&format!("/api/tickets/{}", id)).await
    }

    pub async fn update_ticket(&self, id: i64, update: &TicketUpdate) -> Result<Ticket, ClientError> {
        self.put(&format!("/api/tickets/{}", id), update).await
    }

    pub async fn delete_ticket(&self, id: i64) -> Result<(), ClientError> {
        self.delete(&format!("/api/tickets/{}", id)).await
    }

    pub async fn ticket_history(&self, id: i64) -> Result<Vec<TicketHistory>, ClientError> {
        self.get(&format!("/api/tickets/{}/history", id)).await
    }

    pub async fn add_comment(&self, ticket_id: i64, content: &str) -> Result<Comment, ClientError> {
        let body = NewComment {
            content: content.to_string(),
            ticket_id,
        };
        self.post(&format!("/api/tickets/{}/comments", ticket_id), &body)
            .await
    }
}
