use serde::Deserialize;
use trellis_common::{Invitation, MessageResponse, NewInvitation};

use crate::errors::ClientError;
use crate::http::ApiClient;

/// `POST /api/invitations` answers with either a message or the created
/// invitation, depending on the backend version.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InviteResponse {
    Message(MessageResponse),
    Invitation(Invitation),
}

impl InviteResponse {
    pub fn into_message(self) -> MessageResponse {
        match self {
            InviteResponse::Message(message) => message,
            InviteResponse::Invitation(invitation) => MessageResponse {
                message: format!("Invitation sent to {}", invitation.email),
            },
        }
    }
}

impl ApiClient {
    pub async fn invite_member(
        &self,
        email: &str,
        project_id: i64,
    ) -> Result<MessageResponse, ClientError> {
        let body = NewInvitation {
            email: email.to_string(),
            project_id,
        };
        let response: InviteResponse = self.post("/api/invitations", &body).await?;
        Ok(response.into_message())
    }

    pub async fn accept_invitation(&self, token: &str) -> Result<MessageResponse, ClientError> {
        let token: String = url::form_urlencoded::byte_serialize(token.as_bytes()).collect();
        self.get(&format!("/api/invitations/{}", token)).await
    }
}
