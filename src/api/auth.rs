use trellis_common::{
    AuthResponse, LoginRequest, MessageResponse, PasswordReset, PasswordResetRequest,
    RegisterRequest, ResetTokenResponse,
};

use crate::errors::ClientError;
use crate::http::ApiClient;

impl ApiClient {
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post("/api/login", &body).await
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post("/api/register", &body).await
    }

    pub async fn request_password_reset(
        &self,
        email: &str,
    ) -> Result<ResetTokenResponse, ClientError> {
        let body = PasswordResetRequest {
            email: email.to_string(),
        };
        self.post("/api/request-password-reset", &body).await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<MessageResponse, ClientError> {
        let body = PasswordReset {
            token: token.to_string(),
            new_password: new_password.to_string(),
        };
        self.post("/api/reset-password", &body).await
    }
}
