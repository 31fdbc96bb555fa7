use trellis_common::{User, UserUpdate};

use crate::credential::Credential;
use crate::errors::ClientError;
use crate::http::ApiClient;

impl ApiClient {
    pub async fn get_profile(&self) -> Result<User, ClientError> {
        self.get("/api/profile").await
    }

    /// Fetch the profile for a specific credential rather than the stored one.
    ///
    /// Sent once; a failure is final for the caller.
    pub async fn get_profile_with(&self, credential: &Credential) -> Result<User, ClientError> {
        self.get_with("/api/profile", credential).await
    }

    pub async fn update_profile(&self, update: &UserUpdate) -> Result<User, ClientError> {
        self.put("/api/profile", update).await
    }
}
