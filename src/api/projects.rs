use trellis_common::{Board, NewProject, Project, ProjectUpdate};

use crate::errors::ClientError;
use crate::http::ApiClient;

impl ApiClient {
    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.get("/api/projects").await
    }

    pub async fn get_project(&self, id: i64) -> Result<Project, ClientError> {
        self.get(&format!("/api/projects/{}", id)).await
    }

    pub async fn create_project(&self, project: &NewProject) -> Result<Project, ClientError> {
        self.post("/api/projects", project).await
    }

    pub async fn project_settings(&self, id: i64) -> Result<Project, ClientError> {
        self.get(&format!("/api/projects/{}/settings", id)).await
    }

    pub async fn update_project_settings(
        &self,
        id: i64,
        update: &ProjectUpdate,
    ) -> Result<Project, ClientError> {
        self.put(&format!("/api/projects/{}/settings", id), update)
            .await
    }

    pub async fn list_boards(&self, project_id: i64) -> Result<Vec<Board>, ClientError> {
        self.get(&format!("/api/projects/{}/boards", project_id))
            .await
    }
}
