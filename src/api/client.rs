use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::api::types::{
  ApiBody, ApiErrorBody, ApiLoginPayload, ApiMemberPayload, ApiProjectPayload, ApiTaskPayload,
  ApiUserList,
};
use crate::api::TaskApi;
use crate::auth::Session;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::model::{
  MembershipChange, NewProject, NewTask, Project, ProjectDeletion, ProjectUpdate, StatusChange,
  Task, TaskDeletion, TaskUpdate, User,
};

/// REST client for the board API
#[derive(Clone)]
pub struct HttpApi {
  http: reqwest::Client,
  base: Url,
  token: Option<String>,
}

impl HttpApi {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    // Url::join drops the last path segment unless the base ends with '/'
    let mut base = config.url.trim_end_matches('/').to_string();
    base.push('/');

    Ok(Self {
      http,
      base: Url::parse(&base)?,
      token,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    Ok(self.base.join(path.trim_start_matches('/'))?)
  }

  /// Build a request carrying the bearer token, or fail before sending anything.
  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
    let token = self.token.as_deref().ok_or(ApiError::Unauthenticated)?;
    Ok(self.http.request(method, self.endpoint(path)?).bearer_auth(token))
  }

  /// Send a request and return the body of a successful response.
  async fn send_raw(&self, request: RequestBuilder) -> Result<Vec<u8>, ApiError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    debug!(status = status.as_u16(), bytes = body.len(), "api response");

    if !status.is_success() {
      let message = serde_json::from_slice::<ApiErrorBody>(&body)
        .ok()
        .and_then(ApiErrorBody::into_message);
      return Err(ApiError::from_status(status, message));
    }
    Ok(body.to_vec())
  }

  /// Send a request and decode the (possibly enveloped) response body.
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
    let body = self.send_raw(request).await?;
    serde_json::from_slice::<ApiBody<T>>(&body)
      .map(ApiBody::into_inner)
      .map_err(|e| ApiError::InvalidResponse(e.to_string()))
  }

  /// Send a request whose success body carries nothing we need.
  async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
    self.send_raw(request).await.map(|_| ())
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    self.send(self.request(Method::GET, path)?).await
  }

  async fn with_body<T: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    method: Method,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    self.send(self.request(method, path)?.json(body)).await
  }

  /// Exchange credentials for a session. Does not need a token.
  pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
    let request = self
      .http
      .post(self.endpoint("auth/login")?)
      .json(&ApiLoginPayload { email, password });
    self.send(request).await
  }
}

#[async_trait]
impl TaskApi for HttpApi {
  async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ApiError> {
    let request = self
      .request(Method::GET, "tasks")?
      .query(&[("projectId", project_id)]);
    self.send(request).await
  }

  async fn get_task(&self, task_id: &str) -> Result<Task, ApiError> {
    self.get(&format!("tasks/{}", task_id)).await
  }

  async fn create_task(&self, task: &NewTask) -> Result<Task, ApiError> {
    self
      .with_body(Method::POST, "tasks", &ApiTaskPayload::from(task))
      .await
  }

  async fn update_task(&self, update: &TaskUpdate) -> Result<Task, ApiError> {
    let path = format!("tasks/{}", update.task_id);
    self
      .with_body(Method::PUT, &path, &ApiTaskPayload::from(update))
      .await
  }

  /// The API has no status-only endpoint: read the task, then put it back
  /// with only the status changed.
  async fn update_task_status(&self, change: &StatusChange) -> Result<Task, ApiError> {
    let path = format!("tasks/{}", change.task_id);
    let current = self.get_task(&change.task_id).await?;

    let update = TaskUpdate {
      status: change.status,
      ..TaskUpdate::from_task(change.project_id.clone(), &current)
    };
    self
      .with_body(Method::PUT, &path, &ApiTaskPayload::from(&update))
      .await
  }

  async fn delete_task(&self, deletion: &TaskDeletion) -> Result<(), ApiError> {
    let path = format!("tasks/{}", deletion.task_id);
    self.send_empty(self.request(Method::DELETE, &path)?).await
  }

  async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
    self.get("projects").await
  }

  async fn create_project(&self, project: &NewProject) -> Result<Project, ApiError> {
    self
      .with_body(Method::POST, "projects", &ApiProjectPayload::from(project))
      .await
  }

  async fn update_project(&self, update: &ProjectUpdate) -> Result<Project, ApiError> {
    let path = format!("projects/{}", update.project_id);
    self
      .with_body(Method::PUT, &path, &ApiProjectPayload::from(update))
      .await
  }

  async fn delete_project(&self, deletion: &ProjectDeletion) -> Result<(), ApiError> {
    let path = format!("projects/{}", deletion.project_id);
    self.send_empty(self.request(Method::DELETE, &path)?).await
  }

  async fn list_project_members(&self, project_id: &str) -> Result<Vec<User>, ApiError> {
    let list: ApiUserList = self.get(&format!("projects/{}/members", project_id)).await?;
    Ok(list.into())
  }

  async fn add_project_member(&self, change: &MembershipChange) -> Result<(), ApiError> {
    let path = format!("projects/{}/members", change.project_id);
    let request = self
      .request(Method::POST, &path)?
      .json(&ApiMemberPayload {
        user_id: &change.user_id,
      });
    self.send_empty(request).await
  }

  async fn remove_project_member(&self, change: &MembershipChange) -> Result<(), ApiError> {
    let path = format!("projects/{}/members/{}", change.project_id, change.user_id);
    self.send_empty(self.request(Method::DELETE, &path)?).await
  }

  async fn list_users(&self) -> Result<Vec<User>, ApiError> {
    let list: ApiUserList = self.get("users").await?;
    Ok(list.into())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Backend;

  fn config(url: &str) -> ApiConfig {
    ApiConfig {
      url: url.to_string(),
      backend: Backend::Remote,
      timeout_secs: 5,
    }
  }

  #[test]
  fn test_endpoint_keeps_base_path() {
    let api = HttpApi::new(&config("https://example.com/api"), None).unwrap();
    assert_eq!(
      api.endpoint("tasks/t1").unwrap().as_str(),
      "https://example.com/api/tasks/t1"
    );

    let api = HttpApi::new(&config("https://example.com/api/"), None).unwrap();
    assert_eq!(
      api.endpoint("/projects").unwrap().as_str(),
      "https://example.com/api/projects"
    );
  }

  #[tokio::test]
  async fn test_missing_token_fails_before_sending() {
    // Nothing listens here; reaching the network would be a transport error
    let api = HttpApi::new(&config("http://127.0.0.1:9"), None).unwrap();
    let result = api.list_projects().await;
    assert!(matches!(result, Err(ApiError::Unauthenticated)));
  }

  #[test]
  fn test_invalid_url() {
    assert!(matches!(
      HttpApi::new(&config("not a url"), None),
      Err(ApiError::Url(_))
    ));
  }
}
