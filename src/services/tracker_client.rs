//! Tracker API client.
//!
//! Provides a read-only HTTP client for a Jira-style REST API (v2) and the
//! mapping from its issue/project payloads onto generic entities.

use crate::error::AppError;
use crate::models::{Entity, EntityCollection, EntityKind, Fields, ProjectStats};
use crate::services::remote_fetcher::{FetchParams, RemoteSource};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Fields requested from the search endpoint.
const ISSUE_FIELDS: &str =
    "summary,description,status,priority,assignee,reporter,labels,issuetype,created,updated";

/// Tracker API client configuration.
#[derive(Debug, Clone)]
pub struct TrackerClientConfig {
    /// Base URL of the tracker instance (e.g., `https://example.atlassian.net`).
    pub base_url: String,

    /// Account email; with a token this selects Basic authentication.
    pub email: Option<String>,

    /// API token. Sent as a Bearer token when no email is configured.
    pub api_token: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TrackerClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: None,
            api_token: None,
            timeout_secs: 30,
        }
    }
}

/// Tracker API client.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    client: Client,
    config: TrackerClientConfig,
}

/// Search response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSearchResponse {
    #[serde(default)]
    pub issues: Vec<TrackerIssue>,

    #[serde(default)]
    pub total: u64,
}

/// Issue as returned by the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerIssue {
    pub id: String,
    pub key: String,
    pub fields: TrackerIssueFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerIssueFields {
    pub summary: Option<String>,
    pub description: Option<Value>,
    pub status: Option<TrackerNamed>,
    pub priority: Option<TrackerNamed>,
    pub assignee: Option<TrackerUser>,
    pub reporter: Option<TrackerUser>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub issuetype: Option<TrackerNamed>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

/// Any `{ "name": ... }` object (status, priority, issue type).
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerNamed {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerUser {
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

impl TrackerUser {
    fn label(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .or(self.email_address.as_deref())
    }
}

/// Project as returned by the project endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerProject {
    pub id: String,
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub lead: Option<TrackerUser>,
}

impl TrackerIssue {
    /// Map onto an entity keyed by the issue key.
    pub fn into_entity(self) -> Entity {
        let f = self.fields;
        let mut fields = Fields::new();
        fields.insert("title".into(), json!(f.summary.unwrap_or_default()));
        fields.insert("description".into(), description_text(f.description));
        fields.insert("status".into(), json!(f.status.map(|s| s.name)));
        fields.insert("priority".into(), json!(f.priority.map(|p| p.name)));
        fields.insert("assignee".into(), json!(f.assignee.as_ref().and_then(TrackerUser::label)));
        fields.insert("reporter".into(), json!(f.reporter.as_ref().and_then(TrackerUser::label)));
        fields.insert("labels".into(), json!(f.labels));
        fields.insert("type".into(), json!(f.issuetype.map(|t| t.name)));
        fields.insert("remoteId".into(), json!(self.id));

        let created_at = f.created.as_deref().and_then(parse_timestamp).unwrap_or(0);
        let mut entity = Entity::new(self.key, fields, created_at);
        entity.updated_at = f.updated.as_deref().and_then(parse_timestamp);
        entity
    }
}

impl TrackerProject {
    pub fn into_entity(self) -> Entity {
        let mut fields = Fields::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("description".into(), json!(self.description));
        fields.insert("lead".into(), json!(self.lead.as_ref().and_then(TrackerUser::label)));
        fields.insert("remoteId".into(), json!(self.id));
        Entity::new(self.key, fields, 0)
    }
}

/// Descriptions are plain strings in v2 but rich documents elsewhere; keep
/// strings as-is and serialize anything else.
fn description_text(description: Option<Value>) -> Value {
    match description {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) => Value::String(s),
        Some(other) => Value::String(other.to_string()),
    }
}

/// Parse a tracker timestamp (`2024-01-15T10:30:00.000+0000` or RFC 3339) to Unix seconds.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(value)
        .or_else(|_| chrono::DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|dt| dt.timestamp())
        .ok()
}

/// JQL for the configured project, oldest first so the page order is stable.
fn project_jql(project_key: &str, extra: Option<&str>) -> String {
    let escaped = project_key.replace('"', "\\\"");
    match extra {
        Some(clause) => format!("project = \"{}\" AND {} ORDER BY created ASC", escaped, clause),
        None => format!("project = \"{}\" ORDER BY created ASC", escaped),
    }
}

impl TrackerClient {
    /// Create a new tracker client.
    pub fn new(config: TrackerClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        if let Some(auth) = Self::authorization(&config) {
            let mut value = header::HeaderValue::from_str(&auth)
                .map_err(|_| AppError::authentication("Invalid credential format"))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn authorization(config: &TrackerClientConfig) -> Option<String> {
        let token = config.api_token.as_deref().filter(|t| !t.is_empty())?;
        match config.email.as_deref().filter(|e| !e.is_empty()) {
            Some(email) => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", email, token));
                Some(format!("Basic {}", encoded))
            }
            None => Some(format!("Bearer {}", token)),
        }
    }

    /// Build an API URL, honouring a per-request proxy override of the base URL.
    fn api_url(&self, proxy_url: Option<&str>, path: &str) -> Result<String, AppError> {
        let base = proxy_url
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(self.config.base_url.as_str())
            .trim_end_matches('/');
        if base.is_empty() {
            return Err(AppError::invalid_input_field(
                "No tracker base URL configured",
                "base_url",
            ));
        }
        Ok(format!("{}/rest/api/2{}", base, path))
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::authentication(
                "Tracker credentials rejected. Check the email and API token.",
            ))
        } else if status == StatusCode::FORBIDDEN {
            Err(AppError::authentication("Access to the tracker project denied"))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            // Jira reports errors as {"errorMessages": [...], "errors": {...}}
            let body_message = serde_json::from_str::<Value>(&body).ok().and_then(|v| {
                v.get("errorMessages")
                    .and_then(Value::as_array)
                    .and_then(|msgs| msgs.first())
                    .and_then(Value::as_str)
                    .map(String::from)
            });

            let message = match (status, &body_message) {
                (StatusCode::NOT_FOUND, None) => "Resource not found".to_string(),
                (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
                (_, Some(msg)) => msg.clone(),
                _ => format!("Request failed ({}): {}", status_code, body),
            };

            Err(AppError::tracker_api_full(message, status_code, endpoint))
        }
    }

    async fn search(
        &self,
        params: &FetchParams,
        jql: &str,
        max_results: u32,
        fields: Option<&str>,
    ) -> Result<TrackerSearchResponse, AppError> {
        let endpoint = "/search";
        let url = self.api_url(params.proxy_url.as_deref(), endpoint)?;

        let mut query = vec![
            ("jql", jql.to_string()),
            ("maxResults", max_results.to_string()),
        ];
        if let Some(fields) = fields {
            query.push(("fields", fields.to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        self.handle_response(response, endpoint).await
    }

    /// First page of issues in the project, oldest first.
    pub async fn search_issues(&self, params: &FetchParams) -> Result<Vec<TrackerIssue>, AppError> {
        let jql = project_jql(&params.project_key, None);
        let page = self
            .search(params, &jql, params.max_results, Some(ISSUE_FIELDS))
            .await?;
        Ok(page.issues)
    }

    /// Get a single project by key.
    pub async fn get_project(&self, params: &FetchParams) -> Result<TrackerProject, AppError> {
        let endpoint = format!("/project/{}", urlencoding::encode(&params.project_key));
        let url = self.api_url(params.proxy_url.as_deref(), &endpoint)?;
        let response = self.client.get(&url).send().await?;
        self.handle_response(response, &endpoint).await
    }

    /// Count total and done issues without transferring them.
    pub async fn get_project_stats(&self, params: &FetchParams) -> Result<ProjectStats, AppError> {
        let all = self
            .search(params, &project_jql(&params.project_key, None), 0, None)
            .await?;
        let done_jql = project_jql(&params.project_key, Some("statusCategory = Done"));
        let done = self.search(params, &done_jql, 0, None).await?;

        Ok(ProjectStats {
            total_issues: all.total,
            done_issues: done.total,
        })
    }
}

#[async_trait]
impl RemoteSource for TrackerClient {
    async fn fetch_entities(
        &self,
        kind: EntityKind,
        params: &FetchParams,
    ) -> Result<EntityCollection, AppError> {
        match kind {
            EntityKind::Issue => Ok(self
                .search_issues(params)
                .await?
                .into_iter()
                .map(TrackerIssue::into_entity)
                .collect()),
            EntityKind::Project => {
                let project = self.get_project(params).await?;
                Ok(vec![project.into_entity()].into())
            }
            EntityKind::Cycle | EntityKind::Team => Err(AppError::invalid_input_field(
                format!("{} entities are not fetched from the tracker", kind),
                "kind",
            )),
        }
    }

    async fn fetch_stats(&self, params: &FetchParams) -> Result<ProjectStats, AppError> {
        self.get_project_stats(params).await
    }
}
