//! Remote collaborators backed by the Pterodactyl client API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::models::{DirEntry, ServerRef};
use crate::remote::{CommandDispatcher, FileRepository, ServerDirectory};

const ACCEPT: &str = "Application/vnd.pterodactyl.v1+json";

/// HTTP client for one panel, authenticated with a client API key.
#[derive(Clone)]
pub struct PanelClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    data: Vec<Item<T>>,
}

#[derive(Deserialize)]
struct Item<T> {
    attributes: T,
}

#[derive(Deserialize)]
struct FileAttributes {
    name: String,
    is_file: bool,
}

#[derive(Deserialize)]
struct ServerResponse {
    attributes: ServerAttributes,
}

#[derive(Deserialize)]
struct ServerAttributes {
    relationships: ServerRelationships,
}

#[derive(Deserialize)]
struct ServerRelationships {
    allocations: ListResponse<AllocationAttributes>,
}

#[derive(Deserialize)]
struct AllocationAttributes {
    ip: String,
    ip_alias: Option<String>,
    port: u16,
    #[serde(default)]
    is_default: bool,
}

impl PanelClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, server_id: &str, suffix: &str) -> String {
        format!("{}/api/client/servers/{}{}", self.base_url, server_id, suffix)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.api_key).header("Accept", ACCEPT)
    }

    fn checked(response: Response, path: &str) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(path.to_string())),
            status => Err(StoreError::Rejected {
                status: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }
}

#[async_trait]
impl FileRepository for PanelClient {
    async fn get_content(&self, server: &ServerRef, path: &str) -> Result<String> {
        let request = self
            .client
            .get(self.url(&server.id, "/files/contents"))
            .query(&[("file", path)]);
        let response = self.authorized(request).send().await?;
        let body = Self::checked(response, path)?.text().await?;
        Ok(body)
    }

    async fn put_content(&self, server: &ServerRef, path: &str, content: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&server.id, "/files/write"))
            .query(&[("file", path)])
            .body(content.to_string());
        let response = self.authorized(request).send().await?;
        Self::checked(response, path)?;
        debug!(server = %server.id, path, bytes = content.len(), "wrote remote file");
        Ok(())
    }

    async fn list_directory(&self, server: &ServerRef, path: &str) -> Result<Vec<DirEntry>> {
        let request = self
            .client
            .get(self.url(&server.id, "/files/list"))
            .query(&[("directory", path)]);
        let response = self.authorized(request).send().await?;
        let listing: ListResponse<FileAttributes> =
            Self::checked(response, path)?.json().await?;
        Ok(listing
            .data
            .into_iter()
            .map(|item| DirEntry {
                name: item.attributes.name,
                is_file: item.attributes.is_file,
            })
            .collect())
    }

    async fn delete_files(&self, server: &ServerRef, root: &str, files: &[String]) -> Result<()> {
        let request = self
            .client
            .post(self.url(&server.id, "/files/delete"))
            .json(&json!({ "root": root, "files": files }));
        let response = self.authorized(request).send().await?;
        Self::checked(response, root)?;
        Ok(())
    }
}

#[async_trait]
impl CommandDispatcher for PanelClient {
    async fn send(&self, server: &ServerRef, command: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(&server.id, "/command"))
            .json(&json!({ "command": command }));
        let response = self.authorized(request).send().await?;
        match response.status() {
            // The panel answers 502 when the daemon cannot reach the game process.
            StatusCode::BAD_GATEWAY => Err(StoreError::Unavailable(format!(
                "console for {} is not running",
                server.id
            ))),
            _ => Self::checked(response, "/command").map(|_| ()),
        }
    }
}

#[async_trait]
impl ServerDirectory for PanelClient {
    async fn resolve(&self, server_id: &str) -> Result<ServerRef> {
        let request = self
            .client
            .get(self.url(server_id, ""))
            .query(&[("include", "allocations")]);
        let response = self.authorized(request).send().await?;
        let response = match Self::checked(response, server_id) {
            Err(StoreError::NotFound(_)) => return Err(StoreError::ServerNotFound),
            other => other?,
        };
        let details: ServerResponse = response.json().await?;

        let allocations = details.attributes.relationships.allocations.data;
        let allocation = allocations
            .iter()
            .find(|a| a.attributes.is_default)
            .or_else(|| allocations.first())
            .ok_or(StoreError::ServerNotFound)?;

        Ok(ServerRef {
            id: server_id.to_string(),
            host: allocation
                .attributes
                .ip_alias
                .clone()
                .unwrap_or_else(|| allocation.attributes.ip.clone()),
            port: allocation.attributes.port,
        })
    }
}
