//! HTTP clients for the auth endpoint and the API endpoint.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::auth::{AuthClient, Credentials, Session};
use crate::error::{Endpoint, EndpointError};
use crate::resolve::{GroupName, ServerName};
use crate::specs::DiscSpec;

/// Map a non-success status to an endpoint error.
fn status_error(endpoint: Endpoint, status: StatusCode, body: &str) -> EndpointError {
    let message = match body.trim() {
        "" => status.canonical_reason().unwrap_or("no message").to_string(),
        text => text.to_string(),
    };

    match status.as_u16() {
        401 | 403 => EndpointError::NotAuthorized { endpoint, message },
        404 => EndpointError::NotFound { endpoint, message },
        400 | 422 => EndpointError::BadRequest { endpoint, message },
        500..=599 => EndpointError::Internal {
            endpoint,
            status: status.as_u16(),
            message,
        },
        other => EndpointError::Unexpected {
            endpoint,
            status: other,
            message,
        },
    }
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, body: &str) -> Result<T, EndpointError> {
    serde_json::from_str(body).map_err(|e| EndpointError::Unparseable {
        endpoint,
        detail: e.to_string(),
    })
}

/// Send a request and return the body of a successful response.
///
/// `what` names the request in logs so tokens in paths never get logged.
async fn send(
    endpoint: Endpoint,
    base_url: &str,
    what: &str,
    request: RequestBuilder,
) -> Result<String, EndpointError> {
    debug!(%endpoint, request = what, "Sending request");

    let response = request.send().await.map_err(|e| EndpointError::Connect {
        endpoint,
        url: base_url.to_string(),
        detail: e.to_string(),
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| EndpointError::Unparseable {
            endpoint,
            detail: format!("couldn't read response body: {e}"),
        })?;

    debug!(%endpoint, request = what, status = status.as_u16(), "Response received");

    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(endpoint, status, &body))
    }
}

fn user_agent() -> String {
    format!("bm/{}", env!("CARGO_PKG_VERSION"))
}

/// Client for the auth endpoint.
#[derive(Debug, Clone)]
pub struct AuthEndpointClient {
    client: reqwest::Client,
    base_url: String,
    base: Url,
}

#[derive(Serialize)]
struct CredentialsRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    yubikey: Option<&'a str>,
}

#[derive(Deserialize)]
struct SessionResponse {
    username: String,
}

impl AuthEndpointClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid auth endpoint URL '{base_url}'"))?;
        anyhow::ensure!(
            !base.cannot_be_a_base(),
            "Invalid auth endpoint URL '{base_url}'"
        );

        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            base,
        })
    }

    /// URL under the endpoint with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl AuthClient for AuthEndpointClient {
    async fn authenticate_token(&self, token: &str) -> Result<Session, EndpointError> {
        let request = self
            .client
            .get(self.url(&["session", token]))
            .header(ACCEPT, "application/json");
        let body = send(Endpoint::Auth, &self.base_url, "read session", request).await?;
        let session: SessionResponse = decode(Endpoint::Auth, &body)?;

        Ok(Session {
            token: token.to_string(),
            username: session.username,
        })
    }

    async fn authenticate_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, EndpointError> {
        let request = self.client.post(self.url(&["session"])).json(&CredentialsRequest {
            username: &credentials.username,
            password: &credentials.password,
            yubikey: credentials.yubikey_otp.as_deref(),
        });
        let body = send(Endpoint::Auth, &self.base_url, "create session", request).await?;

        let token = body.trim();
        if token.is_empty() {
            return Err(EndpointError::Unparseable {
                endpoint: Endpoint::Auth,
                detail: "empty session token".to_string(),
            });
        }

        Ok(Session {
            token: token.to_string(),
            username: credentials.username.clone(),
        })
    }
}

/// A hosting account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// A group of servers within an account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub virtual_machines: Vec<VirtualMachine>,
}

/// A cloud server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub name: String,
    pub hostname: String,
    #[serde(default)]
    pub power_on: bool,
    pub cores: u32,
    /// Memory in MiB.
    pub memory: u64,
    #[serde(default)]
    pub discs: Vec<Disc>,
}

/// A disc attached to a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disc {
    pub label: String,
    pub storage_grade: String,
    /// Size in MiB.
    pub size: u64,
}

#[derive(Serialize)]
struct ResizeRequest {
    size: u64,
}

/// Client for the API endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client that authenticates with `session`.
    pub fn new(base_url: &str, session: &Session) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", session.token))
                .context("Invalid token format")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, EndpointError> {
        let request = self.client.get(self.url(path));
        let body = send(Endpoint::Api, &self.base_url, path, request).await?;
        decode(Endpoint::Api, &body)
    }

    async fn post<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, EndpointError> {
        let request = self.client.post(self.url(path)).json(body);
        let body = send(Endpoint::Api, &self.base_url, path, request).await?;
        decode(Endpoint::Api, &body)
    }

    async fn put<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), EndpointError> {
        let request = self.client.put(self.url(path)).json(body);
        send(Endpoint::Api, &self.base_url, path, request).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), EndpointError> {
        let request = self.client.delete(self.url(path));
        send(Endpoint::Api, &self.base_url, path, request).await?;
        Ok(())
    }

    fn group_path(group: &GroupName) -> String {
        format!("/accounts/{}/groups/{}", group.account, group.group)
    }

    fn server_path(name: &ServerName) -> String {
        format!(
            "/accounts/{}/groups/{}/virtual_machines/{}",
            name.account, name.group, name.server
        )
    }

    pub async fn get_account(&self, account: &str) -> Result<Account, EndpointError> {
        self.get(&format!("/accounts/{account}?view=overview")).await
    }

    pub async fn get_group(&self, group: &GroupName) -> Result<Group, EndpointError> {
        self.get(&format!("{}?view=overview", Self::group_path(group)))
            .await
    }

    pub async fn delete_group(&self, group: &GroupName) -> Result<(), EndpointError> {
        self.delete(&Self::group_path(group)).await
    }

    pub async fn get_virtual_machine(
        &self,
        name: &ServerName,
    ) -> Result<VirtualMachine, EndpointError> {
        self.get(&format!("{}?view=overview", Self::server_path(name)))
            .await
    }

    pub async fn delete_virtual_machine(
        &self,
        name: &ServerName,
        purge: bool,
    ) -> Result<(), EndpointError> {
        let mut path = Self::server_path(name);
        if purge {
            path.push_str("?purge=true");
        }
        self.delete(&path).await
    }

    pub async fn create_disc(
        &self,
        name: &ServerName,
        disc: &DiscSpec,
    ) -> Result<Disc, EndpointError> {
        self.post(&format!("{}/discs", Self::server_path(name)), disc)
            .await
    }

    pub async fn resize_disc(
        &self,
        name: &ServerName,
        label: &str,
        size: u64,
    ) -> Result<(), EndpointError> {
        self.put(
            &format!("{}/discs/{label}", Self::server_path(name)),
            &ResizeRequest { size },
        )
        .await
    }
}
