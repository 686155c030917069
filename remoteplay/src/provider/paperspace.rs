//! Paperspace Core REST client.
//!
//! Endpoints used:
//! - `GET /machines` (paged via `hasMore` / `nextPage`)
//! - `GET /machines/{id}`
//! - `PATCH /machines/{id}/start`
//! - `PATCH /machines/{id}/stop`

use super::MachineProvider;
use crate::machine::{Machine, MachineState};
use async_trait::async_trait;
use remoteplay_shared::errors::{RemoteplayError, RemoteplayResult};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

/// Safety stop for a provider that keeps reporting `hasMore`.
const MAX_PAGES: usize = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachineDto {
    id: String,
    name: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default, alias = "publicAddress", alias = "publicIpAddress")]
    public_ip: Option<String>,
}

impl From<MachineDto> for Machine {
    fn from(dto: MachineDto) -> Self {
        let state = dto
            .state
            .as_deref()
            .map(MachineState::from_provider)
            .unwrap_or_default();
        Machine {
            id: dto.id,
            name: dto.name,
            public_address: dto.public_ip.filter(|ip| !ip.is_empty()),
            state,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MachinePageDto {
    #[serde(default)]
    items: Vec<MachineDto>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_page: Option<String>,
}

/// Bearer-authenticated Paperspace API client.
#[derive(Clone)]
pub struct PaperspaceProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl std::fmt::Debug for PaperspaceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperspaceProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PaperspaceProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> RemoteplayResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RemoteplayError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn machines_url(&self, path: &str) -> String {
        if path.is_empty() {
            format!("{}/machines", self.base_url)
        } else {
            format!("{}/machines/{}", self.base_url, path)
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> RemoteplayResult<Response> {
        let resp = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| RemoteplayError::ProviderUnavailable(format!("{}: {}", what, e)))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(status, what, &body))
    }

    async fn fetch_page(&self, after: Option<&str>) -> RemoteplayResult<MachinePageDto> {
        let mut req = self.http.get(self.machines_url(""));
        if let Some(cursor) = after {
            req = req.query(&[("after", cursor)]);
        }
        let resp = self.send(req, "list machines").await?;
        decode(resp, "list machines").await
    }
}

/// Map a non-success HTTP status to the error taxonomy.
fn classify_status(status: StatusCode, what: &str, body: &str) -> RemoteplayError {
    let detail = format!("{} returned {}: {}", what, status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteplayError::AuthenticationRejected(detail)
        }
        StatusCode::NOT_FOUND => RemoteplayError::MachineNotFound(detail),
        _ => RemoteplayError::ProviderUnavailable(detail),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response, what: &str) -> RemoteplayResult<T> {
    let text = resp
        .text()
        .await
        .map_err(|e| RemoteplayError::ProviderUnavailable(format!("{}: {}", what, e)))?;
    serde_json::from_str(&text).map_err(|e| {
        RemoteplayError::ProviderUnavailable(format!("{}: malformed response: {}", what, e))
    })
}

#[async_trait]
impl MachineProvider for PaperspaceProvider {
    async fn list_machines(&self) -> RemoteplayResult<Vec<Machine>> {
        let mut machines = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(cursor.as_deref()).await?;
            machines.extend(page.items.into_iter().map(Machine::from));

            match (page.has_more, page.next_page) {
                (true, Some(next)) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(machines),
            }
        }

        tracing::warn!(pages = MAX_PAGES, "Machine list still paging, truncating");
        Ok(machines)
    }

    async fn get_machine(&self, id: &str) -> RemoteplayResult<Machine> {
        let resp = self
            .send(self.http.get(self.machines_url(id)), "get machine")
            .await?;
        let dto: MachineDto = decode(resp, "get machine").await?;
        Ok(Machine::from(dto))
    }

    async fn get_state(&self, id: &str) -> RemoteplayResult<MachineState> {
        let state = self.get_machine(id).await?.state;
        tracing::trace!(machine_id = %id, state = %state, "Polled machine state");
        Ok(state)
    }

    async fn request_start(&self, id: &str) -> RemoteplayResult<()> {
        tracing::info!(machine_id = %id, "Requesting machine start");
        self.send(
            self.http.patch(self.machines_url(&format!("{}/start", id))),
            "start machine",
        )
        .await
        .map(|_| ())
    }

    async fn request_stop(&self, id: &str) -> RemoteplayResult<()> {
        tracing::info!(machine_id = %id, "Requesting machine stop");
        self.send(
            self.http.patch(self.machines_url(&format!("{}/stop", id))),
            "stop machine",
        )
        .await
        .map(|_| ())
    }
}
