//! `reqwest` implementation of [`LinodeApi`].

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::failure::ApiFailure;

use super::types::{CatalogueEntry, CatalogueKind, CreateInstanceRequest, Instance, Page};
use super::{ApiFuture, LinodeApi};

/// Base URL of the public Linode API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.linode.com/v4";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 500;

/// Talks to the Linode API over HTTPS with a personal access token.
#[derive(Clone, Debug)]
pub struct HttpLinodeApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpLinodeApi {
    /// Builds a client for the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ApiFailure::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new(token: impl Into<String>) -> Result<Self, ApiFailure> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("kitchen-linode/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ApiFailure::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            token: token.into(),
        })
    }

    /// Points the client at another API root (for example a proxy).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{path}", self.base_url))
            .bearer_auth(&self.token)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Vec<u8>, ApiFailure> {
        let response = builder.send().await.map_err(map_request_error)?;
        read_body(response).await
    }

    async fn list_all<T>(&self, path: &str) -> Result<Vec<T>, ApiFailure>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page = 1_u32;
        loop {
            let builder = self.request(Method::GET, path).query(&[
                ("page", page.to_string()),
                ("page_size", PAGE_SIZE.to_string()),
            ]);
            let body = self.send(builder).await?;
            let parsed: Page<T> = decode(&body)?;
            items.extend(parsed.data);
            if parsed.page >= parsed.pages {
                return Ok(items);
            }
            page = parsed.page + 1;
        }
    }
}

impl LinodeApi for HttpLinodeApi {
    fn list_instances(&self) -> ApiFuture<'_, Vec<Instance>> {
        Box::pin(async move { self.list_all("linode/instances").await })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a CreateInstanceRequest,
    ) -> ApiFuture<'a, Instance> {
        Box::pin(async move {
            let builder = self
                .request(Method::POST, "linode/instances")
                .json(request);
            let body = self.send(builder).await?;
            decode(&body)
        })
    }

    fn get_instance(&self, id: u64) -> ApiFuture<'_, Instance> {
        Box::pin(async move {
            let builder = self.request(Method::GET, &format!("linode/instances/{id}"));
            let body = self.send(builder).await?;
            decode(&body)
        })
    }

    fn delete_instance(&self, id: u64) -> ApiFuture<'_, ()> {
        Box::pin(async move {
            let builder = self.request(Method::DELETE, &format!("linode/instances/{id}"));
            self.send(builder).await.map(drop)
        })
    }

    fn list_catalogue(&self, kind: CatalogueKind) -> ApiFuture<'_, Vec<CatalogueEntry>> {
        Box::pin(async move { self.list_all(kind.path()).await })
    }
}

async fn read_body(response: Response) -> Result<Vec<u8>, ApiFailure> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response.bytes().await.map_err(map_request_error)?;

    if status.is_success() {
        return Ok(body.to_vec());
    }

    Err(ApiFailure::Http {
        status: status.as_u16(),
        retry_after,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn map_request_error(err: reqwest::Error) -> ApiFailure {
    if err.is_timeout() {
        ApiFailure::Timeout {
            message: err.to_string(),
        }
    } else {
        ApiFailure::Transport {
            message: err.to_string(),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiFailure> {
    serde_json::from_slice(body).map_err(|err| ApiFailure::Decode {
        message: err.to_string(),
    })
}
