use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{header::HeaderMap, Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::RailApiError;

/// A small wrapper around a `reqwest` client bound to one base URL.
///
/// Every client carries a default timeout, so a hung remote call can never stall the caller indefinitely.
#[derive(Clone)]
pub struct RestClient {
    base_url: Url,
    client: Arc<Client>,
}

impl RestClient {
    pub fn new(base_url: &str, headers: HeaderMap, timeout: Duration) -> Result<Self, RailApiError> {
        let base_url = Url::parse(base_url).map_err(|e| RailApiError::Initialization(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RailApiError::Initialization(format!("{base_url} cannot be used as a base URL")));
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RailApiError::Initialization(e.to_string()))?;
        Ok(Self { base_url, client: Arc::new(client) })
    }

    /// Builds an endpoint URL from path segments. Each segment is percent-encoded, so identifiers taken from the
    /// ledger can never alter the path structure.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let url = self.endpoint(segments);
        trace!("Preparing {method} {url}");
        self.client.request(method, url)
    }

    /// Sends the request and deserializes a successful response body into `T`.
    pub async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, RailApiError> {
        let response = req.send().await?;
        Self::parse_response(response).await
    }

    pub async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, RailApiError> {
        if response.status().is_success() {
            trace!("Query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| RailApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(RailApiError::from)?;
            Err(RailApiError::QueryError { status, message })
        }
    }
}
