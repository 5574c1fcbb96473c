//! HTTP client shared by the OCR service and Google Drive integrations.
//!
//! Thin wrapper around `reqwest` that fixes the user agent and timeout per
//! service and returns `HttpResponse` values with pre-extracted headers.

mod response;

pub use response::HttpResponse;

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use tracing::debug;

use response::extract_response_headers;

/// Default user agent for outgoing requests.
pub const USER_AGENT: &str = concat!("ocrlens/", env!("CARGO_PKG_VERSION"));

/// HTTP client bound to one remote service.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    service: String,
}

/// Builder for constructing `HttpClient` with optional configuration.
pub struct HttpClientBuilder {
    service: String,
    timeout: Duration,
}

impl HttpClientBuilder {
    /// Build the client.
    pub fn build(self) -> Result<HttpClient, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(HttpClient {
            client,
            service: self.service,
        })
    }
}

impl HttpClient {
    /// Start building a client for `service` with the given request timeout.
    pub fn builder(service: &str, timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            service: service.to_string(),
            timeout,
        }
    }

    /// GET with optional query parameters and bearer token.
    pub async fn get(
        &self,
        url: &str,
        query: &[(&str, &str)],
        bearer: Option<&str>,
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        self.send("GET", url, request).await
    }

    /// POST a JSON body with extra headers.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        json: &T,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, reqwest::Error> {
        let mut request = self.client.post(url).json(json);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send("POST", url, request).await
    }

    /// POST an urlencoded form.
    pub async fn post_form<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        form: &T,
    ) -> Result<HttpResponse, reqwest::Error> {
        let request = self.client.post(url).form(form);
        self.send("POST", url, request).await
    }

    async fn send(
        &self,
        method: &str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<HttpResponse, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} {} {} -> {}", self.service, method, url, status);

        Ok(HttpResponse {
            status,
            headers: extract_response_headers(&response),
            response,
        })
    }
}
