//! Issues hits against the attack target over HTTP.

use std::time::{Duration, Instant};

use reqwest::{Client, Method, Url};

use crate::metrics::Hit;

/// The target of an attack: a fixed request sent with a shared HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    /// The HTTP client used to talk to the target.
    pub client: Client,
    /// The request method.
    pub method: Method,
    /// The attacked URL.
    pub url: Url,
}

impl HttpRemote {
    /// Creates a new `HttpRemote` sending `GET` requests to `url` with a default client.
    pub fn new(url: Url) -> Self {
        Self {
            client: Client::new(),
            method: Method::GET,
            url,
        }
    }

    /// Sets the request method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Uses a client with the given per-request `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> reqwest::Result<Self> {
        self.client = Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Sends a single request and records its outcome.
    ///
    /// The response body is read completely, so the latency includes the transfer.
    pub async fn hit(&self) -> Hit {
        let timestamp = Instant::now();
        let mut hit = Hit {
            timestamp,
            latency: Duration::ZERO,
            status: None,
            bytes_in: 0,
            error: None,
        };

        match self
            .client
            .request(self.method.clone(), self.url.clone())
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                hit.status = Some(status.as_u16());
                match response.bytes().await {
                    Ok(body) => hit.bytes_in = body.len() as u64,
                    Err(error) => hit.error = Some(error.to_string()),
                }
                if hit.error.is_none() && !(200..400).contains(&status.as_u16()) {
                    hit.error = Some(status.to_string());
                }
            }
            Err(error) => {
                tracing::debug!(error = &error as &dyn std::error::Error, "request failed");
                hit.error = Some(error.to_string());
            }
        }

        hit.latency = timestamp.elapsed();
        hit
    }
}
