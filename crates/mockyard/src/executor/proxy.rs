//! Forwarding requests to an upstream.

use crate::matcher::InboundRequest;
use anyhow::Context;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

/// Connection-scoped headers that are never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    /// In upstream order; repeated names (e.g. `set-cookie`) are kept.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Build the HTTP client used for proxying.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .build()
        .context("Failed to create HTTP client")
}

/// `base_url` joined with the request's path and query string.
pub fn upstream_url(base_url: &str, req: &InboundRequest) -> String {
    let base = base_url.trim().trim_end_matches('/');
    let path = if req.path.starts_with('/') {
        req.path.clone()
    } else {
        format!("/{}", req.path)
    };
    if req.raw_query.is_empty() {
        format!("{base}{path}")
    } else {
        format!("{base}{path}?{}", req.raw_query)
    }
}

/// Forward `req` to `url`, preserving method, headers and body.
pub async fn forward(
    client: &reqwest::Client,
    url: &str,
    req: &InboundRequest,
    timeout: Duration,
) -> Result<UpstreamResponse, anyhow::Error> {
    let method = reqwest::Method::from_bytes(req.method.as_bytes())
        .with_context(|| format!("Invalid method '{}'", req.method))?;

    debug!("Proxy request to: {} {}", method, url);

    let mut request = client.request(method, url).timeout(timeout);
    for (key, value) in &req.headers {
        if is_hop_by_hop(key)
            || key.eq_ignore_ascii_case("host")
            || key.eq_ignore_ascii_case("content-length")
        {
            continue;
        }
        request = request.header(key.as_str(), value.as_str());
    }
    if !req.body.is_empty() {
        request = request.body(req.body.clone());
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to send proxy request to {url}"))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter(|(k, _)| !is_hop_by_hop(k.as_str()) && *k != reqwest::header::CONTENT_LENGTH)
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let body = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read response body from {url}"))?;

    Ok(UpstreamResponse {
        status,
        headers,
        body,
    })
}
