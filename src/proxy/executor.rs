//! Deadline-bound request execution and outcome classification
//!
//! One call in, one outbound request, one classified outcome back. Retries,
//! if wanted, belong to the caller: silently retrying a non-idempotent
//! method here would be unsafe. The deadline is the client's total timeout,
//! covering connect, headers and body read, so an execution can never hang
//! past it.

use std::time::Duration;

use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;
use url::Url;

use super::multipart::{self, MultipartField};

pub const USER_AGENT_STRING: &str = concat!("flowproxy/", env!("CARGO_PKG_VERSION"));

/// A fully-specified request, ready to proxy.
///
/// Credentials and variable substitution happen upstream; by the time a
/// description reaches the executor every header and the URL are final.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDescription {
    pub method: String,
    /// Absolute URL of the upstream target.
    pub url: String,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub body: RequestBody,
}

/// Request body, decided once at construction. A body is raw bytes, a JSON
/// value, or a multipart part list; the variants never mix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum RequestBody {
    #[default]
    None,
    Raw(Vec<u8>),
    Json(JsonValue),
    Multipart(Vec<MultipartField>),
}

/// Classified result of one proxied request.
///
/// `UpstreamError` is a successful proxying of an unsuccessful upstream
/// response and is deliberately distinct from `TransportFailure`: "the
/// target API said no" and "the network failed" must never be conflated.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success {
        status: u16,
        headers: IndexMap<String, String>,
        body: Vec<u8>,
    },
    UpstreamError {
        status: u16,
        body: Vec<u8>,
    },
    Timeout {
        deadline_ms: u64,
    },
    TransportFailure {
        detail: String,
    },
    /// The description itself was unusable (bad URL, bad header, bad part).
    /// A caller bug, not a network condition; reported before any I/O.
    MalformedRequest {
        detail: String,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }
}

/// Execute one request against its upstream within `deadline`.
///
/// Exactly one outbound call; redirects are not followed (following one
/// would be a second call). The client is built per call so concurrent
/// executions with different deadlines never share timeout state, and no
/// pooled connection outlives the returned outcome.
pub async fn execute(description: &RequestDescription, deadline: Duration) -> ExecutionOutcome {
    let request = match prepare(description, deadline) {
        Ok(request) => request,
        Err(detail) => return ExecutionOutcome::MalformedRequest { detail },
    };

    debug!(
        method = %description.method,
        url = %description.url,
        deadline_ms = deadline.as_millis() as u64,
        "executing proxied request"
    );

    // The single suspension point: exactly one of response, deadline or
    // transport error occurs. The outer timeout is authoritative; the
    // client's own timeout backstops connection phases inside reqwest.
    let exchange = async {
        let response = request.send().await?;
        let status = response.status();
        let headers = flatten_headers(response.headers());
        let body = response.bytes().await?.to_vec();
        Ok::<_, reqwest::Error>((status, headers, body))
    };

    let (status, headers, body) = match tokio::time::timeout(deadline, exchange).await {
        Err(_) => {
            return ExecutionOutcome::Timeout {
                deadline_ms: deadline.as_millis() as u64,
            }
        }
        Ok(Err(err)) => return classify_send_error(&err, deadline),
        Ok(Ok(parts)) => parts,
    };

    if status.is_success() {
        ExecutionOutcome::Success {
            status: status.as_u16(),
            headers,
            body,
        }
    } else {
        // Surfaced with the upstream's exact status and body, untranslated.
        ExecutionOutcome::UpstreamError {
            status: status.as_u16(),
            body,
        }
    }
}

/// Build the outbound request. Every failure here is a `MalformedRequest`.
fn prepare(
    description: &RequestDescription,
    deadline: Duration,
) -> Result<reqwest::RequestBuilder, String> {
    let method: Method = description
        .method
        .parse()
        .map_err(|_| format!("Invalid HTTP method: {}", description.method))?;

    let url = Url::parse(&description.url)
        .map_err(|e| format!("Invalid URL '{}': {}", description.url, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Unsupported URL scheme: {}", url.scheme()));
    }

    let mut headers = HeaderMap::new();
    for (name, value) in &description.headers {
        let header_name = HeaderName::try_from(name.as_str())
            .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
        let header_value = HeaderValue::try_from(value.as_str())
            .map_err(|e| format!("Invalid header value for '{}': {}", name, e))?;
        headers.append(header_name, header_value);
    }
    let has_content_type = headers.contains_key(CONTENT_TYPE);

    let client = Client::builder()
        .user_agent(USER_AGENT_STRING)
        .timeout(deadline)
        .redirect(reqwest::redirect::Policy::none())
        .referer(false)
        .build()
        .map_err(|e| format!("Failed to build client: {}", e))?;

    let mut builder = client.request(method, url).headers(headers);

    builder = match &description.body {
        RequestBody::None => builder,
        RequestBody::Raw(bytes) => builder.body(bytes.clone()),
        RequestBody::Json(value) => {
            let bytes = serde_json::to_vec(value)
                .map_err(|e| format!("Unserializable JSON body: {}", e))?;
            if !has_content_type {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder.body(bytes)
        }
        RequestBody::Multipart(fields) => {
            // Encoded (and binary parts decoded) before any network I/O.
            let payload = multipart::encode(fields).map_err(|e| e.to_string())?;
            builder
                .header(CONTENT_TYPE, payload.content_type)
                .body(payload.body)
        }
    };

    Ok(builder)
}

/// Map a send-phase error to an outcome, in spec priority order.
fn classify_send_error(err: &reqwest::Error, deadline: Duration) -> ExecutionOutcome {
    if err.is_timeout() {
        return ExecutionOutcome::Timeout {
            deadline_ms: deadline.as_millis() as u64,
        };
    }
    if err.is_builder() {
        return ExecutionOutcome::MalformedRequest {
            detail: error_chain(err),
        };
    }
    ExecutionOutcome::TransportFailure {
        detail: error_chain(err),
    }
}

/// Full cause chain as diagnostic text; reqwest's display alone often hides
/// the interesting io error underneath.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

/// Flatten upstream headers to strings. Values outside visible ASCII are
/// rare but legal in HTTP; they are carried via lossy UTF-8 decoding rather
/// than dropped, so the caller always sees every header name the upstream
/// sent.
fn flatten_headers(headers: &HeaderMap) -> IndexMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let text = match value.to_str() {
                Ok(text) => text.to_string(),
                Err(_) => {
                    debug!(header = %name, "upstream header value is not visible ASCII, decoding lossily");
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                }
            };
            (name.to_string(), text)
        })
        .collect()
}
