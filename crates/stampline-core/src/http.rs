//! Blocking HTTP facade for cloud annotators.
//!
//! Uses async reqwest on a shared tokio runtime and exposes a sync call,
//! since the walker drives one request at a time from the main thread.

use std::sync::LazyLock;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::annotator::Failure;

/// Connect timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest response body excerpt kept in an error message
const BODY_EXCERPT: usize = 300;

#[derive(Debug)]
pub enum HttpError {
    /// Transport or status error; `status` is None when no response arrived
    Http {
        status: Option<u16>,
        message: String,
    },
    /// Response arrived but could not be decoded
    Decode(String),
    Timeout(Duration),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Decode(msg) => write!(f, "bad response body: {msg}"),
            Self::Timeout(d) => write!(f, "request timed out after {}s", d.as_secs()),
        }
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }

    /// Map onto the annotator failure vocabulary
    pub fn to_failure(&self) -> Failure {
        let msg = self.to_string();
        match self {
            Self::Timeout(_) => Failure::transient(msg),
            Self::Decode(_) => Failure::malformed(msg),
            Self::Http { status: None, .. } => Failure::transient(msg),
            Self::Http {
                status: Some(code), ..
            } => match *code {
                429 => Failure::quota(msg),
                401 | 403 => Failure::unauthorized(msg),
                404 => Failure::not_found(msg),
                408 => Failure::transient(msg),
                400 | 413 | 415 | 422 => Failure::malformed(msg),
                500..=599 => Failure::transient(msg),
                _ => Failure::malformed(msg),
            },
        }
    }
}

impl From<HttpError> for Failure {
    fn from(e: HttpError) -> Self {
        e.to_failure()
    }
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

pub fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// POST a JSON body and decode a JSON response, blocking the caller.
///
/// Non-2xx responses carry a trimmed excerpt of the body, which is where
/// cloud APIs put the useful part of the error.
pub fn post_json<B, R>(
    url: &str,
    headers: &[(&str, &str)],
    body: &B,
    timeout: Duration,
) -> Result<R, HttpError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut request = http_client().post(url).json(body);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    SHARED_RUNTIME.handle().block_on(async {
        let call = async {
            let response = request
                .send()
                .await
                .map_err(|e| HttpError::from_reqwest(&e))?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(HttpError::Http {
                    status: Some(status.as_u16()),
                    message: excerpt(&text),
                });
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| HttpError::from_reqwest(&e))?;
            serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode(e.to_string()))
        };
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| HttpError::Timeout(timeout))?
    })
}

fn excerpt(body: &str) -> String {
    let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= BODY_EXCERPT {
        return flat;
    }
    let mut cut: String = flat.chars().take(BODY_EXCERPT).collect();
    cut.push_str("...");
    cut
}
