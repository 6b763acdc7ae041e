//! Image dimension resolution
//!
//! Probes the configured IIIF Image Service's `info.json` endpoint for
//! each media URI to learn pixel width and height. Probes run
//! concurrently up to a bounded window shared across the whole run, so
//! the remote service never sees more than N outstanding requests no
//! matter how records are pipelined. Results are collected by original
//! index, so descriptor order always equals input order regardless of
//! completion order.

use crate::config::PipelineConfig;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ============================================================================
// Probe Constants
// ============================================================================

/// Retries after the initial attempt for transient failures.
pub const RETRY_BUDGET: u32 = 2;

/// Base backoff between retries; grows linearly with the attempt number.
pub const RETRY_BACKOFF_MS: u64 = 250;

/// Why a probe failed after its retry budget was exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The probe did not answer within the configured timeout
    Timeout,
    /// The image service answered 404 for this identifier
    NotFound,
    /// The response was not an info document with numeric dimensions
    MalformedResponse(String),
    /// Transport-level failure (DNS, refused connection, 5xx, ...)
    ConnectionError(String),
}

impl ProbeError {
    /// Short kind tag for structured log events
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout => "Timeout",
            ProbeError::NotFound => "NotFound",
            ProbeError::MalformedResponse(_) => "MalformedResponse",
            ProbeError::ConnectionError(_) => "ConnectionError",
        }
    }

    /// Whether the failure is worth retrying
    fn is_transient(&self) -> bool {
        matches!(self, ProbeError::Timeout | ProbeError::ConnectionError(_))
    }
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Timeout => write!(f, "probe timed out"),
            ProbeError::NotFound => write!(f, "image not found on service"),
            ProbeError::MalformedResponse(msg) => write!(f, "malformed info response: {}", msg),
            ProbeError::ConnectionError(msg) => write!(f, "connection error: {}", msg),
        }
    }
}

/// Outcome of resolving one media URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionStatus {
    /// Dimensions resolved; `service_id` is the image service's own id
    Resolved {
        width: u32,
        height: u32,
        service_id: String,
    },
    /// Probe failed after retries
    Failed(ProbeError),
    /// Probe never started (run cancelled before its turn)
    Skipped,
}

/// One media asset of a record, after resolution
///
/// Created from the record's raw URI list, written exactly once by the
/// resolver, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Source media URI
    pub uri: String,
    /// Position in the record's URI list
    pub index: usize,
    /// Resolution outcome
    pub status: ResolutionStatus,
}

impl ImageDescriptor {
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, ResolutionStatus::Resolved { .. })
    }
}

/// `info.json` payload, reduced to the fields the pipeline needs
#[derive(Debug, Deserialize)]
struct InfoResponse {
    width: Option<u32>,
    height: Option<u32>,
    id: Option<String>,
    #[serde(rename = "@id")]
    legacy_id: Option<String>,
}

impl InfoResponse {
    /// Service id, accepting both v3 `id` and v2 `@id`
    fn service_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.legacy_id.as_deref())
    }
}

/// Resolves image dimensions through the IIIF Image Service
pub struct DimensionResolver {
    client: reqwest::Client,
    base_url: String,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl DimensionResolver {
    /// Create a resolver from the run configuration
    pub fn new(config: &PipelineConfig) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .map_err(|e| {
                crate::error::GenError::config(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.image_service_base().to_string(),
            permits: Arc::new(Semaphore::new(config.concurrency)),
            concurrency: config.concurrency,
        })
    }

    /// Derive the image-service identifier from a media URI
    ///
    /// The identifier is the last path segment of the URI (query string
    /// stripped), percent-encoded for the info endpoint.
    pub fn identifier_for(uri: &str) -> String {
        let without_query = uri.split(['?', '#']).next().unwrap_or(uri);
        let segment = without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(without_query);
        urlencoding::encode(segment).into_owned()
    }

    /// The info endpoint probed for a media URI
    pub fn info_url(&self, uri: &str) -> String {
        format!("{}/{}/info.json", self.base_url, Self::identifier_for(uri))
    }

    /// Resolve all media URIs of one record
    ///
    /// Returns one descriptor per URI, in input order. A failed probe
    /// never aborts its siblings; a cancelled run marks not-yet-started
    /// probes as skipped and lets in-flight probes finish.
    pub async fn resolve(
        &self,
        catalog_number: &str,
        uris: &[String],
        cancel: &CancellationToken,
    ) -> Vec<ImageDescriptor> {
        let mut slots: Vec<Option<ImageDescriptor>> = uris.iter().map(|_| None).collect();

        let outcomes: Vec<(usize, String, ResolutionStatus)> =
            stream::iter(uris.iter().cloned().enumerate())
                .map(|(index, uri)| {
                    let cancel = cancel.clone();
                    async move {
                        let status = self.probe_slot(catalog_number, &uri, &cancel).await;
                        (index, uri, status)
                    }
                })
                .buffer_unordered(self.concurrency.max(1))
                .collect()
                .await;

        for (index, uri, status) in outcomes {
            slots[index] = Some(ImageDescriptor { uri, index, status });
        }

        // Every slot was written above; flatten keeps input order
        slots.into_iter().flatten().collect()
    }

    /// Acquire a permit, then probe with retries
    async fn probe_slot(
        &self,
        catalog_number: &str,
        uri: &str,
        cancel: &CancellationToken,
    ) -> ResolutionStatus {
        if cancel.is_cancelled() {
            return ResolutionStatus::Skipped;
        }

        let permit = tokio::select! {
            permit = self.permits.acquire() => permit,
            _ = cancel.cancelled() => return ResolutionStatus::Skipped,
        };

        let _permit = match permit {
            Ok(p) => p,
            Err(_) => return ResolutionStatus::Skipped,
        };

        match self.probe_with_retry(uri).await {
            Ok((width, height, service_id)) => {
                debug!(
                    catalog_number,
                    uri, width, height, "resolved image dimensions"
                );
                ResolutionStatus::Resolved {
                    width,
                    height,
                    service_id,
                }
            },
            Err(e) => {
                warn!(
                    catalog_number,
                    uri,
                    stage = "resolve",
                    kind = e.kind(),
                    "image probe failed: {}",
                    e
                );
                ResolutionStatus::Failed(e)
            },
        }
    }

    async fn probe_with_retry(&self, uri: &str) -> Result<(u32, u32, String), ProbeError> {
        let mut attempt = 0u32;
        loop {
            match self.probe_once(uri).await {
                Ok(resolved) => return Ok(resolved),
                Err(e) if e.is_transient() && attempt < RETRY_BUDGET => {
                    attempt += 1;
                    debug!(uri, attempt, kind = e.kind(), "retrying probe");
                    tokio::time::sleep(Duration::from_millis(
                        RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    async fn probe_once(&self, uri: &str) -> Result<(u32, u32, String), ProbeError> {
        let url = self.info_url(uri);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::ConnectionError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProbeError::NotFound);
        }
        if !status.is_success() {
            return Err(ProbeError::ConnectionError(format!(
                "unexpected status {} from {}",
                status, url
            )));
        }

        let info: InfoResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout
            } else {
                ProbeError::MalformedResponse(e.to_string())
            }
        })?;

        match (info.width, info.height) {
            (Some(width), Some(height)) => {
                let service_id = info
                    .service_id()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| url.trim_end_matches("/info.json").to_string());
                Ok((width, height, service_id))
            },
            _ => Err(ProbeError::MalformedResponse(
                "missing numeric width/height".to_string(),
            )),
        }
    }
}
