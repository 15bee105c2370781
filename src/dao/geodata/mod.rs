//! Read-only access to the third-party geodata provider and the decorative image pool.

pub mod elements;
pub mod images;
pub mod overpass;

use futures::future::BoxFuture;
use rand::{Rng, seq::IndexedRandom};
use reqwest::StatusCode;
use thiserror::Error;

use crate::state::geo::Position;

pub use elements::{FieldDraft, RawElement};

/// Failures talking to external data providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Building the HTTP client failed.
    #[error("failed to build HTTP client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A geodata endpoint could not be reached.
    #[error("geodata endpoint `{endpoint}` unreachable")]
    EndpointRequest {
        /// Endpoint queried.
        endpoint: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A geodata endpoint answered with a non-success status.
    #[error("geodata endpoint `{endpoint}` answered with status {status}")]
    EndpointStatus {
        /// Endpoint queried.
        endpoint: String,
        /// Status returned.
        status: StatusCode,
    },
    /// A geodata endpoint answered with a body that is not an element list.
    #[error("geodata endpoint `{endpoint}` returned an unreadable body")]
    EndpointBody {
        /// Endpoint queried.
        endpoint: String,
        /// Decoding error.
        #[source]
        source: reqwest::Error,
    },
    /// Every configured geodata endpoint failed.
    #[error("all {attempts} geodata endpoint(s) failed")]
    AllEndpointsFailed {
        /// Number of endpoints tried.
        attempts: usize,
    },
    /// The image pool request could not be sent or decoded.
    #[error("image pool request failed")]
    ImageRequest {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The image pool answered with a non-success status.
    #[error("image pool answered with status {status}")]
    ImageStatus {
        /// Status returned.
        status: StatusCode,
    },
}

/// Source of raw pitch/stadium elements around a point.
pub trait GeodataProvider: Send + Sync {
    /// Elements within `radius_m` meters of `center`.
    fn fetch_elements(
        &self,
        center: Position,
        radius_m: f64,
    ) -> BoxFuture<'static, Result<Vec<RawElement>, ProviderError>>;
}

/// Source of decorative photo URLs used to backfill fields without a real photo.
pub trait ImageSource: Send + Sync {
    /// Fetch a pool of image URLs; an empty pool is a valid answer.
    fn fetch_pool(&self) -> BoxFuture<'static, Result<ImagePool, ProviderError>>;
}

/// Photo URLs available for backfilling during one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePool(Vec<String>);

impl ImagePool {
    /// Wrap a list of URLs, dropping blank entries.
    pub fn new(urls: Vec<String>) -> Self {
        Self(
            urls.into_iter()
                .filter(|url| !url.trim().is_empty())
                .collect(),
        )
    }

    /// Pool with no images; backfilling is skipped.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the pool holds no URL.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of URLs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Pick one URL uniformly at random.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&str> {
        self.0.choose(rng).map(String::as_str)
    }
}
