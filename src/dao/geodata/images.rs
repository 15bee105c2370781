use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{ImagePool, ImageSource, ProviderError};

/// Pixabay-style keyed image search.
#[derive(Clone)]
pub struct PixabayImageSource {
    client: Client,
    endpoint: String,
    api_key: String,
    query: String,
    per_page: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    #[serde(default)]
    large_image_url: Option<String>,
}

impl PixabayImageSource {
    /// Build a source querying `endpoint` with `api_key`.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        query: impl Into<String>,
        per_page: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::ClientBuilder { source })?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            query: query.into(),
            per_page,
        })
    }

    async fn fetch(&self) -> Result<ImagePool, ProviderError> {
        let per_page = self.per_page.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", self.query.as_str()),
                ("image_type", "photo"),
                ("per_page", per_page.as_str()),
                ("safesearch", "true"),
                ("category", "places,sports"),
            ])
            .send()
            .await
            .map_err(|source| ProviderError::ImageRequest { source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::ImageStatus { status });
        }

        let body = response
            .json::<SearchResponse>()
            .await
            .map_err(|source| ProviderError::ImageRequest { source })?;
        let pool = ImagePool::new(
            body.hits
                .into_iter()
                .filter_map(|hit| hit.large_image_url)
                .collect(),
        );
        info!(count = pool.len(), "fetched image pool");
        Ok(pool)
    }
}

impl ImageSource for PixabayImageSource {
    fn fetch_pool(&self) -> BoxFuture<'static, Result<ImagePool, ProviderError>> {
        let source = self.clone();
        Box::pin(async move { source.fetch().await })
    }
}

/// Used when no image API key is configured: always yields an empty pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledImageSource;

impl ImageSource for DisabledImageSource {
    fn fetch_pool(&self) -> BoxFuture<'static, Result<ImagePool, ProviderError>> {
        Box::pin(async { Ok(ImagePool::empty()) })
    }
}
