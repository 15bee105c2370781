use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use tracing::{info, warn};

use super::{GeodataProvider, ProviderError, RawElement, elements::OverpassResponse};
use crate::state::geo::Position;

/// Public Overpass mirrors, tried in order.
pub const DEFAULT_OVERPASS_ENDPOINTS: [&str; 3] = [
    "https://lz4.overpass-api.de/api/interpreter",
    "https://z.overpass-api.de/api/interpreter",
    "https://overpass-api.de/api/interpreter",
];

/// Tag filters whose union makes up a field search. Each one is applied to nodes, ways and
/// relations.
const FILTERS: [&str; 5] = [
    r#"["sport"~"soccer|football"]"#,
    r#"["leisure"="pitch"]["sport"~"multi"]"#,
    r#"["leisure"="stadium"]"#,
    r#"["building"="stadium"]"#,
    r#"["surface"="sand"]"#,
];

/// Overpass QL query returning every pitch-like element within `radius_m` of `center`.
pub fn build_query(center: Position, radius_m: f64) -> String {
    let around = format!("(around:{},{},{})", radius_m.round(), center.lat, center.lng);
    let mut query = String::from("[out:json][timeout:25];\n(\n");
    for filter in FILTERS {
        for kind in ["node", "way", "relation"] {
            query.push_str(&format!("  {kind}{filter}{around};\n"));
        }
    }
    query.push_str(");\nout center;\n");
    query
}

/// Overpass client with sequential failover across mirrors.
#[derive(Clone)]
pub struct OverpassClient {
    client: Client,
    endpoints: Arc<[String]>,
}

impl OverpassClient {
    /// Build a client querying `endpoints` in order, each request bounded by `timeout`.
    pub fn new(endpoints: Vec<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::ClientBuilder { source })?;
        Ok(Self {
            client,
            endpoints: endpoints.into(),
        })
    }

    /// Run `query` against a single endpoint, without failover.
    pub async fn query_endpoint(
        &self,
        endpoint: &str,
        query: &str,
    ) -> Result<Vec<RawElement>, ProviderError> {
        let response = self
            .client
            .post(endpoint)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(|source| ProviderError::EndpointRequest {
                endpoint: endpoint.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::EndpointStatus {
                endpoint: endpoint.to_owned(),
                status,
            });
        }

        response
            .json::<OverpassResponse>()
            .await
            .map(|body| body.elements)
            .map_err(|source| ProviderError::EndpointBody {
                endpoint: endpoint.to_owned(),
                source,
            })
    }

    async fn fetch(
        &self,
        center: Position,
        radius_m: f64,
    ) -> Result<Vec<RawElement>, ProviderError> {
        let query = build_query(center, radius_m);
        for endpoint in self.endpoints.iter() {
            match self.query_endpoint(endpoint, &query).await {
                Ok(elements) => {
                    info!(%endpoint, count = elements.len(), "fetched geodata elements");
                    return Ok(elements);
                }
                Err(err) => {
                    warn!(%endpoint, error = ?err, "geodata endpoint failed; trying next");
                }
            }
        }

        warn!(attempts = self.endpoints.len(), "all geodata endpoints failed");
        Err(ProviderError::AllEndpointsFailed {
            attempts: self.endpoints.len(),
        })
    }
}

impl GeodataProvider for OverpassClient {
    fn fetch_elements(
        &self,
        center: Position,
        radius_m: f64,
    ) -> BoxFuture<'static, Result<Vec<RawElement>, ProviderError>> {
        let client = self.clone();
        Box::pin(async move { client.fetch(center, radius_m).await })
    }
}
