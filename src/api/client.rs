//! Cache-backed Open Context client
//!
//! Fetches search pages one at a time, persisting each raw response body
//! before it is parsed so an interrupted acquisition resumes from disk.

use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::facets::{self, AttributeSlug};
use super::{add_missing_params, parse_url, ApiError, Query, SearchPage};
use crate::cache::CacheManager;
use crate::record::Record;

/// Pause before each network request
pub const DEFAULT_SLEEP: Duration = Duration::from_millis(250);

/// Standard von den Driesch bone measurement attribute, buried in the facets
pub const VON_DEN_DRIESCH_PROP: &str =
    "oc-zoo-anatomical-meas---oc-zoo-von-den-driesch-bone-meas";

/// All records of a search plus the size the server reported for it
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub records: Vec<Record>,
    pub total: u64,
}

impl FetchResult {
    /// Whether every reported record was retrieved
    pub fn is_complete(&self) -> bool {
        self.records.len() as u64 == self.total
    }
}

/// Client for the Open Context JSON API with an on-disk response cache
#[derive(Debug)]
pub struct OpenContextClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Cache manager for persisting responses
    cache: CacheManager,
    /// Pause before each network request
    sleep: Duration,
    /// Requests that actually went to the network
    network_requests: AtomicUsize,
}

impl OpenContextClient {
    pub fn new(cache: CacheManager) -> Self {
        Self {
            http_client: Client::new(),
            cache,
            sleep: DEFAULT_SLEEP,
            network_requests: AtomicUsize::new(0),
        }
    }

    /// Sets the pause taken before each network request
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Number of requests this client sent over the network so far
    pub fn network_requests(&self) -> usize {
        self.network_requests.load(Ordering::Relaxed)
    }

    /// Returns the body for `url`, from the cache when possible
    ///
    /// On a miss the body is fetched, written to the cache and returned
    /// unparsed.
    pub async fn get_cached(&self, url: &Url) -> Result<String, ApiError> {
        let key = self.cache.key_for_url(url.as_str());
        if let Some(body) = self.cache.read(&key)? {
            debug!(%url, %key, "cache hit");
            return Ok(body);
        }
        debug!(%url, %key, "cache miss");

        let body = self.get_from_network(url).await?;
        self.cache.write(&key, &body)?;
        Ok(body)
    }

    async fn get_from_network(&self, url: &Url) -> Result<String, ApiError> {
        if !self.sleep.is_zero() {
            tokio::time::sleep(self.sleep).await;
        }
        self.network_requests.fetch_add(1, Ordering::Relaxed);

        let network_error = |source: reqwest::Error| ApiError::Network {
            url: url.to_string(),
            source,
        };
        let response = self
            .http_client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        response.text().await.map_err(network_error)
    }

    /// Fetches and parses the page of `query` starting at row `start`
    pub async fn fetch_page(&self, query: &Query, start: u64) -> Result<SearchPage, ApiError> {
        let url = query.page_url(start)?;
        let body = self.get_cached(&url).await?;
        SearchPage::parse(&body, url.as_str())
    }

    /// Retrieves every record of a search, page by page
    ///
    /// Stops once the offset reaches the reported total, or as soon as a page
    /// comes back empty. The first failing page aborts the whole fetch; pages
    /// fetched before it stay cached.
    pub async fn fetch_all(&self, query: &Query) -> Result<FetchResult, ApiError> {
        let page_size = u64::from(query.page_size());
        let mut records = Vec::new();
        let mut start = 0;

        let total = loop {
            let mut page = self.fetch_page(query, start).await?;
            let total = page.total_results;
            let page_records = page.results.take().unwrap_or_default();

            if page_records.is_empty() {
                if start < total {
                    warn!(start, total, "empty page before end of results, stopping");
                }
                break total;
            }

            info!(
                "Got records {} to {} of {} from: {}",
                page.start_index + 1,
                page.last_record(),
                total,
                page.id.as_deref().unwrap_or(query.base_url()),
            );
            records.extend(page_records);

            start += page_size;
            if start >= total {
                break total;
            }
        };

        if records.len() as u64 != total {
            warn!(fetched = records.len(), total, "fetched record count differs from reported total");
        }
        Ok(FetchResult { records, total })
    }

    /// Fetches a single search response as untyped JSON
    pub async fn fetch_json(&self, url: &Url) -> Result<Value, ApiError> {
        let body = self.get_cached(url).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Lists the "standard" (linked-data) attributes of a search
    pub async fn standard_attributes(
        &self,
        search_url: &str,
        add_von_den_driesch_bone_measures: bool,
    ) -> Result<Vec<AttributeSlug>, ApiError> {
        let mut url = parse_url(search_url)?;
        if add_von_den_driesch_bone_measures {
            add_missing_params(&mut url, &[("prop", VON_DEN_DRIESCH_PROP.to_string())]);
        }
        let json = self.fetch_json(&url).await?;
        Ok(facets::standard_attributes(&json))
    }

    /// Lists project-defined attributes used by at least `min_portion` of records
    pub async fn common_attributes(
        &self,
        search_url: &str,
        min_portion: f64,
    ) -> Result<Vec<AttributeSlug>, ApiError> {
        let url = parse_url(search_url)?;
        let json = self.fetch_json(&url).await?;
        Ok(facets::common_attributes(&json, min_portion))
    }

    /// Deletes cache files whose name starts with `prefix`
    pub fn clear_cache(&self, prefix: &str) -> Result<usize, ApiError> {
        let removed = self.cache.clear(prefix)?;
        info!(removed, prefix, "cleared cache");
        Ok(removed)
    }

    /// Deletes every cache file outside the current prefix
    pub fn clear_stale_cache(&self) -> Result<usize, ApiError> {
        let removed = self.cache.clear_except(self.cache.prefix())?;
        info!(removed, keep = self.cache.prefix(), "cleared stale cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    /// Nothing listens on the discard port, so any network call fails fast
    const UNREACHABLE: &str = "http://127.0.0.1:9/query/";

    fn create_test_client() -> (OpenContextClient, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = CacheManager::with_dir(temp_dir.path().to_path_buf())
            .with_prefix("test")
            .unwrap();
        let client = OpenContextClient::new(cache).with_sleep(Duration::ZERO);
        (client, temp_dir)
    }

    fn page_body(total: u64, start: u64, labels: &[String]) -> String {
        let results: Vec<Value> = labels.iter().map(|l| json!({ "label": l })).collect();
        json!({
            "totalResults": total,
            "startIndex": start,
            "itemsPerPage": results.len(),
            "oc-api:has-results": results,
        })
        .to_string()
    }

    fn seed_page(client: &OpenContextClient, query: &Query, start: u64, body: &str) {
        let url = query.page_url(start).unwrap();
        let key = client.cache().key_for_url(url.as_str());
        client.cache().write(&key, body).unwrap();
    }

    fn labels(range: std::ops::Range<u64>) -> Vec<String> {
        range.map(|i| format!("item-{i}")).collect()
    }

    #[tokio::test]
    async fn test_fetch_all_reads_two_cached_pages_without_network() {
        let (client, _temp_dir) = create_test_client();
        let query = Query::new(UNREACHABLE).with_page_size(200);
        seed_page(&client, &query, 0, &page_body(250, 0, &labels(0..200)));
        seed_page(&client, &query, 200, &page_body(250, 200, &labels(200..250)));

        let result = client.fetch_all(&query).await.unwrap();

        assert_eq!(result.total, 250);
        assert_eq!(result.records.len(), 250);
        assert!(result.is_complete());
        assert_eq!(result.records[0]["label"], "item-0");
        assert_eq!(result.records[249]["label"], "item-249");
        assert_eq!(client.network_requests(), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_twice_is_identical() {
        let (client, _temp_dir) = create_test_client();
        let query = Query::new(UNREACHABLE).with_page_size(2);
        seed_page(&client, &query, 0, &page_body(3, 0, &labels(0..2)));
        seed_page(&client, &query, 2, &page_body(3, 2, &labels(2..3)));

        let first = client.fetch_all(&query).await.unwrap();
        let second = client.fetch_all(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(client.network_requests(), 0);
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_empty_page() {
        let (client, _temp_dir) = create_test_client();
        let query = Query::new(UNREACHABLE).with_page_size(2);
        seed_page(&client, &query, 0, &page_body(10, 0, &labels(0..2)));
        seed_page(&client, &query, 2, &page_body(10, 2, &[]));

        let result = client.fetch_all(&query).await.unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.total, 10);
        assert!(!result.is_complete());
    }

    #[tokio::test]
    async fn test_fetch_all_empty_result_set() {
        let (client, _temp_dir) = create_test_client();
        let query = Query::new(UNREACHABLE);
        seed_page(&client, &query, 0, r#"{"totalResults": 0}"#);

        let result = client.fetch_all(&query).await.unwrap();

        assert!(result.records.is_empty());
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn test_cache_miss_on_unreachable_host_is_network_error() {
        let (client, _temp_dir) = create_test_client();
        let query = Query::new(UNREACHABLE).with_page_size(2);
        seed_page(&client, &query, 0, &page_body(4, 0, &labels(0..2)));

        let err = client.fetch_all(&query).await.unwrap_err();

        assert!(err.is_network(), "unexpected error: {err}");
        assert_eq!(client.network_requests(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_cached_page_is_parse_error() {
        let (client, _temp_dir) = create_test_client();
        let query = Query::new(UNREACHABLE);
        seed_page(&client, &query, 0, "{ not json");

        let err = client.fetch_all(&query).await.unwrap_err();

        assert!(matches!(err, ApiError::Parse { .. }));
        assert_eq!(client.network_requests(), 0);
    }

    #[tokio::test]
    async fn test_standard_attributes_from_cached_search() {
        let (client, _temp_dir) = create_test_client();
        let body = json!({
            "totalResults": 12,
            "oc-api:has-facets": [{
                "rdfs:isDefinedBy": "oc-api:facet-prop-ld",
                "oc-api:has-id-options": [
                    { "slug": "cidoc-crm-p2-has-type", "label": "Has type" }
                ]
            }]
        })
        .to_string();
        seed_url(&client, &parse_url(UNREACHABLE).unwrap(), &body);

        let attrs = client.standard_attributes(UNREACHABLE, false).await.unwrap();

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].slug, "cidoc-crm-p2-has-type");
    }

    fn seed_url(client: &OpenContextClient, url: &Url, body: &str) {
        let key = client.cache().key_for_url(url.as_str());
        client.cache().write(&key, body).unwrap();
    }

    fn bone_measure_facets() -> String {
        json!({
            "totalResults": 40,
            "oc-api:has-facets": [{
                "rdfs:isDefinedBy": "oc-api:facet-prop-ld",
                "oc-api:has-id-options": [
                    { "slug": "obo-uberon-0001442", "label": "Bd" }
                ]
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_standard_attributes_adds_bone_measure_prop() {
        let (client, _temp_dir) = create_test_client();
        let mut url = parse_url(UNREACHABLE).unwrap();
        url.query_pairs_mut().append_pair("prop", VON_DEN_DRIESCH_PROP);
        seed_url(&client, &url, &bone_measure_facets());

        let attrs = client.standard_attributes(UNREACHABLE, true).await.unwrap();

        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].label, "Bd");
        assert_eq!(client.network_requests(), 0);
    }

    #[tokio::test]
    async fn test_standard_attributes_does_not_repeat_bone_measure_prop() {
        let (client, _temp_dir) = create_test_client();
        let search = format!("{}?prop={}", UNREACHABLE, VON_DEN_DRIESCH_PROP);
        let url = parse_url(&search).unwrap();
        seed_url(&client, &url, &bone_measure_facets());

        let attrs = client.standard_attributes(&search, true).await.unwrap();

        assert_eq!(attrs[0].slug, "obo-uberon-0001442");
        assert_eq!(client.network_requests(), 0);
        let props = url.query_pairs().filter(|(k, _)| k == "prop").count();
        assert_eq!(props, 1);
    }

    #[tokio::test]
    async fn test_common_attributes_from_cached_search() {
        let (client, _temp_dir) = create_test_client();
        let body = json!({
            "totalResults": 10,
            "oc-api:has-facets": [{
                "rdfs:isDefinedBy": "oc-api:facet-prop-var",
                "oc-api:has-text-options": [
                    {
                        "slug": "24-motif", "label": "Motif", "count": 6,
                        "rdfs:isDefinedBy": "http://opencontext.org/predicates/abc"
                    },
                    {
                        "slug": "24-rare", "label": "Rare", "count": 1,
                        "rdfs:isDefinedBy": "http://opencontext.org/predicates/def"
                    }
                ]
            }]
        })
        .to_string();
        seed_url(&client, &parse_url(UNREACHABLE).unwrap(), &body);

        let common = client.common_attributes(UNREACHABLE, 0.5).await.unwrap();
        let everything = client.common_attributes(UNREACHABLE, 0.0).await.unwrap();

        assert_eq!(common.len(), 1);
        assert_eq!(common[0].slug, "24-motif");
        assert_eq!(everything.len(), 2);
        assert_eq!(client.network_requests(), 0);
    }

    #[test]
    fn test_clear_cache_by_prefix() {
        let (client, temp_dir) = create_test_client();
        client.cache().write("test-aaa", "{}").unwrap();
        client.cache().write("other-bbb", "{}").unwrap();

        assert_eq!(client.clear_cache("test").unwrap(), 1);
        assert!(temp_dir.path().join("other-bbb.json").exists());

        assert_eq!(client.clear_stale_cache().unwrap(), 1);
        assert!(!temp_dir.path().join("other-bbb.json").exists());
    }
}
