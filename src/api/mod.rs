//! Open Context JSON API access
//!
//! This module builds paged search requests, parses search responses and
//! exposes a cache-backed client that walks a whole result set.

pub mod client;
pub mod facets;

pub use client::{FetchResult, OpenContextClient};
pub use facets::{common_attributes, standard_attributes, AttributeSlug};

use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

use crate::cache::CacheError;
use crate::record::Record;

/// Number of records requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 200;

/// JSON representations asked of the search service
pub const DEFAULT_RESPONSE_TYPES: [&str; 2] = ["metadata", "uri-meta"];

/// Errors that can occur when talking to the Open Context API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server could not be reached or the transfer failed
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("request to {url} returned HTTP {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// A response body is not valid JSON or lacks expected fields
    #[error("failed to parse response from {url}: {reason}")]
    Parse { url: String, reason: String },

    /// Reading or writing the response cache failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The query URL could not be parsed
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

impl ApiError {
    /// True for failures to complete a request, including error statuses
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network { .. } | ApiError::HttpStatus { .. })
    }
}

/// A paged search query against the Open Context API
///
/// The query is immutable once built; `page_url` derives the request for a
/// given row offset.
#[derive(Debug, Clone)]
pub struct Query {
    base_url: String,
    category: Option<String>,
    project: Option<String>,
    item_type: Option<String>,
    attributes: Vec<String>,
    response_types: Vec<String>,
    flatten_attributes: bool,
    page_size: u32,
}

impl Query {
    /// Creates a query for a search URL with default page size and response types
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            category: None,
            project: None,
            item_type: None,
            attributes: Vec::new(),
            response_types: DEFAULT_RESPONSE_TYPES.iter().map(|s| s.to_string()).collect(),
            flatten_attributes: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the number of rows per page; zero is raised to one
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_item_type(mut self, item_type: impl Into<String>) -> Self {
        self.item_type = Some(item_type.into());
        self
    }

    pub fn with_response_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.response_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Asks the server to pre-join multi-valued attributes
    pub fn with_flatten_attributes(mut self, flatten: bool) -> Self {
        self.flatten_attributes = flatten;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Builds the request URL for the page starting at row `start`
    ///
    /// Filter and selector parameters already present in the base URL are
    /// left alone. `rows` and `start` are always replaced by the query's own
    /// pagination values.
    pub fn page_url(&self, start: u64) -> Result<Url, ApiError> {
        let mut url = parse_url(&self.base_url)?;
        url.set_fragment(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != "rows" && k != "start")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        url.set_query(None);
        if !kept.is_empty() {
            url.query_pairs_mut().extend_pairs(kept.iter());
        }

        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(cat) = &self.category {
            params.push(("cat", cat.clone()));
        }
        if let Some(proj) = &self.project {
            params.push(("proj", proj.clone()));
        }
        if let Some(item_type) = &self.item_type {
            params.push(("type", item_type.clone()));
        }
        if !self.attributes.is_empty() {
            params.push(("attributes", self.attributes.join(",")));
        }
        if !self.response_types.is_empty() {
            params.push(("response", self.response_types.join(",")));
        }
        if self.flatten_attributes {
            params.push(("flatten-attributes", "1".to_string()));
        }
        add_missing_params(&mut url, &params);

        url.query_pairs_mut()
            .append_pair("rows", &self.page_size.to_string())
            .append_pair("start", &start.to_string());
        Ok(url)
    }
}

/// Parses a URL, mapping failures to `ApiError::InvalidUrl`
pub fn parse_url(raw: &str) -> Result<Url, ApiError> {
    Url::parse(raw).map_err(|source| ApiError::InvalidUrl {
        url: raw.to_string(),
        source,
    })
}

/// Appends parameters whose key is not yet in the URL
///
/// `prop` may repeat, so it is only skipped when the exact key/value pair is
/// already there.
pub fn add_missing_params(url: &mut Url, params: &[(&str, String)]) {
    let existing: HashSet<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let existing_keys: HashSet<&str> = existing.iter().map(|(k, _)| k.as_str()).collect();

    let missing: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, v)| {
            if *k == "prop" {
                !existing.contains(&(k.to_string(), v.clone()))
            } else {
                !existing_keys.contains(k)
            }
        })
        .map(|(k, v)| (*k, v.as_str()))
        .collect();

    if !missing.is_empty() {
        url.query_pairs_mut().extend_pairs(missing);
    }
}

/// One page of an Open Context search response
#[derive(Debug, Deserialize)]
pub struct SearchPage {
    /// Size of the whole result set
    #[serde(rename = "totalResults")]
    pub total_results: u64,
    /// Zero-based offset of the first record on this page
    #[serde(rename = "startIndex", default)]
    pub start_index: u64,
    #[serde(rename = "itemsPerPage", default)]
    pub items_per_page: u64,
    /// Records on this page; may be absent only for empty result sets
    #[serde(rename = "oc-api:has-results")]
    pub results: Option<Vec<Record>>,
    /// Canonical URL of this page as reported by the server
    #[serde(default)]
    pub id: Option<String>,
}

impl SearchPage {
    /// Parses a page body, `url` only labels errors
    pub fn parse(body: &str, url: &str) -> Result<Self, ApiError> {
        let page: SearchPage = serde_json::from_str(body).map_err(|e| ApiError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if page.results.is_none() && page.total_results > 0 {
            return Err(ApiError::Parse {
                url: url.to_string(),
                reason: "missing `oc-api:has-results` for a non-empty result set".to_string(),
            });
        }
        Ok(page)
    }

    /// One-based number of the last record on this page, capped at the total
    pub fn last_record(&self) -> u64 {
        (self.start_index + self.items_per_page).min(self.total_results)
    }
}
