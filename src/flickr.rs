//! Client for the Flickr photo search API.
//!
//! A search is restricted to the bounding box around a pin. The API reports
//! failures through a `stat` field in the JSON envelope rather than through
//! HTTP status codes, so every decoded response is checked for it before the
//! `photos` payload is read.
//!
//! HTTP goes through the [`HttpTransport`] trait. The production transport is
//! a `reqwest::Client`; tests substitute a local mock server or a fake.

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use url::Url;

use crate::error::{Result, TouristError};
use crate::geo::{BoundingBox, Coordinate, SearchWindow};

/// Default REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.flickr.com/services/rest/";
/// Search method name
pub const SEARCH_METHOD: &str = "flickr.photos.search";
/// Extra field requested for every result: the medium-size image URL
pub const MEDIUM_URL_EXTRA: &str = "url_m";
/// Default number of results per page
pub const DEFAULT_PER_PAGE: u32 = 100;
/// Default safe search level (1 = safe)
pub const DEFAULT_SAFE_SEARCH: u8 = 1;

/// Minimal HTTP GET abstraction used by the search client and image fetcher
pub trait HttpTransport: Send + Sync {
    /// Fetches `url` and returns the body of a 2xx response.
    fn get(&self, url: &Url) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

impl HttpTransport for reqwest::Client {
    async fn get(&self, url: &Url) -> Result<Vec<u8>> {
        let response = reqwest::Client::get(self, url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TouristError::Transport(format!(
                "GET {} returned HTTP {}",
                url.path(),
                status
            )));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// One photo entry extracted from a search result page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoDescriptor {
    pub title: Option<String>,
    /// URL of the medium-size image
    #[serde(rename = "url_m")]
    pub remote_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    photos: PhotosPage,
}

#[derive(Debug, Deserialize)]
struct PhotosPage {
    pages: u32,
    photo: Option<Vec<PhotoDescriptor>>,
}

/// Fixed parameters for every search request
#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub base_url: Url,
    pub api_key: String,
    pub per_page: u32,
    pub safe_search: u8,
    pub window: SearchWindow,
}

impl SearchSettings {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        Self {
            base_url,
            api_key: api_key.into(),
            per_page: DEFAULT_PER_PAGE,
            safe_search: DEFAULT_SAFE_SEARCH,
            window: SearchWindow::default(),
        }
    }
}

/// Photo search client
#[derive(Debug, Clone)]
pub struct FlickrClient<T> {
    transport: T,
    settings: SearchSettings,
}

impl<T: HttpTransport> FlickrClient<T> {
    pub fn new(transport: T, settings: SearchSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Search region for a location, using the configured window
    pub fn region_for(&self, location: Coordinate) -> BoundingBox {
        BoundingBox::around(location, &self.settings.window)
    }

    /// Builds the search URL for `region`, optionally for a specific page
    pub fn search_url(&self, region: &BoundingBox, page: Option<u32>) -> Url {
        let bbox = region.to_string();
        let per_page = self.settings.per_page.to_string();
        let safe_search = self.settings.safe_search.to_string();

        let mut url = self.settings.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("method", SEARCH_METHOD)
                .append_pair("api_key", &self.settings.api_key)
                .append_pair("bbox", &bbox)
                .append_pair("format", "json")
                .append_pair("nojsoncallback", "1")
                .append_pair("extras", MEDIUM_URL_EXTRA)
                .append_pair("per_page", &per_page)
                .append_pair("safe_search", &safe_search);
            if let Some(page) = page {
                query.append_pair("page", &page.to_string());
            }
        }
        url
    }

    /// Reports how many result pages exist for `region`
    pub async fn page_count(&self, region: &BoundingBox) -> Result<u32> {
        let envelope = self.request(self.search_url(region, None)).await?;
        debug!("Search in {} reports {} pages", region, envelope.photos.pages);
        Ok(envelope.photos.pages)
    }

    /// Fetches the descriptors on one page of results for `region`
    pub async fn fetch_page(&self, region: &BoundingBox, page: u32) -> Result<Vec<PhotoDescriptor>> {
        let envelope = self.request(self.search_url(region, Some(page))).await?;
        envelope.photos.photo.ok_or_else(|| {
            TouristError::ResponseFormat("search response is missing photos.photo".to_string())
        })
    }

    /// Fetches one uniformly random page of results around `location`.
    ///
    /// A search reporting zero pages yields an empty list without a second
    /// request. Results are not capped here.
    pub async fn search_at_location(&self, location: Coordinate) -> Result<Vec<PhotoDescriptor>> {
        let region = self.region_for(location);
        let total_pages = self.page_count(&region).await?;

        if total_pages == 0 {
            info!("No photos found around {location}");
            return Ok(Vec::new());
        }

        let page = rand::thread_rng().gen_range(1..=total_pages);
        info!("Fetching page {page} of {total_pages} around {location}");

        self.fetch_page(&region, page).await
    }

    async fn request(&self, url: Url) -> Result<SearchEnvelope> {
        debug!("GET {}", redact_api_key(&url));
        let body = self.transport.get(&url).await?;
        parse_envelope(&body)
    }
}

/// Decodes a search response, mapping a `stat` failure envelope to `ApiStatus`
fn parse_envelope(body: &[u8]) -> Result<SearchEnvelope> {
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| TouristError::ResponseFormat(format!("invalid JSON: {e}")))?;

    // Any `stat` other than the string "ok", whatever its JSON type, is a failure
    if let Some(stat) = json.get("stat") {
        if stat.as_str() != Some("ok") {
            let message = match json.get("message").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => stat.as_str().map_or_else(|| stat.to_string(), str::to_string),
            };
            return Err(TouristError::ApiStatus {
                code: json.get("code").and_then(Value::as_i64),
                message,
            });
        }
    }

    serde_json::from_value(json).map_err(|e| TouristError::ResponseFormat(e.to_string()))
}

fn redact_api_key(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_key" { "***".into() } else { v };
            (k.into_owned(), v.into_owned())
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}
