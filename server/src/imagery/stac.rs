//! STAC catalog access
//!
//! `SceneCatalog` is the seam between scene selection and the network;
//! `StacCatalog` implements it over HTTP with reqwest.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::grid::BoundingBox;

use super::types::{ImageryError, SearchAttempt};

pub const PLANETARY_COMPUTER_STAC: &str = "https://planetarycomputer.microsoft.com/api/stac/v1";
const PLANETARY_COMPUTER_SIGN: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

pub const SENTINEL2_COLLECTION: &str = "sentinel-2-l2a";
/// Red band, 10 m
pub const RED_ASSET: &str = "B04";
/// Near-infrared band, 10 m
pub const NIR_ASSET: &str = "B08";

const SEARCH_LIMIT: u32 = 50;
/// Deadline for search and signing calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(45);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Longest pause between two reads; asset downloads have no total deadline
const READ_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct SortBy {
    pub field: String,
    pub direction: String,
}

/// Body of a STAC `POST /search`
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub collections: Vec<String>,
    pub bbox: [f64; 4],
    pub datetime: String,
    pub query: serde_json::Value,
    pub limit: u32,
    pub sortby: Vec<SortBy>,
}

impl SearchRequest {
    /// Sentinel-2 L2A search for one rung of the ladder, least cloudy first
    pub fn sentinel2(bbox: &BoundingBox, attempt: &SearchAttempt) -> Self {
        Self {
            collections: vec![SENTINEL2_COLLECTION.to_string()],
            bbox: [bbox.min_lng, bbox.min_lat, bbox.max_lng, bbox.max_lat],
            datetime: attempt.datetime.clone(),
            query: json!({ "eo:cloud_cover": { "lt": attempt.max_cloud } }),
            limit: SEARCH_LIMIT,
            sortby: vec![SortBy {
                field: "properties.eo:cloud_cover".to_string(),
                direction: "asc".to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemProperties {
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover", default)]
    pub cloud_cover: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacAsset {
    pub href: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacItem {
    pub id: String,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub properties: ItemProperties,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
}

impl StacItem {
    /// Footprint bounds in WGS84; accepts 2D and 3D STAC bboxes
    pub fn footprint(&self) -> Option<BoundingBox> {
        let b = self.bbox.as_deref()?;
        let (min_lng, min_lat, max_lng, max_lat) = match b {
            [a, b, c, d] => (*a, *b, *c, *d),
            [a, b, _, d, e, _] => (*a, *b, *d, *e),
            _ => return None,
        };
        Some(BoundingBox {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        })
    }

    /// Cloud cover in percent; unknown counts as fully cloudy
    pub fn cloud_cover(&self) -> f64 {
        self.properties.cloud_cover.unwrap_or(100.0)
    }

    pub fn asset_href(&self, key: &str) -> Result<&str, ImageryError> {
        self.assets
            .get(key)
            .map(|a| a.href.as_str())
            .ok_or_else(|| ImageryError::MissingAsset {
                item: self.id.clone(),
                asset: key.to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct ItemCollection {
    #[serde(default)]
    features: Vec<StacItem>,
}

#[derive(Debug, Deserialize)]
struct SignedHref {
    href: String,
}

/// Source of scenes and their assets
#[async_trait]
pub trait SceneCatalog: Send + Sync {
    /// Run one search and return the matching items
    async fn search(&self, request: &SearchRequest) -> Result<Vec<StacItem>, ImageryError>;

    /// Turn an asset href into one that can be fetched
    async fn sign(&self, href: &str) -> Result<String, ImageryError> {
        Ok(href.to_string())
    }

    /// Download an asset to `dest`, returning the number of bytes written
    async fn fetch(&self, href: &str, dest: &Path) -> Result<u64, ImageryError>;
}

/// STAC API client over HTTP
pub struct StacCatalog {
    client: reqwest::Client,
    base_url: String,
    sign_url: Option<String>,
}

impl StacCatalog {
    /// Client for any STAC API. Planetary Computer URLs get SAS signing.
    pub fn new(base_url: &str) -> Result<Self, ImageryError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .user_agent(concat!("hexcell/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let sign_url = base_url
            .contains("planetarycomputer.microsoft.com")
            .then(|| PLANETARY_COMPUTER_SIGN.to_string());
        Ok(Self {
            client,
            base_url,
            sign_url,
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ImageryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ImageryError::Catalog {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SceneCatalog for StacCatalog {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<StacItem>, ImageryError> {
        let url = format!("{}/search", self.base_url);
        debug!("POST {} datetime={}", url, request.datetime);
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(request)
            .send()
            .await?;
        let collection: ItemCollection = Self::check(response).await?.json().await?;
        Ok(collection.features)
    }

    async fn sign(&self, href: &str) -> Result<String, ImageryError> {
        let Some(sign_url) = &self.sign_url else {
            return Ok(href.to_string());
        };
        let response = self
            .client
            .get(sign_url)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("href", href)])
            .send()
            .await?;
        let signed: SignedHref = Self::check(response).await?.json().await?;
        Ok(signed.href)
    }

    async fn fetch(&self, href: &str, dest: &Path) -> Result<u64, ImageryError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // assets are large; stream to a partial file and rename when complete
        let partial = dest.with_extension("part");
        let response = Self::check(self.client.get(href).send().await?).await?;
        let written = match write_stream(response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&partial).await {
                    debug!("Could not remove {:?}: {}", partial, rm);
                }
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, dest).await?;
        info!("Downloaded {} bytes to {:?}", written, dest);
        Ok(written)
    }
}

async fn write_stream(response: reqwest::Response, path: &Path) -> Result<u64, ImageryError> {
    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_body() {
        let bbox = BoundingBox {
            min_lng: -51.0,
            min_lat: -23.5,
            max_lng: -39.5,
            max_lat: -14.0,
        };
        let attempt = SearchAttempt {
            max_cloud: 20.0,
            datetime: "2023-07-01/2023-08-31".to_string(),
        };
        let body = serde_json::to_value(SearchRequest::sentinel2(&bbox, &attempt)).unwrap();
        assert_eq!(body["collections"][0], "sentinel-2-l2a");
        assert_eq!(body["bbox"][0], -51.0);
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 20.0);
        assert_eq!(body["limit"], 50);
    }

    #[test]
    fn test_item_parsing() {
        let item: StacItem = serde_json::from_value(json!({
            "id": "S2A_TEST",
            "bbox": [-45.0, -20.0, 0.0, -44.0, -19.0, 0.0],
            "properties": {"datetime": "2023-07-10T13:00:00Z", "eo:cloud_cover": 3.5},
            "assets": {"B04": {"href": "https://example.test/B04.tif"}}
        }))
        .unwrap();
        let fp = item.footprint().unwrap();
        assert_eq!((fp.min_lng, fp.min_lat, fp.max_lng, fp.max_lat), (-45.0, -20.0, -44.0, -19.0));
        assert_eq!(item.cloud_cover(), 3.5);
        assert_eq!(item.asset_href(RED_ASSET).unwrap(), "https://example.test/B04.tif");
        assert!(matches!(
            item.asset_href(NIR_ASSET),
            Err(ImageryError::MissingAsset { .. })
        ));
    }

    #[test]
    fn test_item_defaults() {
        let item: StacItem = serde_json::from_value(json!({"id": "bare"})).unwrap();
        assert!(item.footprint().is_none());
        assert_eq!(item.cloud_cover(), 100.0);
    }

    /// Serve one raw HTTP response on a loopback port, then hang up
    async fn serve_once(response: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_writes_complete_asset() {
        let base = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nbands").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("cache").join("scene_B04.tif");

        let catalog = StacCatalog::new(&base).unwrap();
        let written = catalog
            .fetch(&format!("{}/B04.tif", base), &dest)
            .await
            .unwrap();
        assert_eq!(written, 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"bands");
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_fetch_truncated_body_leaves_no_partial_file() {
        let base = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\nConnection: close\r\n\r\nshort").await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("scene_B08.tif");

        let catalog = StacCatalog::new(&base).unwrap();
        let result = catalog.fetch(&format!("{}/B08.tif", base), &dest).await;
        assert!(matches!(result, Err(ImageryError::Http(_))));
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[test]
    fn test_signing_only_for_planetary_computer() {
        assert!(StacCatalog::new(PLANETARY_COMPUTER_STAC).unwrap().sign_url.is_some());
        assert!(StacCatalog::new("https://earth-search.example/v1/").unwrap().sign_url.is_none());
    }
}
