//! Scene search with progressively relaxed filters

use tracing::info;

use crate::grid::BoundingBox;

use super::stac::{SceneCatalog, SearchRequest, StacItem};
use super::types::{ImageryError, SearchAttempt};

/// Filters tried in order until a usable scene turns up: the requested
/// window and cloud limit, then looser clouds, then wider date ranges.
pub fn relaxation_ladder(max_cloud: f64, datetime: &str) -> Vec<SearchAttempt> {
    let attempt = |max_cloud: f64, datetime: &str| SearchAttempt {
        max_cloud,
        datetime: datetime.to_string(),
    };
    vec![
        attempt(max_cloud, datetime),
        attempt(30.0, datetime),
        attempt(50.0, datetime),
        attempt(50.0, "2023-01-01/2023-12-31"),
        attempt(70.0, "2022-01-01/2024-12-31"),
    ]
}

/// A scene together with the part of the area of interest it covers
#[derive(Debug, Clone)]
pub struct SceneSelection {
    pub item: StacItem,
    pub intersection: BoundingBox,
    pub attempt: SearchAttempt,
}

/// Least cloudy item whose footprint overlaps `aoi` with positive area.
pub fn select_scene(mut items: Vec<StacItem>, aoi: &BoundingBox) -> Option<(StacItem, BoundingBox)> {
    items.sort_by(|a, b| a.cloud_cover().total_cmp(&b.cloud_cover()));
    items.into_iter().find_map(|item| {
        let intersection = item.footprint()?.intersection(aoi)?;
        Some((item, intersection))
    })
}

/// Walk the ladder until a search yields a scene overlapping `aoi`.
pub async fn find_scene(
    catalog: &dyn SceneCatalog,
    aoi: &BoundingBox,
    ladder: &[SearchAttempt],
) -> Result<SceneSelection, ImageryError> {
    for attempt in ladder {
        info!("search: cloud<{}% date={}", attempt.max_cloud, attempt.datetime);
        let items = catalog
            .search(&SearchRequest::sentinel2(aoi, attempt))
            .await?;
        info!("  found={}", items.len());
        if let Some((item, intersection)) = select_scene(items, aoi) {
            info!(
                "  chosen id={} cloud={} inter={:?}",
                item.id,
                item.cloud_cover(),
                intersection
            );
            return Ok(SceneSelection {
                item,
                intersection,
                attempt: attempt.clone(),
            });
        }
    }
    Err(ImageryError::NoScene)
}
