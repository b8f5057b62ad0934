//! End-to-end NDVI scene download

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::raster::read_geotiff;

use super::process::write_products;
use super::search::{find_scene, relaxation_ladder};
use super::stac::{NIR_ASSET, RED_ASSET, SceneCatalog};
use super::types::{DownloadRequest, DownloadSummary, ImageryError, ProductPaths};

/// Cached location of a downloaded asset
fn asset_cache_path(out_dir: &Path, item_id: &str, asset: &str) -> PathBuf {
    out_dir.join("cache").join(format!("{}_{}.tif", item_id, asset))
}

async fn fetch_cached(
    catalog: &dyn SceneCatalog,
    href: &str,
    dest: &Path,
) -> Result<(), ImageryError> {
    if tokio::fs::try_exists(dest).await? {
        debug!("Using cached asset {:?}", dest);
        return Ok(());
    }
    let signed = catalog.sign(href).await?;
    catalog.fetch(&signed, dest).await?;
    Ok(())
}

/// Find a scene, download its red and NIR bands and write the cropped
/// red, NIR and NDVI GeoTIFFs into `request.out_dir`.
pub async fn download_ndvi(
    catalog: &dyn SceneCatalog,
    request: &DownloadRequest,
) -> Result<DownloadSummary, ImageryError> {
    let start = Instant::now();
    let aoi = request.bbox;
    info!(
        "bbox(WGS84)={:?} date={} cloud<{}%",
        aoi, request.datetime, request.max_cloud
    );
    tokio::fs::create_dir_all(&request.out_dir).await?;

    let ladder = relaxation_ladder(request.max_cloud, &request.datetime);
    let selection = find_scene(catalog, &aoi, &ladder).await?;
    let item = &selection.item;

    let red_path = asset_cache_path(&request.out_dir, &item.id, RED_ASSET);
    let nir_path = asset_cache_path(&request.out_dir, &item.id, NIR_ASSET);
    fetch_cached(catalog, item.asset_href(RED_ASSET)?, &red_path).await?;
    fetch_cached(catalog, item.asset_href(NIR_ASSET)?, &nir_path).await?;

    let paths = ProductPaths::in_dir(&request.out_dir);
    let scene_id = item.id.clone();
    let intersection = selection.intersection;
    let out = paths.clone();
    let window = tokio::task::spawn_blocking(move || -> Result<_, ImageryError> {
        let red = read_geotiff(&red_path)?;
        let nir = read_geotiff(&nir_path)?;
        write_products(&scene_id, &red, &nir, &intersection, &out)
    })
    .await
    .map_err(|e| ImageryError::IoError(std::io::Error::other(e)))??;

    Ok(DownloadSummary {
        bbox_wgs84: [aoi.min_lng, aoi.min_lat, aoi.max_lng, aoi.max_lat],
        date: request.datetime.clone(),
        cloud_lt: request.max_cloud,
        chosen_item: item.id.clone(),
        cloud_cover: item.properties.cloud_cover,
        intersection: [
            intersection.min_lng,
            intersection.min_lat,
            intersection.max_lng,
            intersection.max_lat,
        ],
        window: [window.col, window.row, window.width, window.height],
        outputs: paths,
        seconds: (start.elapsed().as_secs_f64() * 10.0).round() / 10.0,
    })
}
