//! Standalone HTML map of NDVI per cell
//!
//! The page renders a deck.gl `H3HexagonLayer` over an optional Mapbox
//! basemap. Colors follow a brown-yellow-green ramp stretched between the
//! 5% and 95% quantiles of the data.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::grid::{GridIndexer, parse_cell};
use crate::table::{CELL_COLUMN, NDVI_COLUMN, float_values, read_table, string_values};

use super::types::ReportError;

const FILL_ALPHA: u8 = 190;
const LINE_COLOR: [u8; 4] = [40, 40, 40, 120];
const NO_DATA_COLOR: [u8; 4] = [0, 0, 0, 0];
const MAPBOX_STYLE: &str = "mapbox://styles/mapbox/light-v10";

/// Linear-interpolated quantile of sorted values, `q` in `[0, 1]`
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Value range mapped onto the color ramp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub vmin: f64,
    pub vmax: f64,
}

impl ColorScale {
    /// 5–95% quantile range of the finite values. Falls back to the full
    /// range when the quantiles coincide and to `[0, 1]` without data.
    pub fn from_values(values: &[f64]) -> Self {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Self { vmin: 0.0, vmax: 1.0 };
        }
        finite.sort_by(f64::total_cmp);
        let vmin = quantile(&finite, 0.05).unwrap_or(0.0);
        let vmax = quantile(&finite, 0.95).unwrap_or(1.0);
        if vmin == vmax {
            return Self {
                vmin: finite[0],
                vmax: finite[finite.len() - 1],
            };
        }
        Self { vmin, vmax }
    }

    /// Position of `value` on the ramp, clamped to `[0, 1]`
    pub fn normalize(&self, value: f64) -> f64 {
        ((value - self.vmin) / (self.vmax - self.vmin + 1e-12)).clamp(0.0, 1.0)
    }

    pub fn color(&self, value: f64) -> [u8; 4] {
        if !value.is_finite() {
            return NO_DATA_COLOR;
        }
        ramp(self.normalize(value))
    }
}

/// Brown (0) to yellow (0.5) to green (1)
pub fn ramp(t: f64) -> [u8; 4] {
    if t < 0.5 {
        let w = t / 0.5;
        [165, (191.0 * w) as u8, (38.0 - 38.0 * w) as u8, FILL_ALPHA]
    } else {
        let w = (t - 0.5) / 0.5;
        [
            (165.0 - 165.0 * w) as u8,
            (191.0 + (104.0 - 191.0) * w) as u8,
            (55.0 * w) as u8,
            FILL_ALPHA,
        ]
    }
}

/// Initial camera position
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewState {
    pub latitude: f64,
    pub longitude: f64,
    pub zoom: u8,
}

/// Center of the cell centers' extent, zoomed to fit its larger side.
pub fn compute_view(centers: &[(f64, f64)]) -> ViewState {
    if centers.is_empty() {
        return ViewState {
            latitude: 0.0,
            longitude: 0.0,
            zoom: 1,
        };
    }
    let (mut lat_min, mut lng_min) = (f64::INFINITY, f64::INFINITY);
    let (mut lat_max, mut lng_max) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(lat, lng) in centers {
        lat_min = lat_min.min(lat);
        lat_max = lat_max.max(lat);
        lng_min = lng_min.min(lng);
        lng_max = lng_max.max(lng);
    }
    let span = (lat_max - lat_min).max(lng_max - lng_min);
    let zoom = if span < 0.01 {
        14
    } else if span < 0.03 {
        12
    } else if span < 0.1 {
        10
    } else {
        8
    };
    ViewState {
        latitude: (lat_min + lat_max) / 2.0,
        longitude: (lng_min + lng_max) / 2.0,
        zoom,
    }
}

#[derive(Debug, Clone)]
pub struct MapOptions {
    pub opacity: f64,
    /// Extrusion factor applied to NDVI; 0 draws flat hexagons
    pub elevation: f64,
    /// Map height in pixels
    pub height: u32,
    pub mapbox_key: Option<String>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            opacity: 0.85,
            elevation: 0.0,
            height: 720,
            mapbox_key: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct HexDatum {
    cell_h3: String,
    ndvi_mean: Option<f64>,
    color: [u8; 4],
}

/// Summary of a rendered map
#[derive(Debug, Clone, PartialEq)]
pub struct MapSummary {
    pub cells: usize,
    pub scale: ColorScale,
    pub mapbox: bool,
}

/// Mean value per distinct cell, sorted by cell id
pub fn mean_per_cell(cells: &[Option<String>], values: &[Option<f64>]) -> Vec<(String, f64)> {
    let mut sums: BTreeMap<&str, (f64, u32)> = BTreeMap::new();
    for (cell, value) in cells.iter().zip(values) {
        let Some(cell) = cell else { continue };
        let entry = sums.entry(cell.as_str()).or_insert((0.0, 0));
        if let Some(v) = value.filter(|v| v.is_finite()) {
            entry.0 += v;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(cell, (sum, n))| {
            let mean = if n > 0 { sum / f64::from(n) } else { f64::NAN };
            (cell.to_string(), mean)
        })
        .collect()
}

fn script_json<T: Serialize>(value: &T) -> Result<String, ReportError> {
    // keep "</script>" out of inline scripts
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// Render the HTML page for per-cell means.
pub fn render_html(
    indexer: &dyn GridIndexer,
    cells: &[(String, f64)],
    options: &MapOptions,
) -> Result<(String, MapSummary), ReportError> {
    let values: Vec<f64> = cells.iter().map(|(_, v)| *v).collect();
    let scale = ColorScale::from_values(&values);

    let mut centers = Vec::with_capacity(cells.len());
    let mut data = Vec::with_capacity(cells.len());
    for (cell, value) in cells {
        let center = indexer.cell_to_latlng(parse_cell(cell)?);
        centers.push((center.lat(), center.lng()));
        data.push(HexDatum {
            cell_h3: cell.clone(),
            ndvi_mean: value.is_finite().then_some(*value),
            color: scale.color(*value),
        });
    }
    let view = compute_view(&centers);

    let mapbox = options.mapbox_key.as_deref().filter(|k| !k.is_empty());
    let (basemap_head, basemap_setup, map_style) = match mapbox {
        Some(key) => (
            concat!(
                r#"<script src="https://api.mapbox.com/mapbox-gl-js/v1.13.3/mapbox-gl.js"></script>"#,
                "\n",
                r#"<link href="https://api.mapbox.com/mapbox-gl-js/v1.13.3/mapbox-gl.css" rel="stylesheet" />"#
            ),
            format!("mapboxgl.accessToken = {};", script_json(&key)?),
            script_json(&MAPBOX_STYLE)?,
        ),
        None => ("", String::new(), "null".to_string()),
    };

    let description = format!(
        "NDVI 5–95% quantiles | min={:.3} | max={:.3}",
        scale.vmin, scale.vmax
    );

    let html = PAGE_TEMPLATE
        .replace("{{BASEMAP_HEAD}}", basemap_head)
        .replace("{{BASEMAP_SETUP}}", &basemap_setup)
        .replace("{{MAP_STYLE}}", &map_style)
        .replace("{{HEIGHT}}", &options.height.to_string())
        .replace("{{DESCRIPTION}}", &description)
        .replace("{{VIEW}}", &script_json(&view)?)
        .replace("{{OPACITY}}", &options.opacity.to_string())
        .replace("{{ELEVATION}}", &options.elevation.max(0.0).to_string())
        .replace("{{LINE_COLOR}}", &script_json(&LINE_COLOR)?)
        .replace("{{DATA}}", &script_json(&data)?);

    Ok((
        html,
        MapSummary {
            cells: cells.len(),
            scale,
            mapbox: mapbox.is_some(),
        },
    ))
}

/// Read a joined table and write the HTML map.
pub fn render_map(
    indexer: &dyn GridIndexer,
    input: &Path,
    output: &Path,
    options: &MapOptions,
) -> Result<MapSummary, ReportError> {
    let batch = read_table(input, &[CELL_COLUMN, NDVI_COLUMN])?;
    let cells = mean_per_cell(
        &string_values(&batch, CELL_COLUMN)?,
        &float_values(&batch, NDVI_COLUMN)?,
    );
    if cells.is_empty() {
        return Err(ReportError::EmptyInput(input.display().to_string()));
    }

    let (html, summary) = render_html(indexer, &cells, options)?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, html)?;
    info!(
        "Map saved to {:?} ({} cells). Mapbox={}",
        output,
        summary.cells,
        if summary.mapbox { "ON" } else { "OFF" }
    );
    Ok(summary)
}

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8" />
<title>NDVI by H3 cell</title>
<script src="https://unpkg.com/h3-js@4.1.0/dist/h3-js.umd.js"></script>
<script src="https://unpkg.com/deck.gl@9.0.38/dist.min.js"></script>
{{BASEMAP_HEAD}}
<style>
  body { margin: 0; font-family: Helvetica, Arial, sans-serif; }
  #map { position: relative; width: 100%; height: {{HEIGHT}}px; }
  #description { padding: 6px 10px; font-size: 13px; color: #333; }
</style>
</head>
<body>
<div id="map"></div>
<div id="description">{{DESCRIPTION}}</div>
<script>
  {{BASEMAP_SETUP}}
  const data = {{DATA}};
  const elevation = {{ELEVATION}};
  const layer = new deck.H3HexagonLayer({
    id: "ndvi-h3",
    data,
    pickable: true,
    autoHighlight: true,
    stroked: true,
    lineWidthMinPixels: 1,
    extruded: elevation > 0,
    opacity: {{OPACITY}},
    getHexagon: d => d.cell_h3,
    getFillColor: d => d.color,
    getLineColor: {{LINE_COLOR}},
    getElevation: d => (d.ndvi_mean || 0) * elevation,
  });
  new deck.DeckGL({
    container: "map",
    mapStyle: {{MAP_STYLE}},
    initialViewState: {{VIEW}},
    controller: true,
    layers: [layer],
    getTooltip: ({object}) => object && {
      html: `<b>H3:</b> ${object.cell_h3}<br/><b>NDVI:</b> ${object.ndvi_mean}`,
      style: {backgroundColor: "rgba(30,30,30,0.9)", color: "white"},
    },
  });
</script>
</body>
</html>
"#;
