//! Reports over the cell tables: joins, hexagon GeoJSON and HTML maps

pub mod hex_geojson;
pub mod join;
pub mod map;
mod types;

pub use hex_geojson::{cell_polygon, hex_features, write_hex_geojson};
pub use join::{
    Aggregation, GroupStats, NdviStats, QueryOptions, QueryReport, aggregate_batch, aggregate_by,
    agg_output_path, join_tables, load_filter_cells, run_query,
};
pub use map::{ColorScale, MapOptions, MapSummary, ViewState, compute_view, render_html, render_map};
pub use types::ReportError;
