//! Offline pipeline: ingestion, imagery download, joins and maps

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use h3o::Resolution;
use hexcell_server::grid::{H3oIndexer, parse_resolution};
use hexcell_server::imagery::{
    DownloadRequest, ImageryError, PLANETARY_COMPUTER_STAC, StacCatalog, download_ndvi, parse_bbox,
};
use hexcell_server::ingest::{
    RasterIngestOptions, RasterSource, VectorIngestOptions, ingest_raster, ingest_vector,
};
use hexcell_server::report::{MapOptions, QueryOptions, render_map, run_query, write_hex_geojson};
use hexcell_server::table::{raster_batch, write_parquet};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hexcell-tools", version, about = "NDVI and vector pipelines over the H3 grid")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate NDVI from a GeoTIFF into a per-cell Parquet table
    IngestRaster {
        /// Multi-band GeoTIFF holding red and NIR
        #[arg(long = "in", conflicts_with_all = ["red", "nir"], required_unless_present_all = ["red", "nir"])]
        input: Option<PathBuf>,
        /// Single-band red GeoTIFF
        #[arg(long, requires = "nir")]
        red: Option<PathBuf>,
        /// Single-band NIR GeoTIFF
        #[arg(long, requires = "red")]
        nir: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        red_band: usize,
        #[arg(long, default_value_t = 2)]
        nir_band: usize,
        #[arg(long, default_value_t = 9)]
        res: i64,
        /// Pixel stride
        #[arg(long, default_value_t = 4)]
        step: usize,
        /// Soft cap on visited pixels; raises the stride on large rasters
        #[arg(long, default_value_t = 400_000)]
        max_pixels: usize,
        #[arg(long, default_value = "data/raster_h3.parquet")]
        out: PathBuf,
    },

    /// Convert GeoJSON features into a per-cell Parquet table
    IngestVector {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long, default_value = "data/vector_h3.parquet")]
        out: PathBuf,
        #[arg(long, default_value_t = 9)]
        res: i64,
        #[arg(long, default_value_t = 50.0, value_parser = positive_meters)]
        line_step_meters: f64,
        #[arg(long)]
        max_features: Option<usize>,
    },

    /// Download a Sentinel-2 scene and write red, NIR and NDVI GeoTIFFs
    DownloadNdvi {
        /// "min_lng min_lat max_lng max_lat"
        #[arg(long, env = "MG_BBOX", default_value = "-51 -23.5 -39.5 -14")]
        bbox: String,
        #[arg(long, env = "NDVI_DATE", default_value = "2023-07-01/2023-08-31")]
        date: String,
        /// Maximum cloud cover in percent
        #[arg(long, env = "NDVI_MAX_CLOUD", default_value_t = 20.0)]
        max_cloud: f64,
        /// STAC API root
        #[arg(long, env = "NDVI_CATALOG", default_value = PLANETARY_COMPUTER_STAC)]
        catalog: String,
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },

    /// Join vector and raster tables on cell_h3 and report NDVI statistics
    Query {
        #[arg(long, default_value = "data/vector_h3.parquet")]
        vector: PathBuf,
        #[arg(long, default_value = "data/raster_h3.parquet")]
        raster: PathBuf,
        #[arg(long, default_value = "reports/joined_h3.parquet")]
        out: PathBuf,
        #[arg(long)]
        out_csv: Option<PathBuf>,
        /// JSON file with a list of cells to keep
        #[arg(long)]
        filter_cells: Option<PathBuf>,
        /// Vector column to aggregate by
        #[arg(long)]
        agg_by: Option<String>,
        #[arg(long)]
        verbose: bool,
    },

    /// Write a hexagon FeatureCollection from a cell table
    ToGeojson {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "ndvi_mean")]
        ndvi_col: String,
    },

    /// Render an HTML map of NDVI per cell
    RenderMap {
        #[arg(long = "in", default_value = "reports/joined_h3.parquet")]
        input: PathBuf,
        #[arg(long, default_value = "reports/map_ndvi.html")]
        out: PathBuf,
        #[arg(long, default_value_t = 0.85)]
        opacity: f64,
        #[arg(long, default_value_t = 0.0)]
        elevation: f64,
        #[arg(long, default_value_t = 720)]
        height: u32,
        #[arg(long, env = "MAPBOX_API_KEY")]
        mapbox_key: Option<String>,
    },
}

fn positive_meters(text: &str) -> Result<f64, String> {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(v) => Err(format!("must be a positive number of meters, got {}", v)),
        Err(e) => Err(e.to_string()),
    }
}

fn resolution(res: i64) -> Result<Resolution> {
    parse_resolution(res).context("--res must be between 0 and 15")
}

fn fmt_stat(v: Option<f64>) -> String {
    v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "nan".to_string())
}

async fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::IngestRaster {
            input,
            red,
            nir,
            red_band,
            nir_band,
            res,
            step,
            max_pixels,
            out,
        } => {
            let source = match (input, red, nir) {
                (Some(path), _, _) => RasterSource::Stacked(path),
                (None, Some(red), Some(nir)) => RasterSource::Separate { red, nir },
                _ => anyhow::bail!("pass --in, or both --red and --nir"),
            };
            let options = RasterIngestOptions {
                red_band,
                nir_band,
                resolution: resolution(res)?,
                step,
                max_pixels,
            };
            let rows = tokio::task::spawn_blocking(move || {
                ingest_raster(&H3oIndexer::new(), &source, &options)
            })
            .await??;
            write_parquet(&out, &raster_batch(&rows)?)?;
            println!("Saved {} ({} cells)", out.display(), rows.len());
        }

        Command::IngestVector {
            input,
            out,
            res,
            line_step_meters,
            max_features,
        } => {
            let options = VectorIngestOptions {
                resolution: resolution(res)?,
                line_step_meters,
                max_features,
                ..Default::default()
            };
            let batch = tokio::task::spawn_blocking(move || {
                ingest_vector(&H3oIndexer::new(), &input, &options)
            })
            .await??;
            write_parquet(&out, &batch)?;
            println!("Saved {} ({} rows)", out.display(), batch.num_rows());
        }

        Command::DownloadNdvi {
            bbox,
            date,
            max_cloud,
            catalog,
            out_dir,
        } => {
            let request = DownloadRequest {
                bbox: parse_bbox(&bbox)?,
                datetime: date,
                max_cloud,
                out_dir,
            };
            let catalog = StacCatalog::new(&catalog)?;
            let summary = download_ndvi(&catalog, &request).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Query {
            vector,
            raster,
            out,
            out_csv,
            filter_cells,
            agg_by,
            verbose,
        } => {
            let options = QueryOptions {
                vector,
                raster,
                out,
                out_csv,
                filter_cells,
                agg_by,
            };
            let Some(report) = run_query(&options)? else {
                println!("No rows after the join.");
                return Ok(ExitCode::SUCCESS);
            };
            println!("Rows in join: {}", report.rows);
            println!(
                "NDVI mean: {}  |  min: {}  |  max: {}",
                fmt_stat(report.ndvi.mean),
                fmt_stat(report.ndvi.min),
                fmt_stat(report.ndvi.max)
            );
            if let Some(agg) = &report.aggregation {
                println!("\nAggregated by {}", agg.column);
                println!("{:<24} {:>8} {:>8} {:>8} {:>8}", agg.column, "count", "mean", "min", "max");
                for group in agg.groups.iter().take(20) {
                    println!(
                        "{:<24} {:>8} {:>8} {:>8} {:>8}",
                        group.key,
                        group.stats.count,
                        fmt_stat(group.stats.mean),
                        fmt_stat(group.stats.min),
                        fmt_stat(group.stats.max)
                    );
                }
            }
            if verbose {
                let csv = options
                    .out_csv
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(no CSV)".to_string());
                println!("Saved: {}  |  {}", options.out.display(), csv);
            }
        }

        Command::ToGeojson {
            input,
            out,
            ndvi_col,
        } => {
            let count = write_hex_geojson(&H3oIndexer::new(), &input, &out, &ndvi_col)?;
            println!("GeoJSON saved: {} ({} hex)", out.display(), count);
        }

        Command::RenderMap {
            input,
            out,
            opacity,
            elevation,
            height,
            mapbox_key,
        } => {
            let options = MapOptions {
                opacity,
                elevation,
                height,
                mapbox_key,
            };
            let summary = render_map(&H3oIndexer::new(), &input, &out, &options)?;
            println!(
                "Map saved to {} ({} cells). Mapbox={}. NDVI 5-95% range: {:.3} .. {:.3}",
                out.display(),
                summary.cells,
                if summary.mapbox { "ON" } else { "OFF" },
                summary.scale.vmin,
                summary.scale.vmax
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hexcell=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            let code = e
                .downcast_ref::<ImageryError>()
                .map(ImageryError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_meters() {
        assert_eq!(positive_meters("50"), Ok(50.0));
        assert!(positive_meters("0").is_err());
        assert!(positive_meters("-3").is_err());
        assert!(positive_meters("NaN").is_err());
        assert!(positive_meters("far").is_err());
    }

    #[test]
    fn test_ingest_vector_rejects_zero_step() {
        let parsed = Cli::try_parse_from([
            "hexcell-tools",
            "ingest-vector",
            "--in",
            "roads.geojson",
            "--line-step-meters",
            "0",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
