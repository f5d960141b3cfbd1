//! `datavis`: compute a DataView over a GeoJSON file and print it as JSON

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dv_data::{GeoJsonSource, InMemoryLayer, Source, Target};
use dv_views::DataView;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::RunConfig;

/// Compute a DataView over a GeoJSON file and print the result as JSON
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON FeatureCollection to aggregate
    data: PathBuf,

    /// Run configuration: dataview options, viewport and filters
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let data_path = args.data;
    let config = RunConfig::load(&args.config)?;

    let text = std::fs::read_to_string(&data_path)
        .with_context(|| format!("Failed to read {}", data_path.display()))?;
    let data = GeoJsonSource::parse(&text).with_context(|| format!("Invalid GeoJSON {}", data_path.display()))?;
    info!("Loaded {} features from {}", data.len(), data_path.display());

    let target = match config.viewport {
        Some(viewport) => {
            let layer = Arc::new(InMemoryLayer::new("features", data));
            layer.set_viewport(viewport);
            Target::Layer(layer)
        }
        None => Target::Source(Source::GeoJson(data)),
    };

    // No Maps API client is bundled, so only local dataviews can run here
    let dataview = DataView::new(&target, config.dataview, None)?;
    for (id, filter) in config.filters {
        dataview.add_filter(id, filter);
    }

    let result = dataview.get_data(&config.excluded_filters).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_paths() {
        let args = Args::try_parse_from(["datavis", "places.geojson", "dataview.json"]).unwrap();
        assert_eq!(args.data, PathBuf::from("places.geojson"));
        assert_eq!(args.config, PathBuf::from("dataview.json"));

        assert!(Args::try_parse_from(["datavis", "places.geojson"]).is_err());
    }
}
