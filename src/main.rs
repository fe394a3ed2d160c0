use clap::Parser;
use geo_etl::app::{geocoding_from_config, pipelines::table};
use geo_etl::core::{ConfigProvider, Storage};
use geo_etl::geo::coordinate;
use geo_etl::utils::{logger, validation::Validate};
use geo_etl::{CliConfig, EtlConfig, EtlEngine, EtlError, GeocodePipeline, LocalStorage};
use geo_etl::{Result, TieredGeocodingPipeline};
use std::collections::HashSet;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.exit_code());
        }
    };

    logger::init(config.logging.verbose, config.logging.json);
    tracing::info!("Starting {} (geocoding)", config.pipeline.name);
    tracing::debug!("configuration: {:?}", config);

    if let Err(e) = config.validate() {
        fail("Configuration validation failed", &e);
    }

    let geocoding = match geocoding_from_config(&config.geocoder) {
        Ok(geocoding) => geocoding,
        Err(e) => fail("Geocoder setup failed", &e),
    };
    let storage = LocalStorage::new(".");

    if cli.dry_run {
        return match perform_dry_run(&storage, &config, &geocoding).await {
            Ok(()) => Ok(()),
            Err(e) => fail("Dry run failed", &e),
        };
    }

    let engine = EtlEngine::new(GeocodePipeline::new(storage, config, geocoding));
    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Geocoding completed");
            println!("✅ Geocoding completed");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => fail("Geocoding failed", &e),
    }

    Ok(())
}

fn fail(context: &str, e: &EtlError) -> ! {
    tracing::error!(
        category = ?e.category(),
        severity = ?e.severity(),
        "❌ {}: {}",
        context,
        e
    );
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    std::process::exit(e.exit_code().max(1));
}

/// Reads the input and reports how rows would be routed, without any lookup.
async fn perform_dry_run(
    storage: &LocalStorage,
    config: &EtlConfig,
    geocoding: &TieredGeocodingPipeline,
) -> Result<()> {
    tracing::info!("🧪 Dry run, no geocoding requests will be sent");

    let bytes = storage.read_file(config.input_path()).await?;
    let dataset = table::read_csv(&bytes)?;
    let columns = config.columns();

    let mut exact = 0;
    let mut insufficient = 0;
    let mut queries = HashSet::new();
    for record in &dataset.records {
        let location = columns.location(record);
        if location
            .location_text
            .as_deref()
            .and_then(coordinate::parse)
            .is_some()
        {
            exact += 1;
            continue;
        }
        match geocoding.plan(&location) {
            Some((query, _)) => {
                queries.insert(query.key().to_string());
            }
            None => insufficient += 1,
        }
    }

    println!("📄 Input: {} ({} rows)", config.input_path(), dataset.records.len());
    println!("📍 Coordinates parsed from text: {}", exact);
    println!("🌐 Distinct lookups needed: {}", queries.len());
    println!("⚠️  Rows without usable location data: {}", insufficient);
    println!(
        "📁 Output would be written to: {}/{}",
        config.output_path(),
        config.archive_name()
    );
    Ok(())
}
