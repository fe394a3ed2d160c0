use clap::Parser;
use geo_etl::app::classifier_from_config;
use geo_etl::utils::{logger, validation::Validate};
use geo_etl::{CliConfig, EtlEngine, EtlError, ExtractionPipeline, LocalStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    logger::init(config.logging.verbose, config.logging.json);
    tracing::info!(
        model = %config.extraction.model,
        "Starting {} (case extraction)",
        config.pipeline.name
    );

    if let Err(e) = config.validate() {
        fail("Configuration validation failed", &e);
    }

    let classifier = match classifier_from_config(&config.extraction) {
        Ok(classifier) => classifier,
        Err(e) => fail("Text model setup failed", &e),
    };

    if cli.dry_run {
        tracing::info!(
            text_column = %config.extraction.text_column,
            "🧪 Dry run, configuration and credentials are valid"
        );
        println!("✅ Configuration is valid");
        return Ok(());
    }

    let text_column = config.extraction.text_column.clone();
    let output_file = config.extraction.output_file.clone();
    let pipeline = ExtractionPipeline::new(
        LocalStorage::new("."),
        config,
        classifier,
        text_column,
        output_file,
    );

    match EtlEngine::new(pipeline).run().await {
        Ok(output_path) => {
            tracing::info!("✅ Extraction completed");
            println!("✅ Extraction completed");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => fail("Extraction failed", &e),
    }

    Ok(())
}

fn fail(context: &str, e: &EtlError) -> ! {
    tracing::error!("❌ {}: {}", context, e);
    tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    std::process::exit(e.exit_code().max(1));
}
