use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use image_handler::config::HandlerConfig;
use image_handler::request::{ImageHandlerEvent, ImageRequestResolver, SignatureAuthorizer};
use image_handler::store::{S3BlobStore, SecretsManagerStore};
use image_handler::ImageHandlerError;

/// Image Handler - resolve image URLs into canonical, authorized image requests
#[derive(Parser, Debug)]
#[command(name = "image-handler")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (legacy environment variables when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve bucket, key and edits without touching storage
    Resolve(RequestArgs),
    /// Resolve, authorize and fetch the source image
    Fetch(RequestArgs),
    /// Print the request signature for a payload (object key or path)
    Sign { payload: String },
    /// Validate the configuration and exit
    Check,
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
    /// Request path, e.g. /thumbor/filters:grayscale()/image.jpg
    path: String,

    /// Query string parameter as name=value (repeatable)
    #[arg(short, long = "query", value_parser = parse_key_val)]
    query: Vec<(String, String)>,

    /// Request header as name=value (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_key_val)]
    header: Vec<(String, String)>,
}

impl RequestArgs {
    fn into_event(self) -> ImageHandlerEvent {
        let mut event = ImageHandlerEvent::new(self.path);
        for (name, value) in self.query {
            event = event.with_query(name, value);
        }
        for (name, value) in self.header {
            event = event.with_header(name, value);
        }
        event
    }
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<HandlerConfig> {
    let config = match path {
        Some(path) => HandlerConfig::from_file(path),
        None => HandlerConfig::from_env(),
    }
    .map_err(|e| anyhow!(e))
    .context("Failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("Invalid configuration")?;
    Ok(config)
}

/// Print the error body and exit with status 1
fn fail(err: ImageHandlerError) -> ! {
    tracing::error!(code = err.code(), status = err.to_http_status(), error = %err, "Request failed");
    println!("{}", err.to_json());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    image_handler::logging::init_subscriber().map_err(|e| anyhow!(e))?;

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    tracing::info!(
        config_file = ?args.config,
        buckets = config.source_buckets.len(),
        signature_enabled = config.signature.enabled,
        rewrite_enabled = config.rewrite.is_some(),
        "Configuration loaded successfully"
    );

    if let Command::Check = args.command {
        println!("Configuration OK");
        return Ok(());
    }

    let sdk_config = aws_config::load_from_env().await;
    let blob_store = Arc::new(S3BlobStore::new(aws_sdk_s3::Client::new(&sdk_config)));
    let secret_store = Arc::new(SecretsManagerStore::new(
        aws_sdk_secretsmanager::Client::new(&sdk_config),
    ));

    match args.command {
        Command::Sign { payload } => {
            let authorizer = SignatureAuthorizer::new(config.signature.clone(), secret_store);
            match authorizer.sign(&payload).await {
                Ok(signature) => println!("{}", signature),
                Err(e) => fail(e),
            }
        }
        Command::Resolve(request) => {
            let resolver = ImageRequestResolver::new(config, blob_store, secret_store)
                .unwrap_or_else(|e| fail(e));
            match resolver.resolve(&request.into_event()) {
                Ok(resolved) => println!("{}", serde_json::to_string_pretty(&resolved)?),
                Err(e) => fail(e),
            }
        }
        Command::Fetch(request) => {
            let resolver = ImageRequestResolver::new(config, blob_store, secret_store)
                .unwrap_or_else(|e| fail(e));
            match resolver.setup(&request.into_event()).await {
                Ok(info) => {
                    let mut body = serde_json::to_value(&info)?;
                    body["originalImageBytes"] = serde_json::Value::from(info.original_image.len());
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                Err(e) => fail(e),
            }
        }
        Command::Check => {}
    }

    Ok(())
}
