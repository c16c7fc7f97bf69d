// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use newrelic_serverless_core::{
    aws::AwsProvider,
    http_client::{build_client, DEFAULT_TIMEOUT},
    layer::LayerResolver,
    LogSubscriptions, Manifest, Packager, PluginConfig, PluginError, RunReport,
};

const LOG_LEVEL_ENV: &str = "NEW_RELIC_PLUGIN_LOG_LEVEL";

#[derive(Debug, Parser)]
#[command(version, about = "Instruments serverless functions with the New Relic Lambda layer")]
struct Cli {
    /// Deployment manifest (YAML or JSON)
    #[arg(long, short, default_value = "serverless.yml")]
    manifest: PathBuf,

    /// Overrides provider.region from the manifest
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Attach the layer, wrap handlers and write the instrumented manifest
    Package {
        /// Where to write the instrumented manifest as JSON
        #[arg(long, short, default_value = "serverless.instrumented.json")]
        output: PathBuf,
    },
    /// Add or repair each function's log subscription filter
    Deploy,
    /// Remove each function's log subscription filter
    Remove,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = load(&cli);
    let debug_enabled = matches!(&loaded, Ok((_, config)) if config.debug);
    init_logging(debug_enabled);

    let (manifest, config) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(cli.command, manifest, config).await;
    ExitCode::from(exit_status(&result))
}

/// Per-function failures are reported but do not fail the hook, only run-level errors do.
fn exit_status(result: &Result<RunReport, PluginError>) -> u8 {
    match result {
        Ok(report) => {
            println!("{report}");
            if !report.is_success() {
                error!("{} function(s) failed, see above", report.failed.len());
            }
            0
        }
        Err(e) => {
            error!("{e}");
            1
        }
    }
}

fn load(cli: &Cli) -> Result<(Manifest, Arc<PluginConfig>), PluginError> {
    let mut manifest = Manifest::load(&cli.manifest)?;
    if let Some(region) = &cli.region {
        manifest.provider.region = Some(region.clone());
    }
    let config = manifest.plugin_config()?;
    Ok((manifest, Arc::new(config)))
}

fn init_logging(debug_enabled: bool) {
    let log_level = if debug_enabled {
        "debug".to_string()
    } else {
        std::env::var(LOG_LEVEL_ENV)
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string())
    };

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,aws_smithy_runtime=off,aws_config=warn,{log_level}"
    );
    let env_filter = EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    debug!("Logging subsystem enabled");
}

async fn run(
    command: Command,
    mut manifest: Manifest,
    config: Arc<PluginConfig>,
) -> Result<RunReport, PluginError> {
    let report = match command {
        Command::Package { output } => {
            let https_proxy = std::env::var("HTTPS_PROXY").ok();
            let layers = LayerResolver::from_config(
                build_client(DEFAULT_TIMEOUT, https_proxy.as_deref())?,
                &config,
            );
            Packager::check_plugin_order(&manifest);
            let report = Packager::new(config, layers).instrument(&mut manifest).await;
            manifest.write_json(&output)?;
            info!("Wrote instrumented manifest to {}", output.display());
            report
        }
        Command::Deploy => log_subscriptions(&manifest).await.add(&manifest).await,
        Command::Remove => log_subscriptions(&manifest).await.remove(&manifest).await,
    };
    Ok(report)
}

async fn log_subscriptions(manifest: &Manifest) -> LogSubscriptions {
    let provider = AwsProvider::from_env(manifest.provider.region.clone()).await;
    LogSubscriptions::new(Arc::new(provider))
}
