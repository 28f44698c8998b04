//! rehost-prep: recovers a bootable rootfs+kernel from an opaque firmware
//! blob and rewrites the rootfs so a QEMU/Firmadyne-based emulator can
//! boot it.

mod archive_reader;
mod binary_inspector;
mod catalog;
mod common;
mod config;
mod error;
mod extractor;
mod firmware_image;
mod image_builder;
mod inference;
mod orchestrator;
mod path_algebra;
mod process;
mod rewrite;
mod rootfs_materialiser;

use catalog::Catalog;
use clap::Parser;
use config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    if let Err(e) = config.validate() {
        tracing::error!("{e}");
        std::process::exit(1);
    }

    let catalog = match Catalog::connect(&config.sql_host, config.port).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("catalog unreachable at {}:{}: {e}", config.sql_host, config.port);
            std::process::exit(1);
        }
    };

    match orchestrator::run(&config, &catalog).await {
        Ok(outcome) => {
            tracing::info!(
                "pipeline reached {:?} for {}",
                outcome.stage_reached,
                config.input.display()
            );
            if config.mode == config::RunMode::Debug || config.mode == config::RunMode::Analyze {
                if let Ok(state) = serde_json::to_string_pretty(&outcome.image) {
                    println!("{state}");
                }
            }
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    }
}
