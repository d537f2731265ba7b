//! Input Studio command line
//!
//! ```text
//! input-studio <project.json> preview <page>
//! input-studio <project.json> set <tag> <value>
//! input-studio <project.json> export
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use input_studio::config::EngineConfig;
use input_studio::preview::BitmapRef;
use input_studio::project::JsonProjectStore;
use input_studio::FillEngine;

const USAGE: &str =
    "usage: input-studio <project.json> (preview <page> | set <tag> <value> | export)";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "input_studio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        EngineConfig::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((project, command)) = args.split_first() else {
        bail!(USAGE);
    };

    tracing::info!("Input Studio v{}", env!("CARGO_PKG_VERSION"));
    let engine = FillEngine::open_project(config, JsonProjectStore::new(project))
        .await
        .with_context(|| format!("Failed to open project {}", project))?;

    match command {
        [cmd, page] if cmd == "preview" => {
            let page: usize = page.parse().context("page must be a number")?;
            let artifact = engine.get_preview(page).await?;
            let path = match &artifact.bitmap {
                BitmapRef::File(path) => path.clone(),
                BitmapRef::Png(png) => {
                    let path = PathBuf::from(format!("page_{:04}.png", artifact.page_index));
                    tokio::fs::write(&path, png.as_slice()).await?;
                    path
                }
            };
            println!("{}", path.display());
        }
        [cmd, tag, value] if cmd == "set" => {
            engine.set_value(tag, value).await?;
        }
        [cmd] if cmd == "export" => {
            let report = engine.export().await?;
            for warning in &report.warnings {
                tracing::warn!(?warning, "Export warning");
            }
            println!("{}", report.output_path.display());
        }
        _ => bail!(USAGE),
    }

    engine.close().await;
    Ok(())
}
