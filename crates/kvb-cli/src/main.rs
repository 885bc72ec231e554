//! 🚀 kvb-cli: point it at a config, watch a file of documents turn into bulk commits.
//!
//! 🎬 *[narrator voice]* "The config was valid. The cluster was up. Nobody believed it either."
//!
//! Usage: `kvb-cli [config.toml]`. Defaults to `kvb.toml` when it exists, env vars (`KVB_*`)
//! either way. 🦆

use std::path::Path;

use anyhow::{Context, Result};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 📡 RUST_LOG decides how chatty we are. Default: silent, like a good batch job.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path_arg = std::env::args().nth(1).unwrap_or_else(|| "kvb.toml".to_string());
    let config_file = Path::new(&path_arg);

    // 🔒 a missing file is fine, env vars may carry everything. An unreadable location is not.
    let config_file = config_file
        .try_exists()
        .context(format!(
            "💀 Could not tell whether '{}' exists. Permissions, or a relative path resolved from somewhere unexpected. Try an absolute path.",
            config_file.display()
        ))?
        .then_some(config_file);

    let app_config = kvb::app_config::load_config(config_file)
        .context("💀 kvb-cli could not load its configuration. Check the file, then check KVB_* in the environment.")?;

    match kvb::run(app_config).await {
        Ok(stats) => {
            println!("{}", kvb::progress::summary_table(&stats));
            if stats.failed > 0 {
                error!("⚠️  {} documents were rejected by the cluster. The table does not lie.", stats.failed);
            }
            Ok(())
        }
        Err(err) => {
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion, one layer at a time
            let mut looks_unreachable = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause = cause.to_string();
                if cause.contains("error sending request")
                    || cause.contains("onnection refused")
                    || cause.contains("tcp connect error")
                    || cause.contains("dns error")
                {
                    looks_unreachable = true;
                }
            }

            if looks_unreachable {
                error!(
                    "🔧 hint: the cluster does not seem reachable. Is it running? \
                    With Docker, `docker ps` tells you, `docker compose up -d` fixes it. ☕"
                );
            }
            std::process::exit(1);
        }
    }
}
