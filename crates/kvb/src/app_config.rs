//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph: each section's struct lives next to the code that uses it.
//! `ClientConfig` in `transport`, `BulkConfig` in `bulk`, `ProcessorConfig` in `processor`.
//! This file only stitches them together and loads them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::bulk::BulkConfig;
use crate::processor::ProcessorConfig;
use crate::transport::ClientConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the cluster lives and how to get in.
    pub client: ClientConfig,
    /// 📦 Batch defaults and query parameters.
    #[serde(default)]
    pub bulk: BulkConfig,
    /// 🚰 When to commit.
    #[serde(default, alias = "processor_config")]
    pub processor: ProcessorConfig,
    /// 📂 NDJSON file of documents for the CLI to index.
    #[serde(default)]
    pub input: Option<PathBuf>,
}

/// 🚀 Load the config from env vars (`KVB_*`, nested with `__`) and an optional TOML file.
///
/// 📐 If `config_file_name` is `None`: env vars only. If `Some`: env + TOML, TOML wins on
/// conflicts. No silent fallback to some default file name.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!("🔧 Loading configuration: {:#?}", config_file_name.unwrap_or(Path::new("")));

    let config = Figment::new().merge(Env::prefixed("KVB_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    // 💬 A context message that will actually TELL you what went wrong.
    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KVB_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KVB_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
