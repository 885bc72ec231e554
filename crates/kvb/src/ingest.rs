//! 📂 ingest.rs: one NDJSON file in, one stack of bulk commits out.
//!
//! 🧠 Knowledge graph:
//! - Each non-blank line is one document. It becomes an `IndexOperation` whose body is the
//!   line itself, untouched, as a raw payload. No parse-and-reserialize round trip.
//! - A top-level `"id": "<string>"` in the document becomes the `_id`. Anything else gets an
//!   id from the cluster.
//! - Where the documents land (`index`, `type_name`, `pipeline`...) is the batch's business,
//!   configured once in `[bulk]`.
//! - A line that is not a JSON object stops the run, but only after everything queued so far
//!   has been drained. The error names the line. You will want the line. 🦆

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::app_config::AppConfig;
use crate::bulk::BulkConfig;
use crate::operations::{IndexOperation, Payload};
use crate::processor::{BulkProcessor, ProcessorConfig, ProcessorStats};
use crate::progress::IngestProgress;
use crate::transport::{HttpTransport, Transport};

/// 🚀 The whole show: ping the cluster, stream the `input` file through a processor,
/// hand back the scoreboard.
pub async fn run(app_config: AppConfig) -> Result<ProcessorStats> {
    let AppConfig {
        client,
        bulk,
        processor,
        input,
    } = app_config;
    let input = input.context(
        "💀 No `input` file configured. Set `input = \"docs.ndjson\"` in the config, or KVB_INPUT in the environment.",
    )?;

    let transport = HttpTransport::new(client)?;
    transport.ping().await?;

    let progress = IngestProgress::new(&input.display().to_string(), file_size(&input).await);
    ingest_file(transport, &input, bulk, processor, progress).await
}

async fn file_size(path: &Path) -> u64 {
    // -- 📏 0 means "unknown". The bar copes.
    tokio::fs::metadata(path).await.map(|meta| meta.len()).unwrap_or(0)
}

/// 📥 Feed every document of `path` into a fresh processor and close it.
pub(crate) async fn ingest_file<T: Transport + 'static>(
    transport: T,
    path: &Path,
    bulk_config: BulkConfig,
    processor_config: ProcessorConfig,
    mut progress: IngestProgress,
) -> Result<ProcessorStats> {
    let file = File::open(path).await.context(format!(
        "💀 The door to '{}' would not budge. It might not exist. It might not be ours to open.",
        path.display()
    ))?;

    let processor = BulkProcessor::start(transport, bulk_config, processor_config);
    let fed = feed(&processor, BufReader::new(file), &mut progress).await;
    progress.finish();

    // 🏁 drain what made it in, even when the file went bad halfway through
    let stats = processor.close().await;
    fed.context(format!("💀 Stopped reading '{}'.", path.display()))?;
    let stats = stats?;

    info!(
        "✅ {} documents read, {} succeeded, {} failed across {} commits",
        progress.docs_queued(),
        stats.succeeded,
        stats.failed,
        stats.committed
    );
    Ok(stats)
}

async fn feed<R: AsyncBufRead + Unpin>(
    processor: &BulkProcessor,
    mut reader: R,
    progress: &mut IngestProgress,
) -> Result<()> {
    let mut line = String::new();
    let mut line_number = 0usize;
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break;
        }
        line_number += 1;

        let document = line.trim_end_matches('\n').trim_end_matches('\r');
        if document.trim().is_empty() {
            progress.update(bytes_read as u64, false);
            continue;
        }

        let operation = to_index_operation(document, line_number)?;
        processor.add(operation).await?;
        progress.update(bytes_read as u64, true);
    }
    debug!("📄 reached EOF after {} lines", line_number);
    Ok(())
}

/// 🔧 One document line → one index operation. The line travels as-is.
pub(crate) fn to_index_operation(document: &str, line_number: usize) -> Result<IndexOperation> {
    let parsed: Value = serde_json::from_str(document)
        .context(format!("💀 Line {} is not valid JSON.", line_number))?;
    let Value::Object(fields) = parsed else {
        bail!("💀 Line {} is JSON, but not a JSON object. Documents are objects.", line_number);
    };

    let operation = IndexOperation::new().doc(Payload::raw(document));
    Ok(match fields.get("id").and_then(Value::as_str) {
        Some(id) => operation.id(id),
        None => operation,
    })
}
