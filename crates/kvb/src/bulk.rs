//! # 📦 THE BATCH
//!
//! *Previously, on kvb...*
//!
//! Operations were built. Setters were called. Memos were invalidated. And now they all
//! need to get on the same bus.
//!
//! `BulkBatch` is the bus. It holds operations in order, knows roughly how heavy they are,
//! renders them into one NDJSON body, hands that body to a [`Transport`], and decodes
//! what comes back. It resets itself only when the whole round trip worked.
//!
//! ## Knowledge Graph 🧠
//! - Insertion order is wire order, and wire order is response item order.
//! - `estimated_size_in_bytes` is incremental: a cursor marks how many leading operations
//!   are already counted, so polling it before every `add` stays linear overall.
//!   Invariant: `cursor <= operations.len()` and the estimate covers `operations[..cursor]`.
//! - `submit` failure modes, in order: `EmptyBatch` (transport never called), `Encoding`
//!   (nothing sent), `Transport` (queue kept), `Decode` (queue kept). Only full success resets.
//! - Not synchronized. Every mutating method takes `&mut self`; share it through one owner
//!   (see `processor.rs`) or your own mutex.
//!
//! ⚠️ `Ok(response)` does NOT mean every write landed. Check `response.failed()`. Always.
//! The bulk API is a partial-failure protocol and it will not apologize for it. 🦆

use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::BulkError;
use crate::operations::BulkOperation;
use crate::response::BulkResponse;
use crate::transport::{Transport, TransportRequest, bulk_path};

/// 🔄 When the written documents become visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Refresh {
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
    /// ⏳ Block the response until a refresh makes the writes visible.
    #[serde(rename = "wait_for")]
    WaitFor,
}

impl Refresh {
    pub fn as_str(&self) -> &'static str {
        match self {
            Refresh::True => "true",
            Refresh::False => "false",
            Refresh::WaitFor => "wait_for",
        }
    }
}

/// 🔧 Batch-level defaults and query parameters. Every field is optional; unset means
/// "not in the URL at all".
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct BulkConfig {
    /// 📦 Default index for operations that do not name one.
    #[serde(default)]
    pub index: Option<String>,
    /// 🏷️ Default type, legacy clusters only. Ignored without `index`.
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub refresh: Option<Refresh>,
    #[serde(default)]
    pub routing: Option<String>,
    /// ⏱️ Server-side timeout, e.g. `"1m"`. Passed through untouched.
    #[serde(default)]
    pub timeout: Option<String>,
    /// 🧮 `"all"` or a count, as a string. Passed through untouched.
    #[serde(default)]
    pub wait_for_active_shards: Option<String>,
    #[serde(default)]
    pub pretty: Option<bool>,
}

impl BulkConfig {
    /// 🔧 Query parameters in a stable order, unset ones omitted.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref pipeline) = self.pipeline {
            params.push(("pipeline", pipeline.clone()));
        }
        if let Some(refresh) = self.refresh {
            params.push(("refresh", refresh.as_str().to_string()));
        }
        if let Some(ref routing) = self.routing {
            params.push(("routing", routing.clone()));
        }
        if let Some(ref timeout) = self.timeout {
            params.push(("timeout", timeout.clone()));
        }
        if let Some(ref wait_for_active_shards) = self.wait_for_active_shards {
            params.push(("wait_for_active_shards", wait_for_active_shards.clone()));
        }
        if let Some(pretty) = self.pretty {
            params.push(("pretty", pretty.to_string()));
        }
        params
    }
}

/// 📦 Accumulates operations and submits them as one `_bulk` request.
///
/// Reusable: after a successful [`submit`](BulkBatch::submit) it is empty and ready for the
/// next round, no reconstruction needed.
#[derive(Debug)]
pub struct BulkBatch<T> {
    transport: T,
    config: BulkConfig,
    operations: Vec<BulkOperation>,
    estimated_size: u64,
    cursor: usize,
}

impl<T: Transport> BulkBatch<T> {
    pub fn new(transport: T, config: BulkConfig) -> Self {
        Self {
            transport,
            config,
            operations: Vec::new(),
            estimated_size: 0,
            cursor: 0,
        }
    }

    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// 🔧 Change defaults/params between submissions. Queued operations are not touched.
    pub fn config_mut(&mut self) -> &mut BulkConfig {
        &mut self.config
    }

    /// ➕ Queue one operation. The size estimate catches up lazily.
    pub fn add(&mut self, operation: impl Into<BulkOperation>) -> &mut Self {
        self.operations.push(operation.into());
        self
    }

    /// ➕ Queue several operations, in order.
    pub fn extend<I>(&mut self, operations: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<BulkOperation>,
    {
        self.operations.extend(operations.into_iter().map(Into::into));
        self
    }

    /// 🔢 Pending operations. O(1).
    pub fn number_of_actions(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// 📏 Bytes the rendered body will take, newline terminators included.
    ///
    /// Only operations added since the last call get rendered; the rest is cached. A
    /// render failure stops the cursor in front of the bad operation, so the estimate
    /// stays exact for everything before it.
    pub fn estimated_size_in_bytes(&mut self) -> Result<u64, BulkError> {
        while self.cursor < self.operations.len() {
            let lines = self.operations[self.cursor].render()?;
            let size: u64 = lines.iter().map(|line| line.len() as u64 + 1).sum();
            self.estimated_size += size;
            self.cursor += 1;
        }
        trace!(
            "📏 estimate at {} bytes across {} operations",
            self.estimated_size, self.cursor
        );
        Ok(self.estimated_size)
    }

    /// 📄 The NDJSON body as it would be sent, every line `\n`-terminated.
    pub fn body(&mut self) -> Result<String, BulkError> {
        let mut body = String::with_capacity(self.estimated_size as usize);
        for operation in self.operations.iter_mut() {
            for line in operation.render()? {
                body.push_str(line);
                body.push('\n');
            }
        }
        Ok(body)
    }

    /// 🗑️ Forget everything queued. Called automatically after a successful submit.
    pub fn reset(&mut self) {
        self.operations.clear();
        self.estimated_size = 0;
        self.cursor = 0;
    }

    /// 🚀 Render, send, decode, and (only if all of that worked) reset.
    pub async fn submit(&mut self) -> Result<BulkResponse, BulkError> {
        if self.operations.is_empty() {
            return Err(BulkError::EmptyBatch);
        }

        let body = self.body()?;
        let request = TransportRequest {
            method: Method::POST,
            path: bulk_path(self.config.index.as_deref(), self.config.type_name.as_deref()),
            params: self.config.query_params(),
            body,
        };
        debug!(
            "🚀 submitting {} operations ({} bytes) to {}",
            self.operations.len(),
            request.body.len(),
            request.path
        );

        let response = self.transport.perform(request).await?;
        let decoded: BulkResponse = serde_json::from_slice(&response.body).map_err(BulkError::Decode)?;

        if decoded.errors {
            warn!(
                "⚠️ bulk response reports errors: {} of {} items failed",
                decoded.failed().len(),
                decoded.items.len()
            );
        }

        self.reset();
        Ok(decoded)
    }
}
