//! 📦 kvb: bulk write batching for Elasticsearch-style clusters.
//!
//! Queue index, update and delete operations on a [`BulkBatch`], poll its size cheaply, and
//! submit everything in one `_bulk` round trip. Or hand the whole job to a
//! [`BulkProcessor`] and let it decide when. 🦆

pub mod app_config;
pub mod bulk;
pub mod error;
pub mod ingest;
pub mod operations;
pub mod processor;
pub mod progress;
pub mod response;
pub mod transport;

pub use bulk::{BulkBatch, BulkConfig, Refresh};
pub use error::{BulkError, TransportError};
pub use ingest::run;
pub use operations::{
    BulkOperation, DeleteOperation, IndexOperation, OpType, Payload, Script, ScriptType, UpdateOperation,
};
pub use processor::{BulkProcessor, ProcessorConfig, ProcessorStats};
pub use response::{BulkAction, BulkResponse, BulkResponseItem, ErrorDetails, ShardsInfo};
pub use transport::{ClientConfig, HttpTransport, Transport, TransportRequest, TransportResponse, bulk_path};
