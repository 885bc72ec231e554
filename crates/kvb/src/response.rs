//! 📬 Bulk responses: the part where we find out what actually happened.
//!
//! 🎬 INT. OPS ROOM. THE RESPONSE SAYS `"errors": true`. NOBODY BREATHES.
//!
//! A bulk response is one envelope with one entry per operation, in request order. Each
//! entry is a tiny object keyed by the action it answers:
//!
//! ```text
//! {"took":30,"errors":true,"items":[
//!   {"index": {"_index":"i","_id":"1","status":201,"result":"created"}},
//!   {"create":{"_index":"i","_id":"2","status":409,"error":{"type":"version_conflict_engine_exception",...}}}
//! ]}
//! ```
//!
//! ## Knowledge Graph 🧠
//! - Items decode as `BTreeMap<String, BulkResponseItem>`: one key in practice, any key
//!   tolerated. Unknown keys still show up in `failed()`/`succeeded()`/`by_id()`.
//! - Success is `200..=299` on `status`. Full stop. An `error` attached to a 2xx item does
//!   not make it a failure, and a non-2xx item without an `error` is still a failure.
//! - Classification never errors. No matches means an empty `Vec`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 🏷️ The action keys the bulk API speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BulkAction {
    Index,
    Create,
    Update,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }

    /// 🔍 Map a response key back to an action. Unknown keys are `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "index" => Some(BulkAction::Index),
            "create" => Some(BulkAction::Create),
            "update" => Some(BulkAction::Update),
            "delete" => Some(BulkAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 📬 The decoded answer to one bulk submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    /// ⏱️ Server-side milliseconds.
    #[serde(default)]
    pub took: u64,
    /// 🚨 True when at least one item failed. A hint, not a verdict: classify by status.
    #[serde(default)]
    pub errors: bool,
    /// 📋 One entry per submitted operation, in submission order.
    #[serde(default)]
    pub items: Vec<BTreeMap<String, BulkResponseItem>>,
}

/// 🕳️ `null` decodes like a missing field. The cluster sends `"_id": null` for items it
/// rejected before assigning an id, and the odd `"reason": null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// 🎯 Outcome of one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponseItem {
    #[serde(rename = "_index", default, deserialize_with = "null_as_default")]
    pub index: String,
    #[serde(rename = "_type", default, deserialize_with = "null_as_default")]
    pub type_name: String,
    #[serde(rename = "_id", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "_version", default, deserialize_with = "null_as_default")]
    pub version: i64,
    /// 🏷️ `created`, `updated`, `deleted`, `noop`, `not_found`...
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: String,
    #[serde(rename = "_shards", default)]
    pub shards: Option<ShardsInfo>,
    #[serde(rename = "_seq_no", default, deserialize_with = "null_as_default")]
    pub seq_no: i64,
    #[serde(rename = "_primary_term", default, deserialize_with = "null_as_default")]
    pub primary_term: i64,
    /// 🔢 The only source of truth for success.
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forced_refresh: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub found: bool,
    #[serde(default)]
    pub error: Option<ErrorDetails>,
}

impl BulkResponseItem {
    /// ✅ `200 <= status <= 299`. Nothing else counts.
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// 📊 Shard accounting for one write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardsInfo {
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub successful: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub failed: u32,
}

/// 💀 The structured error the cluster attaches to a failed item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub error_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reason: String,
    #[serde(rename = "resource.type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(rename = "resource.id", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Box<ErrorDetails>>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorDetails>,
}

impl BulkResponse {
    /// 🔍 Items answered under the given action key.
    pub fn by_action(&self, action: BulkAction) -> Vec<&BulkResponseItem> {
        self.items
            .iter()
            .filter_map(|entry| entry.get(action.as_str()))
            .collect()
    }

    pub fn indexed(&self) -> Vec<&BulkResponseItem> {
        self.by_action(BulkAction::Index)
    }

    pub fn created(&self) -> Vec<&BulkResponseItem> {
        self.by_action(BulkAction::Create)
    }

    pub fn updated(&self) -> Vec<&BulkResponseItem> {
        self.by_action(BulkAction::Update)
    }

    pub fn deleted(&self) -> Vec<&BulkResponseItem> {
        self.by_action(BulkAction::Delete)
    }

    /// 🎯 Every item, under any action, whose `_id` matches.
    pub fn by_id(&self, id: &str) -> Vec<&BulkResponseItem> {
        self.all_items().filter(|item| item.id == id).collect()
    }

    /// 💀 Items with a status outside 2xx. Check this after every successful submit.
    pub fn failed(&self) -> Vec<&BulkResponseItem> {
        self.all_items().filter(|item| !item.is_success()).collect()
    }

    /// ✅ Items with a 2xx status.
    pub fn succeeded(&self) -> Vec<&BulkResponseItem> {
        self.all_items().filter(|item| item.is_success()).collect()
    }

    fn all_items(&self) -> impl Iterator<Item = &BulkResponseItem> {
        self.items.iter().flat_map(|entry| entry.values())
    }
}
