//! 📝 Operations: the things you want the cluster to do, one line (or two) at a time.
//!
//! 🎬 COLD OPEN. INT. BULK ENDPOINT. THE LINE NEVER ENDS.
//!
//! Every write intent in a bulk request is an operation, and every operation renders to
//! NDJSON: an action line (`{"index":{...}}`) and, for index and update, a payload line.
//! Delete travels light. One line. No luggage.
//!
//! ## Knowledge Graph 🧠
//! - `BulkOperation`: the sum type the batch accumulates. Index | Update | Delete.
//! - Each variant owns its fields and memoizes its rendered lines. Setters drop the memo.
//! - `WireObject`: an ordered list of (key, raw JSON) pairs. Absent fields never make it in,
//!   which is the whole trick: the cluster treats *presence* as meaningful, so `null` and
//!   `""` are not the same as "not there".
//! - `Payload`: structured value or pre-serialized text. See `payload.rs`.
//!
//! ```text
//!   {"update":{"_index":"i","_id":"1"}}   <- action line (WireObject, wrapped)
//!   {"doc":{"a":1}}                       <- payload line (WireObject)
//! ```
//!
//! ⚠️ Lines never contain `\n`. One stray newline and every operation after it is parsed
//! as something it is not. The cluster will not be gracious about it. 🦆

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::BulkError;
use crate::response::BulkAction;

/// 🔧 Setters for the [`Identity`] fields, stamped into every operation's `impl`.
/// Each one drops the memoized lines, same as every other setter.
macro_rules! identity_setters {
    () => {
        /// 📦 Target index. Falls back to the batch's URL-level index when absent.
        pub fn index(mut self, index: impl Into<String>) -> Self {
            self.identity.index = Some(index.into());
            self.rendered = None;
            self
        }

        /// 🏷️ Target type. Legacy clusters only, but they are out there.
        pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
            self.identity.type_name = Some(type_name.into());
            self.rendered = None;
            self
        }

        pub fn id(mut self, id: impl Into<String>) -> Self {
            self.identity.id = Some(id.into());
            self.rendered = None;
            self
        }

        pub fn routing(mut self, routing: impl Into<String>) -> Self {
            self.identity.routing = Some(routing.into());
            self.rendered = None;
            self
        }

        pub fn parent(mut self, parent: impl Into<String>) -> Self {
            self.identity.parent = Some(parent.into());
            self.rendered = None;
            self
        }

        /// 🔢 Expected version. Only emitted when positive.
        pub fn version(mut self, version: i64) -> Self {
            self.identity.version = Some(version);
            self.rendered = None;
            self
        }

        /// 🔢 `internal`, `external`, `external_gte`... the cluster knows the list better than we do.
        pub fn version_type(mut self, version_type: impl Into<String>) -> Self {
            self.identity.version_type = Some(version_type.into());
            self.rendered = None;
            self
        }
    };
}

pub mod delete;
pub mod index;
pub mod payload;
pub mod script;
pub mod update;

pub use delete::DeleteOperation;
pub use index::{IndexOperation, OpType};
pub use payload::Payload;
pub use script::{Script, ScriptType};
pub use update::UpdateOperation;

/// 🎭 One write intent. The unit the [`crate::bulk::BulkBatch`] accumulates.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Index(IndexOperation),
    Update(UpdateOperation),
    Delete(DeleteOperation),
}

impl BulkOperation {
    /// 📄 Render into wire lines: two for index/update, one for delete.
    ///
    /// Cheap after the first call (memoized inside the variant).
    pub fn render(&mut self) -> Result<&[String], BulkError> {
        match self {
            BulkOperation::Index(op) => op.render(),
            BulkOperation::Update(op) => op.render(),
            BulkOperation::Delete(op) => op.render(),
        }
    }

    /// 🏷️ The action key this operation is sent (and answered) under.
    pub fn action(&self) -> BulkAction {
        match self {
            BulkOperation::Index(op) => op.action(),
            BulkOperation::Update(_) => BulkAction::Update,
            BulkOperation::Delete(_) => BulkAction::Delete,
        }
    }

    /// 🎯 The document id, if the caller picked one.
    pub fn id(&self) -> Option<&str> {
        match self {
            BulkOperation::Index(op) => op.identity.id.as_deref(),
            BulkOperation::Update(op) => op.identity.id.as_deref(),
            BulkOperation::Delete(op) => op.identity.id.as_deref(),
        }
    }
}

impl From<IndexOperation> for BulkOperation {
    fn from(op: IndexOperation) -> Self {
        BulkOperation::Index(op)
    }
}

impl From<UpdateOperation> for BulkOperation {
    fn from(op: UpdateOperation) -> Self {
        BulkOperation::Update(op)
    }
}

impl From<DeleteOperation> for BulkOperation {
    fn from(op: DeleteOperation) -> Self {
        BulkOperation::Delete(op)
    }
}

/// 🧱 An ordered JSON object built from optional fields. Only present fields are kept.
///
/// Values are stored pre-encoded as `RawValue`, so a caller's pre-serialized payload can sit
/// next to our own encoded flags without ever being parsed into a `Value` and re-emitted.
#[derive(Debug, Default)]
pub(crate) struct WireObject {
    fields: Vec<(&'static str, Box<RawValue>)>,
}

impl WireObject {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🔤 A string field. `None` and `""` both mean "not there".
    pub(crate) fn text(&mut self, key: &'static str, value: Option<&str>) -> Result<&mut Self, BulkError> {
        match value {
            Some(value) if !value.is_empty() => self.value(key, Some(value)),
            _ => Ok(self),
        }
    }

    /// 🔢 Any serializable field, present only when `Some`.
    pub(crate) fn value<T: Serialize>(&mut self, key: &'static str, value: Option<T>) -> Result<&mut Self, BulkError> {
        if let Some(value) = value {
            let raw = serde_json::value::to_raw_value(&value).map_err(|err| BulkError::encoding(key, err))?;
            self.fields.push((key, raw));
        }
        Ok(self)
    }

    /// 📦 A payload field, spliced in verbatim when it is raw text.
    pub(crate) fn payload(&mut self, key: &'static str, payload: Option<&Payload>) -> Result<&mut Self, BulkError> {
        if let Some(payload) = payload {
            let raw = payload.to_raw_value(key)?;
            self.fields.push((key, raw));
        }
        Ok(self)
    }

    /// 🧩 An already-encoded fragment.
    pub(crate) fn raw(&mut self, key: &'static str, raw: Box<RawValue>) -> &mut Self {
        self.fields.push((key, raw));
        self
    }

    /// 📄 `{...}` as a single line.
    pub(crate) fn into_line(self) -> Result<String, BulkError> {
        serde_json::to_string(&self).map_err(|err| BulkError::encoding("line", err))
    }

    /// 📄 `{"<action>":{...}}` as a single line.
    pub(crate) fn into_action_line(self, action: BulkAction) -> Result<String, BulkError> {
        let envelope = BTreeMap::from([(action.as_str(), &self)]);
        serde_json::to_string(&envelope).map_err(|err| BulkError::encoding("action", err))
    }
}

impl Serialize for WireObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(key, value)| (key, value)))
    }
}

/// 🪪 The identity + routing fields every action line shares.
///
/// Each variant embeds one of these. Pushed in a fixed order: `_index`, `_type`, `_id`,
/// `routing`, `parent`, `version` (only when positive), `version_type`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Identity {
    pub(crate) index: Option<String>,
    pub(crate) type_name: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) routing: Option<String>,
    pub(crate) parent: Option<String>,
    pub(crate) version: Option<i64>,
    pub(crate) version_type: Option<String>,
}

impl Identity {
    pub(crate) fn write_into(&self, meta: &mut WireObject) -> Result<(), BulkError> {
        meta.text("_index", self.index.as_deref())?
            .text("_type", self.type_name.as_deref())?
            .text("_id", self.id.as_deref())?
            .text("routing", self.routing.as_deref())?
            .text("parent", self.parent.as_deref())?
            .value("version", self.version.filter(|version| *version > 0))?
            .text("version_type", self.version_type.as_deref())?;
        Ok(())
    }
}
