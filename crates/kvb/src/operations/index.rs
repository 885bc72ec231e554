//! 📥 Index operation: "here is a document, put it somewhere."
//!
//! Two lines. The action line (`index` or `create`, depending on how confident you are
//! that the id is fresh) and the document itself. No document? You get `{}`. The cluster
//! will index an empty object and it will not ask why.

use tracing::trace;

use crate::error::BulkError;
use crate::operations::{Identity, Payload, WireObject};
use crate::response::BulkAction;

/// 🏷️ Which action key the index line goes out under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OpType {
    /// 📥 Create or overwrite.
    #[default]
    Index,
    /// 🆕 Create only. An existing id comes back as a 409 item, not an error.
    Create,
}

/// 📥 Add (or replace) a whole document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOperation {
    pub(crate) identity: Identity,
    op_type: OpType,
    retry_on_conflict: Option<u32>,
    pipeline: Option<String>,
    doc: Option<Payload>,
    rendered: Option<Vec<String>>,
}

impl IndexOperation {
    pub fn new() -> Self {
        Self::default()
    }

    identity_setters!();

    pub fn op_type(mut self, op_type: OpType) -> Self {
        self.op_type = op_type;
        self.rendered = None;
        self
    }

    /// 🔁 Conflict retries. Only meaningful to clusters that accept it on index lines.
    pub fn retry_on_conflict(mut self, retries: u32) -> Self {
        self.retry_on_conflict = Some(retries);
        self.rendered = None;
        self
    }

    /// 🔧 Ingest pipeline for this one document.
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = Some(pipeline.into());
        self.rendered = None;
        self
    }

    /// 📦 The document. Structured values and raw JSON text both welcome.
    pub fn doc(mut self, doc: impl Into<Payload>) -> Self {
        self.doc = Some(doc.into());
        self.rendered = None;
        self
    }

    pub(crate) fn action(&self) -> BulkAction {
        match self.op_type {
            OpType::Index => BulkAction::Index,
            OpType::Create => BulkAction::Create,
        }
    }

    /// 📄 Two lines, memoized.
    pub fn render(&mut self) -> Result<&[String], BulkError> {
        let lines = match self.rendered.take() {
            Some(lines) => lines,
            None => self.encode()?,
        };
        Ok(self.rendered.insert(lines).as_slice())
    }

    fn encode(&self) -> Result<Vec<String>, BulkError> {
        let mut meta = WireObject::new();
        self.identity.write_into(&mut meta)?;
        meta.value("retry_on_conflict", self.retry_on_conflict)?
            .text("pipeline", self.pipeline.as_deref())?;
        let action_line = meta.into_action_line(self.action())?;

        let source_line = match &self.doc {
            Some(doc) => doc.to_line("doc")?,
            None => "{}".to_string(),
        };

        trace!("📝 rendered {} line for id {:?}", self.action().as_str(), self.identity.id);
        Ok(vec![action_line, source_line])
    }
}
