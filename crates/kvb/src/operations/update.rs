//! 🔄 Update operation: the diva of the bulk API.
//!
//! 🎬 INT. BULK ENDPOINT. THE UPDATE WALKS IN WITH SEVEN OPTIONAL FLAGS.
//!
//! Two lines, like index, but the payload line is assembled from a pile of optional
//! knobs. The order on the wire is fixed:
//!
//! ```text
//!   metadata: _index, _type, _id, routing, parent, version (>0), version_type, retry_on_conflict
//!   payload:  doc_as_upsert, detect_noop, upsert, scripted_upsert, then doc OR script
//! ```
//!
//! `doc` beats `script` if somebody set both. Upsert flags ride along with either.
//! Anything not set is not sent. Not `null`. Not `false`. Gone.
//!
//! ⚠️ Every setter drops the memoized lines. Render, mutate, render again: you get
//! the new value, never the ghost of the old one. 🦆

use tracing::trace;

use crate::error::BulkError;
use crate::operations::{Identity, Payload, Script, WireObject};
use crate::response::BulkAction;

/// 🔄 Partially update a document, by partial doc or by script, optionally upserting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOperation {
    pub(crate) identity: Identity,
    retry_on_conflict: Option<u32>,
    doc: Option<Payload>,
    script: Option<Script>,
    scripted_upsert: Option<bool>,
    doc_as_upsert: Option<bool>,
    detect_noop: Option<bool>,
    upsert: Option<Payload>,
    rendered: Option<Vec<String>>,
}

impl UpdateOperation {
    pub fn new() -> Self {
        Self::default()
    }

    identity_setters!();

    /// 🔁 How many times the cluster retries on a version conflict before giving up.
    pub fn retry_on_conflict(mut self, retries: u32) -> Self {
        self.retry_on_conflict = Some(retries);
        self.rendered = None;
        self
    }

    /// 📦 The partial document to merge in.
    pub fn doc(mut self, doc: impl Into<Payload>) -> Self {
        self.doc = Some(doc.into());
        self.rendered = None;
        self
    }

    pub fn script(mut self, script: Script) -> Self {
        self.script = Some(script);
        self.rendered = None;
        self
    }

    /// 🎬 Run the script even when the document does not exist yet.
    pub fn scripted_upsert(mut self, scripted_upsert: bool) -> Self {
        self.scripted_upsert = Some(scripted_upsert);
        self.rendered = None;
        self
    }

    /// 🆕 Use `doc` as the upsert document when the target is missing.
    pub fn doc_as_upsert(mut self, doc_as_upsert: bool) -> Self {
        self.doc_as_upsert = Some(doc_as_upsert);
        self.rendered = None;
        self
    }

    /// 😴 Skip the write (result `noop`) when the merge changes nothing.
    pub fn detect_noop(mut self, detect_noop: bool) -> Self {
        self.detect_noop = Some(detect_noop);
        self.rendered = None;
        self
    }

    pub fn upsert(mut self, upsert: impl Into<Payload>) -> Self {
        self.upsert = Some(upsert.into());
        self.rendered = None;
        self
    }

    /// 📄 Two lines, memoized until the next setter.
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
        meta.value("retry_on_conflict", self.retry_on_conflict)?;
        let action_line = meta.into_action_line(BulkAction::Update)?;

        let mut body = WireObject::new();
        body.value("doc_as_upsert", self.doc_as_upsert)?
            .value("detect_noop", self.detect_noop)?
            .payload("upsert", self.upsert.as_ref())?
            .value("scripted_upsert", self.scripted_upsert)?;
        match (&self.doc, &self.script) {
            (Some(doc), _) => {
                body.payload("doc", Some(doc))?;
            }
            (None, Some(script)) => {
                body.raw("script", script.to_raw_value()?);
            }
            (None, None) => {}
        }
        let body_line = body.into_line()?;

        trace!("🔄 rendered update lines for id {:?}", self.identity.id);
        Ok(vec![action_line, body_line])
    }
}
