//! 🗑️ Delete operation: one line, no payload, no regrets.

use tracing::trace;

use crate::error::BulkError;
use crate::operations::{Identity, WireObject};
use crate::response::BulkAction;

/// 🗑️ Remove a document by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOperation {
    pub(crate) identity: Identity,
    rendered: Option<Vec<String>>,
}

impl DeleteOperation {
    pub fn new() -> Self {
        Self::default()
    }

    identity_setters!();

    /// 📄 Exactly one line, memoized.
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
        let action_line = meta.into_action_line(BulkAction::Delete)?;
        trace!("🗑️ rendered delete line for id {:?}", self.identity.id);
        Ok(vec![action_line])
    }
}
