//! 📜 Scripts for scripted updates.
//!
//! A bare inline script with no lang and no params is sent as a plain string
//! (`"script":"ctx._source.n++"`). Anything fancier becomes an object.

use serde_json::value::RawValue;

use crate::error::BulkError;
use crate::operations::{Payload, WireObject};

/// 🧭 Where the script body lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptType {
    /// 📝 Source travels with the request.
    #[default]
    Inline,
    /// 🗄️ Source was stored on the cluster ahead of time; we only send its id.
    Stored,
}

/// 📜 A script plus its optional language and parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    script: String,
    script_type: ScriptType,
    lang: Option<String>,
    params: Option<Payload>,
}

impl Script {
    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            script: source.into(),
            script_type: ScriptType::Inline,
            lang: None,
            params: None,
        }
    }

    pub fn stored(id: impl Into<String>) -> Self {
        Self {
            script: id.into(),
            script_type: ScriptType::Stored,
            lang: None,
            params: None,
        }
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn params(mut self, params: impl Into<Payload>) -> Self {
        self.params = Some(params.into());
        self
    }

    pub(crate) fn to_raw_value(&self) -> Result<Box<RawValue>, BulkError> {
        if self.script_type == ScriptType::Inline && self.lang.is_none() && self.params.is_none() {
            return serde_json::value::to_raw_value(&self.script).map_err(|err| BulkError::encoding("script", err));
        }

        let mut object = WireObject::new();
        let key = match self.script_type {
            ScriptType::Inline => "source",
            ScriptType::Stored => "id",
        };
        object
            .text(key, Some(self.script.as_str()))?
            .text("lang", self.lang.as_deref())?
            .payload("params", self.params.as_ref())?;
        serde_json::value::to_raw_value(&object).map_err(|err| BulkError::encoding("script", err))
    }
}
