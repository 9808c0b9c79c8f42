use super::form::FormData;
use super::{ChatError, Result};
use crate::provider::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One turn of the conversation as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Body of `POST /api/chat`. The last turn is the active query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
}

/// What a turn actually carries once its `data` has been inspected.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnContent {
    PlainText(String),
    StructuredForm(FormData),
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            data: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Decides between free text and a structured form.
    ///
    /// Only a JSON `true` under `data.form` selects the form branch; an
    /// absent, `false` or non-boolean flag keeps the plain `content`.
    pub fn resolve(&self) -> Result<TurnContent> {
        let Some(data) = &self.data else {
            return Ok(TurnContent::PlainText(self.content.clone()));
        };

        if data.get("form") != Some(&Value::Bool(true)) {
            return Ok(TurnContent::PlainText(self.content.clone()));
        }

        let fields = data
            .get("formData")
            .and_then(Value::as_object)
            .ok_or_else(|| ChatError::InvalidFormData("formData must be an object".to_string()))?;

        Ok(TurnContent::StructuredForm(FormData::from_map(fields)?))
    }

    pub fn to_message(&self) -> Message {
        Message::new(self.role.as_str(), self.content.clone())
    }
}
