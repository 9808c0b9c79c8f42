//! Validation and normalization of incoming chat requests.
//!
//! A request is checked in three steps:
//!
//! 1. it must contain at least one turn;
//! 2. every turn whose `data.form` is `true` has its `content` replaced by the
//!    rendered [`FormTemplate`], wherever it sits in the conversation;
//! 3. after rewriting, the last turn must come from the user.
//!
//! The last turn's content becomes the query, earlier turns become history.

mod form;
mod types;

pub use form::{FormData, FormField, FormTemplate};
pub use types::{ChatRequest, ChatTurn, Role, TurnContent};

use crate::provider::Message;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No messages provided")]
    EmptyRequest,

    #[error("Last message must be from user")]
    InvalidLastTurn,

    #[error("Missing form field: {field}")]
    TemplateFieldMissing { field: &'static str },

    #[error("Invalid form data: {0}")]
    InvalidFormData(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// A validated request, ready to be queried.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChat {
    /// Content of the last (user) turn after form substitution.
    pub query: String,
    /// All earlier turns, oldest first.
    pub history: Vec<Message>,
}

impl NormalizedChat {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            history: Vec::new(),
        }
    }
}

/// Validates `request` and rewrites its form turns in place.
pub fn normalize(request: &mut ChatRequest, template: &FormTemplate) -> Result<NormalizedChat> {
    if request.messages.is_empty() {
        return Err(ChatError::EmptyRequest);
    }

    for turn in request.messages.iter_mut() {
        if let TurnContent::StructuredForm(form) = turn.resolve()? {
            turn.content = template.render(&form);
        }
    }

    let (last, earlier) = request.messages.split_last().ok_or(ChatError::EmptyRequest)?;
    if last.role != Role::User {
        return Err(ChatError::InvalidLastTurn);
    }

    Ok(NormalizedChat {
        query: last.content.clone(),
        history: earlier.iter().map(ChatTurn::to_message).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn form_data() -> Value {
        json!({
            "introduction": "John Smith, 58M",
            "presentingComplaint": "Central chest pain",
            "socrates": "Crushing, radiates to left arm, 20 minutes",
            "specificSystemsReview": "Diaphoresis, nausea",
            "generalSystemsReview": "Unremarkable",
            "ice": "Fears a heart attack",
            "pastMedicalHistory": "Hypertension, type 2 diabetes",
            "medicationHistory": "Ramipril, metformin",
            "socialHistory": "Smoker, 30 pack years",
            "familyHistory": "Father died of MI at 60"
        })
    }

    fn form_turn(role: Role, form_data: Value) -> ChatTurn {
        ChatTurn::new(role, "ignored").with_data(json!({"form": true, "formData": form_data}))
    }

    #[test]
    fn test_empty_request_is_rejected() {
        let mut request = ChatRequest { messages: vec![] };
        let err = normalize(&mut request, &FormTemplate::default()).unwrap_err();
        assert!(matches!(err, ChatError::EmptyRequest));
        assert_eq!(err.to_string(), "No messages provided");
    }

    #[test]
    fn test_last_turn_must_be_user() {
        for role in [Role::Assistant, Role::System] {
            let mut request = ChatRequest {
                messages: vec![ChatTurn::user("hello"), ChatTurn::new(role, "hi")],
            };
            let err = normalize(&mut request, &FormTemplate::default()).unwrap_err();
            assert!(matches!(err, ChatError::InvalidLastTurn));
            assert_eq!(err.to_string(), "Last message must be from user");
        }
    }

    #[test]
    fn test_plain_query_and_history() {
        let mut request = ChatRequest {
            messages: vec![
                ChatTurn::user("first"),
                ChatTurn::assistant("reply"),
                ChatTurn::user("What are Dimensional Standards for Letters?"),
            ],
        };

        let chat = normalize(&mut request, &FormTemplate::default()).unwrap();

        assert_eq!(chat.query, "What are Dimensional Standards for Letters?");
        assert_eq!(chat.history, vec![Message::user("first"), Message::assistant("reply")]);
    }

    #[test]
    fn test_form_turn_is_rendered() {
        let mut request = ChatRequest {
            messages: vec![form_turn(Role::User, form_data())],
        };

        let chat = normalize(&mut request, &FormTemplate::default()).unwrap();

        assert_ne!(chat.query, "ignored");
        assert_eq!(request.messages[0].content, chat.query);
        for value in form_data().as_object().unwrap().values() {
            assert!(chat.query.contains(value.as_str().unwrap()));
        }
    }

    #[test]
    fn test_earlier_form_turns_are_rewritten_too() {
        let mut request = ChatRequest {
            messages: vec![form_turn(Role::User, form_data()), ChatTurn::user("and the follow up?")],
        };

        let chat = normalize(&mut request, &FormTemplate::default()).unwrap();

        assert_eq!(chat.query, "and the follow up?");
        assert!(chat.history[0].content.contains("Central chest pain"));
    }

    #[test]
    fn test_form_turn_from_assistant_is_still_invalid_last_turn() {
        let mut request = ChatRequest {
            messages: vec![form_turn(Role::Assistant, form_data())],
        };

        let err = normalize(&mut request, &FormTemplate::default()).unwrap_err();

        assert!(matches!(err, ChatError::InvalidLastTurn));
        assert!(request.messages[0].content.contains("Central chest pain"));
    }

    #[test]
    fn test_missing_form_field() {
        let mut data = form_data();
        data.as_object_mut().unwrap().remove("socrates");
        let mut request = ChatRequest {
            messages: vec![form_turn(Role::User, data)],
        };

        let err = normalize(&mut request, &FormTemplate::default()).unwrap_err();

        assert!(matches!(err, ChatError::TemplateFieldMissing { field: "socrates" }));
        assert_eq!(err.to_string(), "Missing form field: socrates");
    }

    #[test]
    fn test_form_flag_must_be_true() {
        for flag in [json!(false), json!("true"), json!(1)] {
            let turn = ChatTurn::user("keep me").with_data(json!({"form": flag, "formData": form_data()}));
            let mut request = ChatRequest { messages: vec![turn] };
            let chat = normalize(&mut request, &FormTemplate::default()).unwrap();
            assert_eq!(chat.query, "keep me");
        }
    }

    #[test]
    fn test_form_data_must_be_an_object() {
        let turn = ChatTurn::user("x").with_data(json!({"form": true, "formData": "nope"}));
        let mut request = ChatRequest { messages: vec![turn] };
        let err = normalize(&mut request, &FormTemplate::default()).unwrap_err();
        assert!(matches!(err, ChatError::InvalidFormData(_)));
    }

    #[test]
    fn test_wire_format() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"messages":[{"role":"assistant","content":"hi","data":null},{"role":"user","content":"q"}]}"#,
        )
        .unwrap();
        assert_eq!(request.messages[0].role, Role::Assistant);
        assert_eq!(request.messages[0].data, None);
        assert_eq!(request.messages[1].role, Role::User);

        let bad: std::result::Result<ChatRequest, _> =
            serde_json::from_str(r#"{"messages":[{"role":"robot","content":"q"}]}"#);
        assert!(bad.is_err());
    }
}
