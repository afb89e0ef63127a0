// src/models/notice.rs

use serde::Serialize;

/// A message the UI shows in its modal/alert slot.
///
/// Each variant carries exactly the fields that kind of notice needs, so a
/// confirmation can never be rendered without the action it confirms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Notice {
    Info {
        title: String,
        message: String,
    },
    Confirm {
        title: String,
        message: String,
        /// Label for the button that repeats the request with confirmation.
        confirm_label: String,
        /// The action being confirmed, e.g. `delete quiz`.
        action: String,
    },
    Error {
        title: String,
        message: String,
    },
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice::Info {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice::Error {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn confirm(action: impl Into<String>, message: impl Into<String>) -> Self {
        let action = action.into();
        Notice::Confirm {
            title: format!("Confirm {}", action),
            message: message.into(),
            confirm_label: "Continue".to_string(),
            action,
        }
    }
}
