use crate::{annotations::ALLOWED_OPERATIONS, Operation};
use serde::Serialize;

/// The outcome of a single admission request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Decision {
    Allowed {
        message: String,
    },

    Denied {
        message: String,
        /// The operations permitted by the consulted objects, in first-seen order.
        permitted: Vec<Operation>,
    },

    /// The request could not be evaluated, e.g. because an object could not be
    /// decoded or fetched.
    Error {
        code: u16,
        message: String,
    },
}

impl Decision {
    pub const BAD_REQUEST: u16 = 400;

    pub(crate) fn allowed(op: Operation) -> Self {
        Self::Allowed {
            message: format!("operation '{op}' is allowed"),
        }
    }

    /// Denies `op`, reporting the deduplicated set of operations that would
    /// have been permitted.
    pub(crate) fn not_permitted<'a>(
        op: Operation,
        permitted: impl IntoIterator<Item = &'a Operation>,
    ) -> Self {
        let permitted = crate::operation::dedup(permitted);
        let message = if permitted.is_empty() {
            format!(
                "operation {op} is denied via '{ALLOWED_OPERATIONS}' annotation \
                 (allows no operations)"
            )
        } else {
            let ops = permitted
                .iter()
                .map(Operation::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "operation {op} is denied via '{ALLOWED_OPERATIONS}' annotation \
                 (allows only {ops})"
            )
        };
        Self::Denied { message, permitted }
    }

    /// Denies a request that violates policy constraints before any operation
    /// can be checked.
    pub(crate) fn denied(error: impl std::fmt::Display) -> Self {
        Self::Denied {
            message: error.to_string(),
            permitted: Vec::new(),
        }
    }

    pub(crate) fn bad_request(message: String) -> Self {
        Self::Error {
            code: Self::BAD_REQUEST,
            message,
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Allowed { message }
            | Self::Denied { message, .. }
            | Self::Error { message, .. } => message.as_str(),
        }
    }
}
