//! Response envelope for stack operations.
//!
//! # Responsibility
//! - Map stack outcomes to HTTP-style status codes.
//! - Keep a stable JSON shape for callers scripting the CLI.
//!
//! # Invariants
//! - `InvalidInput` -> 400, empty stack -> 404, other failures -> 500.
//! - `top_element` is present exactly for successful pick/pop.

use log::warn;
use serde::Serialize;
use stackstore_core::{EntryId, ErrorKind, RepoError, RepoResult};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

const EMPTY_STACK_MESSAGE: &str = "Stack is empty.";

/// Envelope printed for every CLI command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackResponse {
    /// HTTP-style status code.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Content returned by pick/pop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_element: Option<String>,
    /// Id assigned by push.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
}

impl StackResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self::with_status(STATUS_OK, message)
    }

    pub fn top(content: String) -> Self {
        Self {
            status: STATUS_OK,
            message: None,
            top_element: Some(content),
            entry_id: None,
        }
    }

    pub fn not_found() -> Self {
        Self::with_status(STATUS_NOT_FOUND, EMPTY_STACK_MESSAGE)
    }

    pub fn from_error(err: &RepoError) -> Self {
        match err.kind() {
            ErrorKind::InvalidInput => Self::with_status(STATUS_BAD_REQUEST, err.to_string()),
            ErrorKind::PersistenceFailure => {
                warn!("event=response_internal_error module=cli status=error error={err}");
                Self::with_status(STATUS_INTERNAL_ERROR, format!("internal error: {err}"))
            }
        }
    }

    pub fn from_push(result: RepoResult<EntryId>) -> Self {
        match result {
            Ok(id) => Self {
                entry_id: Some(id.to_string()),
                ..Self::ok("Pushed to the stack.")
            },
            Err(err) => Self::from_error(&err),
        }
    }

    /// Maps a pick/pop outcome.
    pub fn from_top(result: RepoResult<Option<String>>) -> Self {
        match result {
            Ok(Some(content)) => Self::top(content),
            Ok(None) => Self::not_found(),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn from_reverse(result: RepoResult<bool>) -> Self {
        match result {
            Ok(true) => Self::ok("Stack reversed."),
            Ok(false) => Self::not_found(),
            Err(err) => Self::from_error(&err),
        }
    }

    /// Process exit code for this response.
    pub fn exit_code(&self) -> u8 {
        match self.status {
            STATUS_OK => 0,
            STATUS_BAD_REQUEST => 2,
            STATUS_NOT_FOUND => 3,
            _ => 1,
        }
    }

    fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            top_element: None,
            entry_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{StackResponse, STATUS_BAD_REQUEST, STATUS_INTERNAL_ERROR, STATUS_NOT_FOUND};
    use stackstore_core::RepoError;

    #[test]
    fn empty_outcomes_map_to_not_found() {
        let pick = StackResponse::from_top(Ok(None));
        assert_eq!(pick.status, STATUS_NOT_FOUND);
        assert_eq!(pick.exit_code(), 3);

        let reverse = StackResponse::from_reverse(Ok(false));
        assert_eq!(reverse.status, STATUS_NOT_FOUND);
    }

    #[test]
    fn empty_string_content_is_success_not_empty() {
        let response = StackResponse::from_top(Ok(Some(String::new())));
        assert_eq!(response.status, 200);
        assert_eq!(response.top_element.as_deref(), Some(""));
        assert_eq!(response.exit_code(), 0);
    }

    #[test]
    fn invalid_input_maps_to_bad_request() {
        let response = StackResponse::from_push(Err(RepoError::InvalidInput("missing")));
        assert_eq!(response.status, STATUS_BAD_REQUEST);
        assert_eq!(response.exit_code(), 2);
        assert!(response.entry_id.is_none());
    }

    #[test]
    fn persistence_failures_map_to_internal_error() {
        let response =
            StackResponse::from_top(Err(RepoError::BrokenChain("no terminus".to_string())));
        assert_eq!(response.status, STATUS_INTERNAL_ERROR);
        assert_eq!(response.exit_code(), 1);
    }

    #[test]
    fn serializes_with_camel_case_and_omits_absent_fields() {
        let json = serde_json::to_string(&StackResponse::top("c".to_string())).unwrap();
        assert_eq!(json, r#"{"status":200,"topElement":"c"}"#);
    }
}
