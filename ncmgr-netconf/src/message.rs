//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use chrono::{DateTime, Utc};
use enum_as_inner::EnumAsInner;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::DataNode;
use crate::error::Error;

// Configuration datastores.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Datastore {
    Running,
    Candidate,
    Startup,
}

// Value of the edit-config `default-operation` parameter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultOperation {
    #[default]
    Merge,
    Replace,
    None,
}

// Value of the edit-config `error-option` parameter.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorOption {
    #[default]
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

// NETCONF protocol operations.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Get {
        filter: Option<DataNode>,
    },
    GetConfig {
        source: Datastore,
        filter: Option<DataNode>,
    },
    EditConfig(EditConfig),
    Lock {
        target: Datastore,
    },
    Unlock {
        target: Datastore,
    },
    Commit,
    DiscardChanges,
    CloseSession,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EditConfig {
    pub target: Datastore,
    pub default_operation: Option<DefaultOperation>,
    pub error_option: Option<ErrorOption>,
    pub config: Vec<DataNode>,
}

// Request document, handed to the transport already tagged with its
// message-id.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Request {
    pub message_id: String,
    pub operation: Operation,
}

// Inbound message, as delivered by the transport.
#[derive(Clone, Debug, EnumAsInner)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Message {
    Reply(RpcReply),
    Notification(Notification),
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcReply {
    pub message_id: Option<String>,
    pub content: ReplyContent,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyContent {
    Ok,
    Data(Vec<DataNode>),
    Errors(Vec<RpcError>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RpcError {
    pub error_type: ErrorType,
    pub tag: ErrorTag,
    pub severity: ErrorSeverity,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    MalformedMessage,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorSeverity {
    Error,
    Warning,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Notification {
    pub event_time: DateTime<Utc>,
    pub data: Vec<DataNode>,
}

// ===== impl Datastore =====

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }
}

impl std::fmt::Display for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ===== impl Operation =====

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Get { .. } => "get",
            Operation::GetConfig { .. } => "get-config",
            Operation::EditConfig(..) => "edit-config",
            Operation::Lock { .. } => "lock",
            Operation::Unlock { .. } => "unlock",
            Operation::Commit => "commit",
            Operation::DiscardChanges => "discard-changes",
            Operation::CloseSession => "close-session",
        }
    }

    // Datastore the operation acts upon, if any.
    pub fn datastore(&self) -> Option<Datastore> {
        match self {
            Operation::GetConfig { source, .. } => Some(*source),
            Operation::EditConfig(edit) => Some(edit.target),
            Operation::Lock { target } | Operation::Unlock { target } => {
                Some(*target)
            }
            _ => None,
        }
    }
}

// Short human-readable form, e.g. `lock(candidate)`.
impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.datastore() {
            Some(datastore) => write!(f, "{}({})", self.name(), datastore),
            None => write!(f, "{}", self.name()),
        }
    }
}

// ===== impl Request =====

impl Request {
    pub fn new(message_id: impl Into<String>, operation: Operation) -> Request {
        Request {
            message_id: message_id.into(),
            operation,
        }
    }
}

// ===== impl RpcReply =====

impl RpcReply {
    pub fn ok(message_id: impl Into<String>) -> RpcReply {
        RpcReply {
            message_id: Some(message_id.into()),
            content: ReplyContent::Ok,
        }
    }

    pub fn data(message_id: impl Into<String>, data: Vec<DataNode>) -> RpcReply {
        RpcReply {
            message_id: Some(message_id.into()),
            content: ReplyContent::Data(data),
        }
    }

    pub fn errors(
        message_id: impl Into<String>,
        errors: Vec<RpcError>,
    ) -> RpcReply {
        RpcReply {
            message_id: Some(message_id.into()),
            content: ReplyContent::Errors(errors),
        }
    }

    // Converts the reply into its data contents, failing if any error with
    // severity "error" was reported. Warnings alone don't fail the operation.
    pub fn into_result(self) -> Result<Vec<DataNode>, Error> {
        match self.content {
            ReplyContent::Ok => Ok(vec![]),
            ReplyContent::Data(data) => Ok(data),
            ReplyContent::Errors(errors) => {
                if errors
                    .iter()
                    .any(|error| error.severity == ErrorSeverity::Error)
                {
                    Err(Error::Rpc(errors))
                } else {
                    Ok(vec![])
                }
            }
        }
    }
}

// ===== impl RpcError =====

impl RpcError {
    pub fn new(error_type: ErrorType, tag: ErrorTag) -> RpcError {
        RpcError {
            error_type,
            tag,
            severity: ErrorSeverity::Error,
            app_tag: None,
            path: None,
            message: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag)?;
        if let Some(path) = &self.path {
            write!(f, " at {}", path)?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

// ===== impl ErrorTag =====

impl ErrorTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }
}

impl std::fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ===== global functions =====

// Joins a list of rpc-errors for display purposes.
pub fn format_rpc_errors(errors: &[RpcError]) -> String {
    errors.iter().join("; ")
}
