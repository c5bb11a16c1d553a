use std::{fmt, io};

use docfeed_core::header::InvalidHeaderValue;
use docfeed_core::{AgentError, EntryError};
use thiserror::Error;

use crate::tree::NodeId;

/// Which leg of an exchange produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Metadata,
    Content,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Metadata => "metadata",
            Phase::Content => "content",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("node {0} is not part of the tree")]
    UnknownNode(NodeId),
    #[error("{0} has no parent")]
    MissingParent(String),
    #[error("parent of {0} is not a folder")]
    ParentNotFolder(String),
    #[error("parent of {name} is in state {state}, expected sync")]
    ParentNotSynced { name: String, state: String },
    #[error("{0} has no content source")]
    MissingContentSource(String),
    #[error("{0} has no self link")]
    MissingSelfHref(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid header value: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("{phase} response: {source}")]
    Document {
        phase: Phase,
        #[source]
        source: EntryError,
    },
    #[error("{phase} request returned {status}: {body}")]
    Status {
        phase: Phase,
        status: u16,
        body: String,
    },
    #[error("metadata response carried no upload session location")]
    MissingSessionUri,
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionError),
    #[error("giving up after {attempts} retries, last cause: {last}")]
    RetriesExhausted { attempts: u32, last: Transient },
}

/// Failures that warrant restarting an upload from its metadata leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transient {
    MalformedResponse(Phase),
    /// 410 (session gone) or 412 (stale ETag) on the content leg.
    Status(u16),
}

impl fmt::Display for Transient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transient::MalformedResponse(phase) => write!(f, "malformed {phase} response"),
            Transient::Status(status) => write!(f, "content request returned {status}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Transient(Transient),
    Fatal,
}

impl SyncError {
    pub(crate) fn document(phase: Phase, source: EntryError) -> Self {
        SyncError::Document { phase, source }
    }

    /// Agent-reported malformed payloads count as document errors of the leg
    /// that received them.
    pub(crate) fn agent(phase: Phase, err: AgentError) -> Self {
        match err {
            AgentError::Malformed(detail) => {
                SyncError::document(phase, EntryError::Malformed(detail))
            }
            other => SyncError::Agent(other),
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            SyncError::Document { phase, source } if source.is_malformed() => {
                Disposition::Transient(Transient::MalformedResponse(*phase))
            }
            SyncError::Status {
                phase: Phase::Content,
                status: status @ (410 | 412),
                ..
            } => Disposition::Transient(Transient::Status(*status)),
            _ => Disposition::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.disposition(), Disposition::Transient(_))
    }
}

pub(crate) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
