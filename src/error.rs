use thiserror::Error;

use crate::state_machine::{DocumentKind, ProcessId};

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow configuration error: {0}")]
    Config(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("Stage '{0}' not found")]
    StageNotFound(String),

    #[error("Step {step} not found in stage '{stage}'")]
    StepNotFound { stage: String, step: u32 },

    #[error("Required group: '{required_role}'.")]
    Forbidden { required_role: String },

    #[error("Field not allowed at this step: '{0}'")]
    FieldNotAllowed(String),

    #[error("This process is already complete.")]
    AlreadyCompleted,

    #[error("Step {step} of stage '{stage}' cannot be rejected.")]
    NotRejectable { stage: String, step: u32 },

    #[error("{0}")]
    CommentRequired(String),

    #[error("Process {0} was modified concurrently, retry the action")]
    Conflict(ProcessId),

    #[error("Workflow is currently in stage '{current}', not '{requested}'.")]
    WrongStage { current: String, requested: String },

    #[error("A document has already been linked to stage '{0}' of this process.")]
    DocumentAlreadyLinked(String),

    #[error("Stage '{stage}' takes {expected} documents, not {found}.")]
    DocumentKindMismatch {
        stage: String,
        expected: DocumentKind,
        found: DocumentKind,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse classification an outer transport layer maps to response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorClass {
    /// Caller supplied an action the current state does not accept.
    BadRequest,
    /// Role admission or field policy refused the actor.
    Forbidden,
    /// The process (or a step of it) does not exist.
    NotFound,
    /// Corrupt configuration or storage failure. Never caused by the caller.
    Internal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::BadRequest => write!(f, "BadRequest"),
            ErrorClass::Forbidden => write!(f, "Forbidden"),
            ErrorClass::NotFound => write!(f, "NotFound"),
            ErrorClass::Internal => write!(f, "Internal"),
        }
    }
}

impl WorkflowError {
    pub fn class(&self) -> ErrorClass {
        match self {
            WorkflowError::ProcessNotFound(_)
            | WorkflowError::StageNotFound(_)
            | WorkflowError::StepNotFound { .. } => ErrorClass::NotFound,
            WorkflowError::Forbidden { .. } | WorkflowError::FieldNotAllowed(_) => {
                ErrorClass::Forbidden
            }
            WorkflowError::AlreadyCompleted
            | WorkflowError::NotRejectable { .. }
            | WorkflowError::CommentRequired(_)
            | WorkflowError::Conflict(_)
            | WorkflowError::WrongStage { .. }
            | WorkflowError::DocumentAlreadyLinked(_)
            | WorkflowError::DocumentKindMismatch { .. } => ErrorClass::BadRequest,
            WorkflowError::Config(_)
            | WorkflowError::Io(_)
            | WorkflowError::Json(_)
            | WorkflowError::Toml(_) => ErrorClass::Internal,
        }
    }

    /// HTTP-equivalent status code for this error.
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::BadRequest => 400,
            ErrorClass::Forbidden => 403,
            ErrorClass::NotFound => 404,
            ErrorClass::Internal => 500,
        }
    }

    /// Treat a failed lookup of a stored position as corruption.
    ///
    /// Stage and step misses are caller errors when the name came from the
    /// caller, but a persisted position that no longer resolves means the
    /// store and the definition have drifted apart.
    pub fn stored_position(self) -> Self {
        match self {
            WorkflowError::StageNotFound(_) | WorkflowError::StepNotFound { .. } => {
                WorkflowError::Config(format!("stored position does not resolve: {self}"))
            }
            other => other,
        }
    }

    /// Message safe to show a caller. Internal errors are not echoed verbatim.
    pub fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::Internal => "Internal workflow error".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn forbidden_message_names_role() {
        let err = WorkflowError::Forbidden {
            required_role: "QC".into(),
        };
        assert_eq!(err.to_string(), "Required group: 'QC'.");
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn caller_errors_are_bad_requests() {
        let id = ProcessId::from(Uuid::nil());
        for err in [
            WorkflowError::AlreadyCompleted,
            WorkflowError::NotRejectable {
                stage: "product".into(),
                step: 1,
            },
            WorkflowError::CommentRequired("Must provide a rejection description.".into()),
            WorkflowError::Conflict(id),
        ] {
            assert_eq!(err.class(), ErrorClass::BadRequest);
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = WorkflowError::Config("stage 'license' has no steps".into());
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.public_message(), "Internal workflow error");
    }

    #[test]
    fn not_found_variants() {
        let err = WorkflowError::ProcessNotFound(ProcessId::from(Uuid::nil()));
        assert_eq!(err.class(), ErrorClass::NotFound);
        let err = WorkflowError::StepNotFound {
            stage: "license".into(),
            step: 9,
        };
        assert_eq!(err.status_code(), 404);
        assert_eq!(WorkflowError::StageNotFound("packaging".into()).status_code(), 404);
    }

    #[test]
    fn stored_position_misses_become_internal() {
        let err = WorkflowError::StageNotFound("spooling".into()).stored_position();
        assert!(matches!(err, WorkflowError::Config(ref m) if m.contains("spooling")));
        assert_eq!(err.status_code(), 500);

        let err = WorkflowError::AlreadyCompleted.stored_position();
        assert!(matches!(err, WorkflowError::AlreadyCompleted));
    }

    #[test]
    fn error_class_display() {
        assert_eq!(ErrorClass::BadRequest.to_string(), "BadRequest");
        assert_eq!(ErrorClass::Internal.to_string(), "Internal");
    }
}
