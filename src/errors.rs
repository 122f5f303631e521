use std::fmt;

/// The three independent asynchronous pipelines a session can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pipeline {
    Face,
    Scene,
    Suggestions,
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Pipeline::Face => "Face generation",
            Pipeline::Scene => "Scene creation",
            Pipeline::Suggestions => "Idea generation",
        };
        f.write_str(label)
    }
}

/// Every failure the workflow surfaces. The `Display` output is the
/// message shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    GenerationFailed(String),
    #[error("{0}")]
    SuggestionParse(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{0} is already in progress.")]
    Busy(Pipeline),
}

impl WorkflowError {
    pub fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(message.into())
    }

    pub fn generation(message: impl Into<String>) -> Self {
        WorkflowError::GenerationFailed(message.into())
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
