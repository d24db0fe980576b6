use std::path::PathBuf;

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

/// Top-level error type for inscript operations
#[derive(Debug, Error, Diagnostic)]
pub enum InscriptError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("editor session has shut down")]
    #[diagnostic(code(session::closed))]
    SessionClosed,

    #[error("no post is open")]
    #[diagnostic(code(session::no_post), help("open or create a post first"))]
    NoPost,
}

/// Draft store errors.
///
/// These are transient from the editor's point of view: local history stays
/// authoritative and the next successful write reconciles the store.
#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("failed to access draft for {post_id} at {}", path.display())]
    #[diagnostic(code(sync::io))]
    Io {
        post_id: SmolStr,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode draft for {post_id}: {message}")]
    #[diagnostic(code(sync::encode))]
    Encode { post_id: SmolStr, message: String },

    #[error("failed to decode draft for {post_id}: {message}")]
    #[diagnostic(code(sync::decode))]
    Decode { post_id: SmolStr, message: String },

    #[error("draft store unavailable: {message}")]
    #[diagnostic(code(sync::unavailable))]
    Unavailable { message: String },

    #[error("invalid post identifier: {post_id:?}")]
    #[diagnostic(
        code(sync::invalid_id),
        help("post identifiers are plain file names without path separators")
    )]
    InvalidPostId { post_id: SmolStr },
}

/// Errors while fetching or hydrating a post.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("post not found: {post_id}")]
    #[diagnostic(code(load::not_found))]
    NotFound { post_id: SmolStr },

    #[error("invalid post identifier: {post_id:?}")]
    #[diagnostic(
        code(load::invalid_id),
        help("post identifiers are plain file names without path separators")
    )]
    InvalidPostId { post_id: SmolStr },

    #[error("failed to read post {post_id} from {}", path.display())]
    #[diagnostic(code(load::io))]
    Io {
        post_id: SmolStr,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove post {post_id} at {}", path.display())]
    #[diagnostic(code(load::remove))]
    Remove {
        post_id: SmolStr,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid frontmatter in {post_id}: {message}")]
    #[diagnostic(code(load::frontmatter))]
    Frontmatter { post_id: SmolStr, message: String },

    #[error("failed to read draft for {post_id}")]
    #[diagnostic(code(load::draft))]
    Draft {
        post_id: SmolStr,
        #[source]
        source: SyncError,
    },
}

/// Publish workflow errors
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    #[error("{step} step failed: {message}")]
    #[diagnostic(code(workflow::step))]
    StepFailed { step: SmolStr, message: String },

    #[error("commit message must not be empty")]
    #[diagnostic(code(workflow::commit_message))]
    EmptyCommitMessage,

    #[error("workflow is not waiting for a commit message")]
    #[diagnostic(code(workflow::not_paused))]
    NotPaused,

    #[error("cannot cancel from step {index}: step {current} is already underway")]
    #[diagnostic(
        code(workflow::cancel),
        help("only steps after the current one can be removed")
    )]
    InvalidCancel { index: usize, current: usize },

    #[error("push is disabled")]
    #[diagnostic(code(workflow::push_disabled), help("set ALLOW_PUSH=true to enable pushing"))]
    PushDisabled,
}

/// Failure of a single external publish step.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(workflow::step_error))]
pub struct StepError {
    pub message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<InscriptError> for StepError {
    fn from(err: InscriptError) -> Self {
        Self::new(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {message}")]
    #[diagnostic(
        code(config::invalid),
        help("fix or unset {var} in your environment or .env file")
    )]
    Invalid {
        var: &'static str,
        value: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, InscriptError>;
