use thiserror::Error;

/// Errors surfaced to UI callers. None of them are fatal to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavError {
    /// The label did not resolve to exactly one held file.
    #[error("document \"{0}\" not found")]
    DocumentNotFound(String),

    #[error("viewer is not ready")]
    NotReady,

    #[error("no active search")]
    NoActiveSearch,

    #[error("\"{text}\" not found on page {page}")]
    HighlightNotFound { page: u32, text: String },

    /// The widget runtime or a preview initialization failed.
    #[error("PDF viewer failed to load: {0}")]
    WidgetLoadFailed(String),

    #[error("viewer did not become ready within {0} ms")]
    ReadyTimeout(u64),

    #[error("viewer call failed: {0}")]
    WidgetCall(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl NavError {
    pub(crate) fn widget_call(err: anyhow::Error) -> Self {
        NavError::WidgetCall(format!("{err:#}"))
    }

    pub(crate) fn widget_load(err: anyhow::Error) -> Self {
        NavError::WidgetLoadFailed(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
