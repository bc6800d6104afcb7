use lazyblock_core::PayloadError;

pub type Result<T> = std::result::Result<T, ActivationError>;

/// Why an instance ended in the `error` state (or, for [`ActivationError::InvalidMarkup`],
/// why a page could not be read at all).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] PayloadError),

    #[error("content is {len} bytes, over the {max} byte limit")]
    Oversize { len: usize, max: usize },

    #[error("unsafe content rejected: {reason}")]
    UnsafeContent { reason: String },

    #[error("failed to inject content: {message}")]
    Injection { message: String },

    #[error("instance {id} is missing its payload or content region")]
    MissingContainer { id: String },

    #[error("failed to read page markup: {message}")]
    InvalidMarkup { message: String },
}

impl ActivationError {
    /// Security rejections also raise [`crate::LifecycleEvent::SecurityRejected`].
    pub fn is_security_rejection(&self) -> bool {
        matches!(self, ActivationError::UnsafeContent { .. })
    }
}
