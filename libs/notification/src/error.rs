use tnb_core::AdapterError;
use tnb_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("conversation reference is required")]
    MissingReference,
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error("adaptive card must not be empty")]
    EmptyCard,
    #[error("send error handler failed")]
    ErrorHandler(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NotificationError>;
