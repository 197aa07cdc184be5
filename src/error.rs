use thiserror::Error;

/// Errors surfaced by the lookup core.
///
/// An empty search result is not an error; callers get an empty list and a
/// "No files found" status instead.
#[derive(Error, Debug)]
pub enum LookupError {
    /// Settings are missing, blank or malformed. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A listing page failed (network, auth, missing bucket).
    #[error("Object store unavailable: {0}")]
    StoreUnavailable(String),

    /// A newer user action superseded this listing.
    #[error("Listing cancelled")]
    Cancelled,

    /// Search request with a blank folder or file name.
    #[error("{0}")]
    InvalidQuery(String),
}

impl LookupError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, LookupError>;
