use thiserror::Error;

/// Errors raised while building core domain values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Host identifier is blank")]
    BlankHost,
}
