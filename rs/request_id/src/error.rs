use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RequestIdError {
    /// Conversion to a request id failed because the source did not contain
    /// the right number of bytes.
    #[error("expected a request id of length {expected_length} bytes, but got {given_length} bytes instead")]
    InvalidLength {
        given_length: usize,
        expected_length: usize,
    },
    #[error("request id is not valid hex: {0}")]
    InvalidHex(String),
    #[error("read_state path segments must not be empty")]
    EmptyPathSegment,
    #[error("identity failed to sign the request: {0}")]
    Signing(String),
}
