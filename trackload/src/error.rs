use crate::api::Call;

/// Errors that abort a workload iteration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request was not delivered or was rejected by the tracking service.
    #[error(transparent)]
    Transport(#[from] TransportFailure),
    /// A response lacked an id that every later call of the iteration depends on.
    #[error("{call} response is missing `{field}`")]
    MissingField {
        /// The call whose response was incomplete.
        call: Call,
        /// Dotted path of the missing field.
        field: &'static str,
    },
    /// Errors encoding requests or decoding responses.
    #[error("serde error: {context}")]
    Serde {
        /// What was being encoded or decoded.
        context: String,
        /// The underlying error.
        #[source]
        cause: serde_json::Error,
    },
    /// Any error emitted while setting up the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
}

/// A failed delivery of a single request.
///
/// Whether this aborts an iteration depends on the call and on the
/// [`FailurePolicy`](crate::FailurePolicy) of the client.
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    /// The request could not be sent or its response could not be read.
    #[error("request to `{path}` failed")]
    Request {
        /// Path of the request, relative to the service root.
        path: String,
        /// The underlying error.
        #[source]
        cause: reqwest::Error,
    },
    /// The service answered with a non-success status code.
    #[error("request to `{path}` returned status {status}")]
    Status {
        /// Path of the request, relative to the service root.
        path: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;
