//! Typed failures raised by the measurement loop and the raw protocol client.

use thiserror::Error;

/// A query returned data that cannot have come from the fixture tables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("range query starting at {first_id} returned no rows")]
    EmptyRange { first_id: i32 },
    #[error("range query starting at {first_id} returned id {id} outside [{first_id}, {last_id}]")]
    OutOfRange { first_id: i32, last_id: i32, id: i32 },
    #[error("range query starting at {first_id} returned {count} rows, at most {max} expected")]
    TooManyRows { first_id: i32, count: usize, max: usize },
    #[error("query for id {requested} returned id {returned}")]
    WrongRow { requested: i32, returned: i32 },
}

/// The raw client received something other than the expected message flow.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("server error {code}: {message}")]
    Server { code: String, message: String },
    #[error("unexpected {message} during {during}")]
    Unexpected {
        message: &'static str,
        during: &'static str,
    },
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuth(String),
    #[error("server requested a password but PGPASSWORD is not set")]
    MissingPassword,
    #[error("response did not start with BindComplete (got '{0}')")]
    MissingBindComplete(char),
    #[error("session left idle state (transaction status '{0}')")]
    NotIdle(char),
    #[error("response did not end with ReadyForQuery")]
    Unterminated,
    #[error("expected {expected} data rows, got {actual}")]
    RowCount { expected: String, actual: usize },
    #[error("connection closed by server")]
    Closed,
    #[error("failed to encode {0} message")]
    Encode(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
