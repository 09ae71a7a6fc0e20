use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Not an `{entity}-{action}` name this client knows.
    #[error("unrecognised event name '{0}'")]
    UnknownEvent(String),

    #[error("malformed event frame: {0}")]
    MalformedFrame(String),

    /// The `data:` body of a change event is not the expected JSON.
    #[error("event data is not valid JSON: {0}")]
    Data(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Data(err.to_string())
    }
}
