use thiserror::Error;

/// Failures from the ingest pipeline. Always logged and absorbed by callers rather
/// than surfaced to the client.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event {event_id} is missing a required field: {field}")]
    MalformedEvent { event_id: String, field: &'static str },

    #[error("sink insertion failed: {0}")]
    SinkFailed(String),
}
