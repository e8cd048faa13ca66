/// Errors that can occur while registering, resolving or running serializers.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Another serializer already owns this id.
    #[error("serializer id {0} is already registered")]
    DuplicateId(i32),

    /// Another serializer already owns this message type.
    #[error("message type {0} is already registered")]
    DuplicateType(&'static str),

    /// A frame carried an id nobody registered.
    #[error("no serializer registered for id {0}")]
    UnknownSerializerId(i32),

    /// A value of a type nobody registered was handed over for encoding.
    #[error("no serializer registered for type {0}")]
    UnregisteredType(&'static str),

    /// The serializer was handed a value of a different type.
    #[error("serializer {id} expects {expected}, got {actual}")]
    TypeMismatch {
        id: i32,
        expected: &'static str,
        actual: &'static str,
    },

    /// The serializer cannot encode values (decode-only).
    #[error("serializer {0} does not support serialization")]
    Unsupported(i32),

    /// The payload ended before a field could be read.
    #[error("payload truncated: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string field is not valid UTF-8.
    #[error("invalid utf-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A length field is negative or otherwise unusable.
    #[error("invalid field length {0}")]
    InvalidLength(i64),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame-level error while staging an encoded message.
    #[error("frame error: {0}")]
    Frame(#[from] pipechan_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
