//! Pluggable message serialization keyed by stable integer ids.
//!
//! Each message type is paired with exactly one [`Serializer`] and one id.
//! The [`SerializerRegistry`] is built once before traffic flows and is then
//! shared read-only by the channel that decodes requests and encodes
//! responses. Ids the registry does not know can optionally be tolerated, in
//! which case they decode to an [`UnknownMessage`] sentinel.

pub mod error;
pub mod message;
pub mod registry;
pub mod serializer;
pub mod wire;

pub use error::{RegistryError, Result};
pub use message::{Message, UnknownMessage, VoidResponse};
pub use registry::SerializerRegistry;
pub use serializer::{
    DynSerializer, JsonSerializer, Serializer, UnknownMessageSerializer, VoidResponseSerializer,
    VOID_RESPONSE_ID,
};
