use std::any::{Any, TypeId};
use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{RegistryError, Result};
use crate::message::{Message, UnknownMessage, VoidResponse};

/// Serializer id reserved for [`VoidResponse`].
pub const VOID_RESPONSE_ID: i32 = 0;

/// A codec between one message type and its payload bytes.
///
/// Implementations are registered once, under their [`id`](Self::id), and
/// are shared across tasks.
pub trait Serializer: Send + Sync + 'static {
    /// The message type this serializer owns.
    type Value: Any + Send;

    /// Stable id written in front of every payload.
    fn id(&self) -> i32;

    /// Append the payload for `value`.
    fn serialize(&self, value: &Self::Value, out: &mut BytesMut) -> Result<()>;

    /// Read a value from the payload. `input` holds exactly one payload.
    fn deserialize(&self, input: &mut Bytes) -> Result<Self::Value>;
}

/// Type-erased view of a [`Serializer`], as stored in the registry.
pub trait DynSerializer: Send + Sync {
    /// Stable id written in front of every payload.
    fn id(&self) -> i32;

    /// Runtime type of the values this serializer handles.
    fn value_type_id(&self) -> TypeId;

    /// Type name of the values this serializer handles.
    fn value_type_name(&self) -> &'static str;

    /// Append the payload for `message`.
    fn serialize_message(&self, message: &Message, out: &mut BytesMut) -> Result<()>;

    /// Decode one payload into a message.
    fn deserialize_message(&self, payload: Bytes) -> Result<Message>;
}

impl<S: Serializer> DynSerializer for S {
    fn id(&self) -> i32 {
        Serializer::id(self)
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<S::Value>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<S::Value>()
    }

    fn serialize_message(&self, message: &Message, out: &mut BytesMut) -> Result<()> {
        let value = message
            .downcast_ref::<S::Value>()
            .ok_or(RegistryError::TypeMismatch {
                id: Serializer::id(self),
                expected: std::any::type_name::<S::Value>(),
                actual: message.type_name(),
            })?;
        self.serialize(value, out)
    }

    fn deserialize_message(&self, mut payload: Bytes) -> Result<Message> {
        self.deserialize(&mut payload).map(Message::new)
    }
}

/// Pass-through for unregistered ids: drains the payload and yields an
/// [`UnknownMessage`] carrying the raw id.
#[derive(Debug, Clone, Copy)]
pub struct UnknownMessageSerializer {
    id: i32,
}

impl UnknownMessageSerializer {
    pub fn new(id: i32) -> Self {
        Self { id }
    }
}

impl DynSerializer for UnknownMessageSerializer {
    fn id(&self) -> i32 {
        self.id
    }

    fn value_type_id(&self) -> TypeId {
        TypeId::of::<UnknownMessage>()
    }

    fn value_type_name(&self) -> &'static str {
        std::any::type_name::<UnknownMessage>()
    }

    fn serialize_message(&self, _message: &Message, _out: &mut BytesMut) -> Result<()> {
        Err(RegistryError::Unsupported(self.id))
    }

    fn deserialize_message(&self, mut payload: Bytes) -> Result<Message> {
        let payload_len = payload.remaining();
        payload.advance(payload_len);
        Ok(Message::new(UnknownMessage {
            serializer_id: self.id,
            payload_len,
        }))
    }
}

/// Serializer for [`VoidResponse`]: id 0, empty payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct VoidResponseSerializer;

impl Serializer for VoidResponseSerializer {
    type Value = VoidResponse;

    fn id(&self) -> i32 {
        VOID_RESPONSE_ID
    }

    fn serialize(&self, _value: &VoidResponse, _out: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn deserialize(&self, input: &mut Bytes) -> Result<VoidResponse> {
        input.advance(input.remaining());
        Ok(VoidResponse)
    }
}

/// JSON serializer for any serde type, registered under a chosen id.
pub struct JsonSerializer<T> {
    id: i32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new(id: i32) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }
}

impl<T> Serializer for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    type Value = T;

    fn id(&self) -> i32 {
        self.id
    }

    fn serialize(&self, value: &T, out: &mut BytesMut) -> Result<()> {
        serde_json::to_writer(out.writer(), value)?;
        Ok(())
    }

    fn deserialize(&self, input: &mut Bytes) -> Result<T> {
        let value = serde_json::from_slice(input.chunk())?;
        input.advance(input.remaining());
        Ok(value)
    }
}
