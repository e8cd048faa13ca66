use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use pipechan_frame::{Frame, WriteAccumulator};
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::message::Message;
use crate::serializer::{DynSerializer, Serializer, UnknownMessageSerializer};

/// Bidirectional map between message types and serializer ids.
///
/// Built once before traffic flows; share it as `Arc<SerializerRegistry>`
/// afterwards so registrations cannot change.
#[derive(Default)]
pub struct SerializerRegistry {
    by_id: HashMap<i32, Arc<dyn DynSerializer>>,
    by_type: HashMap<TypeId, Arc<dyn DynSerializer>>,
}

impl SerializerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a serializer for its value type.
    ///
    /// Fails if either the id or the value type is already taken; the
    /// registry is unchanged on failure.
    pub fn register<S: Serializer>(&mut self, serializer: S) -> Result<()> {
        let serializer: Arc<dyn DynSerializer> = Arc::new(serializer);
        let id = serializer.id();
        let type_id = serializer.value_type_id();

        if self.by_id.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        if self.by_type.contains_key(&type_id) {
            return Err(RegistryError::DuplicateType(serializer.value_type_name()));
        }

        debug!(
            serializer_id = id,
            value_type = serializer.value_type_name(),
            "registered serializer"
        );
        self.by_id.insert(id, Arc::clone(&serializer));
        self.by_type.insert(type_id, serializer);
        Ok(())
    }

    /// Resolve the serializer for a frame's id.
    ///
    /// With `skip_unknown`, an unregistered id resolves to an
    /// [`UnknownMessageSerializer`] instead of failing.
    pub fn lookup_by_id(&self, id: i32, skip_unknown: bool) -> Result<Arc<dyn DynSerializer>> {
        match self.by_id.get(&id) {
            Some(serializer) => Ok(Arc::clone(serializer)),
            None if skip_unknown => Ok(Arc::new(UnknownMessageSerializer::new(id))),
            None => Err(RegistryError::UnknownSerializerId(id)),
        }
    }

    /// Resolve the serializer for a message's runtime type.
    pub fn lookup_by_type(&self, message: &Message) -> Result<Arc<dyn DynSerializer>> {
        self.by_type
            .get(&message.type_id())
            .cloned()
            .ok_or(RegistryError::UnregisteredType(message.type_name()))
    }

    /// Decode a reassembled frame into a message.
    pub fn decode(&self, frame: Frame, skip_unknown: bool) -> Result<Message> {
        let serializer = self.lookup_by_id(frame.serializer_id, skip_unknown)?;
        serializer.deserialize_message(frame.payload)
    }

    /// Serialize `message` and stage it as a frame; returns the serializer id used.
    pub fn encode(&self, message: &Message, out: &mut WriteAccumulator) -> Result<i32> {
        let serializer = self.lookup_by_type(message)?;
        serializer.serialize_message(message, out.payload_mut())?;
        Ok(serializer.id())
    }

    /// Check if an id is registered.
    pub fn contains_id(&self, id: i32) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
