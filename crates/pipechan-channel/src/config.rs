use std::time::Duration;

use pipechan_frame::DEFAULT_MAX_FRAME_SIZE;

use crate::error::{ChannelError, Result};

/// Read buffer size per loop iteration.
pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 250_000;

/// How long disposal waits for the loop to finish.
pub const DEFAULT_DISPOSE_TIMEOUT: Duration = Duration::from_secs(90);

/// Channel behavior configuration.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Server instances the host may create for the same name. Only one
    /// connection is serviced per channel; must be at least 1.
    pub max_instances: usize,
    /// Decode unregistered serializer ids to `UnknownMessage` instead of failing.
    pub skip_unknown: bool,
    /// Maximum bytes requested from the stream per read.
    pub read_buffer_capacity: usize,
    /// Maximum frame size (serializer id + payload) in either direction.
    pub max_frame_size: usize,
    /// Upper bound on how long `dispose` waits for the loop.
    pub dispose_timeout: Duration,
    /// Permission mode for the socket file.
    pub socket_mode: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_instances: 1,
            skip_unknown: false,
            read_buffer_capacity: DEFAULT_READ_BUFFER_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            dispose_timeout: DEFAULT_DISPOSE_TIMEOUT,
            socket_mode: 0o600,
        }
    }
}

impl ChannelConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_instances == 0 {
            return Err(ChannelError::InvalidConfig(
                "max_instances must be at least 1".to_string(),
            ));
        }
        if self.read_buffer_capacity == 0 {
            return Err(ChannelError::InvalidConfig(
                "read_buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_size < pipechan_frame::SERIALIZER_ID_SIZE {
            return Err(ChannelError::InvalidConfig(format!(
                "max_frame_size must be at least {}",
                pipechan_frame::SERIALIZER_ID_SIZE
            )));
        }
        Ok(())
    }
}
