use std::time::Duration;

use pipechan_transport::UnixDomainSocket;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::debug;

use crate::error::{ChannelError, Result};

/// Exclusive owner of the listening socket and the loop task.
///
/// [`release`](Self::release) aborts the loop (dropping its stream) and drops
/// the listener (removing the socket file). It runs at most once, either
/// from `dispose` or from `Drop`.
pub(crate) struct ChannelHandle {
    socket: Option<UnixDomainSocket>,
    loop_task: Option<AbortHandle>,
}

impl ChannelHandle {
    pub(crate) fn new(socket: UnixDomainSocket) -> Self {
        Self {
            socket: Some(socket),
            loop_task: None,
        }
    }

    pub(crate) fn socket(&self) -> Option<&UnixDomainSocket> {
        self.socket.as_ref()
    }

    pub(crate) fn attach(&mut self, loop_task: AbortHandle) {
        self.loop_task = Some(loop_task);
    }

    pub(crate) fn is_released(&self) -> bool {
        self.socket.is_none()
    }

    pub(crate) fn release(&mut self) {
        if let Some(task) = self.loop_task.take() {
            if !task.is_finished() {
                debug!("aborting channel loop");
            }
            task.abort();
        }
        if let Some(socket) = self.socket.take() {
            debug!(path = ?socket.path(), "releasing channel socket");
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Wait up to `bound` for the loop task and surface its outcome.
pub(crate) async fn join_bounded(task: &mut JoinHandle<Result<()>>, bound: Duration) -> Result<()> {
    match tokio::time::timeout(bound, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join)) => Err(ChannelError::LoopAborted(join.to_string())),
        Err(_) => Err(ChannelError::DisposalTimeout(bound)),
    }
}
