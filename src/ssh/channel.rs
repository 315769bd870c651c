//! Execution channel abstraction
//!
//! [`ExecSession`] and [`ExecChannel`] are the seam between the command
//! engine and the SSH library. The engine only ever sees a flat sequence of
//! [`ChannelEvent`]s, which keeps it independent of russh's message types.

use std::sync::Arc;

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use crate::error::{AdminError, Result};

/// One thing that happened on an execution channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes on the command's standard output
    Stdout(Vec<u8>),
    /// Bytes on the command's standard error
    Stderr(Vec<u8>),
    /// The command exited with a status
    ExitStatus(u32),
    /// The command was killed by a signal
    ExitSignal(String),
    /// The remote end will send no more output
    Eof,
    /// The remote end closed the channel
    Close,
}

/// A live session able to open execution channels
#[async_trait]
pub trait ExecSession: Send + Sync {
    type Channel: ExecChannel + 'static;

    /// Open one execution channel; fails once the session is closed
    async fn open_channel(&self) -> Result<Self::Channel>;

    /// Close the session. Idempotent.
    async fn close(&self);
}

#[async_trait]
impl<S: ExecSession> ExecSession for Arc<S> {
    type Channel = S::Channel;

    async fn open_channel(&self) -> Result<Self::Channel> {
        (**self).open_channel().await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// One remote command invocation
#[async_trait]
pub trait ExecChannel: Send {
    /// Request execution of `command`
    async fn exec(&mut self, command: &str) -> Result<()>;

    /// Write bytes to the command's standard input
    async fn send_input(&mut self, data: &[u8]) -> Result<()>;

    /// Signal end of standard input
    async fn close_input(&mut self) -> Result<()>;

    /// Next event, or `None` once the channel is gone
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel
    async fn close(&mut self) -> Result<()>;
}

/// [`ExecChannel`] over a russh session channel
pub struct RusshChannel {
    inner: Channel<Msg>,
}

impl RusshChannel {
    pub(crate) fn new(inner: Channel<Msg>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ExecChannel for RusshChannel {
    async fn exec(&mut self, command: &str) -> Result<()> {
        self.inner
            .exec(true, command)
            .await
            .map_err(AdminError::transport)
    }

    async fn send_input(&mut self, data: &[u8]) -> Result<()> {
        self.inner.data(data).await.map_err(AdminError::transport)
    }

    async fn close_input(&mut self) -> Result<()> {
        self.inner.eof().await.map_err(AdminError::transport)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            if let Some(event) = channel_event(self.inner.wait().await?) {
                return Some(event);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await.map_err(AdminError::transport)
    }
}

/// Map a russh channel message to an event; `None` for messages the
/// engine has no use for (window adjustments, request replies, ...)
fn channel_event(msg: ChannelMsg) -> Option<ChannelEvent> {
    let event = match msg {
        ChannelMsg::Data { data } => ChannelEvent::Stdout(data.to_vec()),
        // ext == 1 is stderr; anything else is folded into stdout
        ChannelMsg::ExtendedData { data, ext } if ext == 1 => ChannelEvent::Stderr(data.to_vec()),
        ChannelMsg::ExtendedData { data, .. } => ChannelEvent::Stdout(data.to_vec()),
        ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
        ChannelMsg::ExitSignal { signal_name, .. } => {
            ChannelEvent::ExitSignal(format!("{:?}", signal_name))
        }
        ChannelMsg::Eof => ChannelEvent::Eof,
        ChannelMsg::Close => ChannelEvent::Close,
        _ => return None,
    };
    Some(event)
}

impl std::fmt::Debug for RusshChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshChannel")
            .field("id", &self.inner.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::Sig;

    #[test]
    fn test_data_is_stdout() {
        let msg = ChannelMsg::Data {
            data: b"hello\n".to_vec().into(),
        };
        assert_eq!(
            channel_event(msg),
            Some(ChannelEvent::Stdout(b"hello\n".to_vec()))
        );
    }

    #[test]
    fn test_extended_data_type_one_is_stderr() {
        let msg = ChannelMsg::ExtendedData {
            data: b"oops\n".to_vec().into(),
            ext: 1,
        };
        assert_eq!(
            channel_event(msg),
            Some(ChannelEvent::Stderr(b"oops\n".to_vec()))
        );
    }

    #[test]
    fn test_other_extended_data_is_stdout() {
        let msg = ChannelMsg::ExtendedData {
            data: b"odd\n".to_vec().into(),
            ext: 7,
        };
        assert_eq!(
            channel_event(msg),
            Some(ChannelEvent::Stdout(b"odd\n".to_vec()))
        );
    }

    #[test]
    fn test_exit_status_and_signal() {
        assert_eq!(
            channel_event(ChannelMsg::ExitStatus { exit_status: 3 }),
            Some(ChannelEvent::ExitStatus(3))
        );

        let msg = ChannelMsg::ExitSignal {
            signal_name: Sig::KILL,
            core_dumped: false,
            error_message: String::new(),
            lang_tag: String::new(),
        };
        assert_eq!(
            channel_event(msg),
            Some(ChannelEvent::ExitSignal("KILL".to_string()))
        );
    }

    #[test]
    fn test_end_of_channel() {
        assert_eq!(channel_event(ChannelMsg::Eof), Some(ChannelEvent::Eof));
        assert_eq!(channel_event(ChannelMsg::Close), Some(ChannelEvent::Close));
    }

    #[test]
    fn test_unrelated_messages_are_skipped() {
        assert_eq!(channel_event(ChannelMsg::Success), None);
        assert_eq!(channel_event(ChannelMsg::WindowAdjusted { new_size: 4096 }), None);
    }
}
