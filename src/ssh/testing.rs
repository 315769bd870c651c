//! Scripted in-memory sessions for exercising the command engine

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::channel::{ChannelEvent, ExecChannel, ExecSession};
use crate::error::{AdminError, ExecErrorKind, Result};

/// What a fake channel does after `exec`
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Stdout(String),
    Stderr(String),
    Pause(Duration),
    Exit(u32),
    Signal(&'static str),
    Eof,
    Close,
}

impl Step {
    pub(crate) fn out(text: &str) -> Self {
        Step::Stdout(text.to_string())
    }

    pub(crate) fn err(text: &str) -> Self {
        Step::Stderr(text.to_string())
    }
}

/// `output` followed by a clean end of channel with `status`
pub(crate) fn exit_steps(status: u32, mut output: Vec<Step>) -> Vec<Step> {
    output.extend([Step::Eof, Step::Exit(status), Step::Close]);
    output
}

/// Calls the engine made, in order, across every channel of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recorded {
    Exec(String),
    Input(Vec<u8>),
    InputClosed,
    ChannelClosed,
}

/// A session whose channels replay fixed scripts
pub(crate) struct FakeSession {
    /// Script of the n-th channel; the last one repeats
    scripts: Vec<Vec<Step>>,
    fail_open: bool,
    fail_exec: bool,
    hang: bool,
    opened: AtomicUsize,
    closes: AtomicUsize,
    closed_tx: watch::Sender<bool>,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeSession {
    pub(crate) fn scripted(script: Vec<Step>) -> Self {
        Self::per_channel(vec![script])
    }

    /// One script per opened channel, in order
    pub(crate) fn per_channel(scripts: Vec<Vec<Step>>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            scripts,
            fail_open: false,
            fail_exec: false,
            hang: false,
            opened: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            closed_tx,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Standard successful exit with the given output
    pub(crate) fn exiting(status: u32, output: Vec<Step>) -> Self {
        Self::scripted(exit_steps(status, output))
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn failing_exec(mut self) -> Self {
        self.fail_exec = true;
        self
    }

    /// After the script runs out, block until the session is closed
    pub(crate) fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub(crate) fn channels_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Times the session was actually torn down
    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn recorded(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Exec(command) => Some(command),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ExecSession for FakeSession {
    type Channel = FakeChannel;

    async fn open_channel(&self) -> Result<FakeChannel> {
        if self.fail_open || *self.closed_tx.borrow() {
            return Err(AdminError::exec(
                ExecErrorKind::ChannelOpenFailed,
                "administratively prohibited",
            ));
        }
        let index = self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(index)
            .or_else(|| self.scripts.last())
            .cloned()
            .unwrap_or_default();
        Ok(FakeChannel {
            script: script.into(),
            fail_exec: self.fail_exec,
            hang: self.hang,
            closed_rx: self.closed_tx.subscribe(),
            log: Arc::clone(&self.log),
        })
    }

    async fn close(&self) {
        if !self.closed_tx.send_replace(true) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

pub(crate) struct FakeChannel {
    script: VecDeque<Step>,
    fail_exec: bool,
    hang: bool,
    closed_rx: watch::Receiver<bool>,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeChannel {
    fn record(&self, entry: Recorded) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl ExecChannel for FakeChannel {
    async fn exec(&mut self, command: &str) -> Result<()> {
        if self.fail_exec {
            return Err(AdminError::transport("exec request rejected"));
        }
        self.record(Recorded::Exec(command.to_string()));
        Ok(())
    }

    async fn send_input(&mut self, data: &[u8]) -> Result<()> {
        self.record(Recorded::Input(data.to_vec()));
        Ok(())
    }

    async fn close_input(&mut self) -> Result<()> {
        self.record(Recorded::InputClosed);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        while let Some(step) = self.script.pop_front() {
            let event = match step {
                Step::Pause(duration) => {
                    tokio::time::sleep(duration).await;
                    continue;
                }
                Step::Stdout(text) => ChannelEvent::Stdout(text.into_bytes()),
                Step::Stderr(text) => ChannelEvent::Stderr(text.into_bytes()),
                Step::Exit(status) => ChannelEvent::ExitStatus(status),
                Step::Signal(name) => ChannelEvent::ExitSignal(name.to_string()),
                Step::Eof => ChannelEvent::Eof,
                Step::Close => ChannelEvent::Close,
            };
            return Some(event);
        }

        if self.hang {
            let _ = self.closed_rx.wait_for(|closed| *closed).await;
        }
        None
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Recorded::ChannelClosed);
        Ok(())
    }
}
