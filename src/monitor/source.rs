//! Log line sources
//!
//! A [`SourceConnector`] opens a fresh [`LineSource`] each time the
//! supervisor (re)connects. Production reads the watchtower unit's journal;
//! tests feed lines through a channel.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;

/// Line source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

/// An open stream of text lines
#[async_trait]
pub trait LineSource: Send {
    /// Next line, or `Ok(None)` at end of stream
    async fn next_line(&mut self) -> Result<Option<String>, SourceError>;
}

/// Opens line sources
#[async_trait]
pub trait SourceConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Follows a systemd unit's journal from the current end
#[derive(Debug, Clone)]
pub struct JournalConnector {
    program: String,
    unit: String,
}

impl JournalConnector {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            program: "journalctl".to_string(),
            unit: unit.into(),
        }
    }

    /// Use a different journal reader binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl SourceConnector for JournalConnector {
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError> {
        let mut child = Command::new(&self.program)
            .args(["-u", &self.unit, "-f", "-n", "0"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Unavailable("journal reader has no stdout".to_string()))?;

        Ok(Box::new(JournalSource {
            _child: child,
            lines: BufReader::new(stdout).lines(),
        }))
    }

    fn describe(&self) -> String {
        format!("{} -u {}", self.program, self.unit)
    }
}

/// Output of a running journal reader; the process dies with this value
pub struct JournalSource {
    _child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

#[async_trait]
impl LineSource for JournalSource {
    async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.lines.next_line().await?)
    }
}

/// Lines pushed through an mpsc channel
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl LineSource for ChannelSource {
    async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        Ok(self.rx.recv().await)
    }
}

/// Hands out queued channel sources, one per connect
///
/// Once the queue is drained, connecting fails with `Unavailable`.
pub struct ChannelConnector {
    pending: tokio::sync::Mutex<Vec<mpsc::Receiver<String>>>,
}

impl ChannelConnector {
    /// A connector with a single source; returns the sending side
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::from_receivers(vec![rx]), tx)
    }

    /// Sources are handed out in the given order
    pub fn from_receivers(mut receivers: Vec<mpsc::Receiver<String>>) -> Self {
        receivers.reverse();
        Self {
            pending: tokio::sync::Mutex::new(receivers),
        }
    }
}

#[async_trait]
impl SourceConnector for ChannelConnector {
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError> {
        match self.pending.lock().await.pop() {
            Some(rx) => Ok(Box::new(ChannelSource::new(rx))),
            None => Err(SourceError::Unavailable("no more channel sources".to_string())),
        }
    }

    fn describe(&self) -> String {
        "channel".to_string()
    }
}
