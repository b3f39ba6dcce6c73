//! Engine subprocess channel
//!
//! Pipes offer no blocking read with a timeout, so each output stream is
//! pumped by a background thread into a channel and the response wait polls
//! that channel. Whatever has arrived when the first bytes show up is the
//! whole response.

use crate::config::EngineConfig;
use crate::protocol::{Command, ProtocolError, ResponseChannel};
use crate::session::EngineError;

use crossbeam_channel::{Receiver, TryRecvError};
use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

const PUMP_CHUNK_SIZE: usize = 64 * 1024;

/// Limit on how long a response wait may poll
///
/// `Iterations` counts sleeps, so its wall-clock length depends on how long
/// the platform actually sleeps for `interval`. `Deadline` measures elapsed
/// time on a monotonic clock instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollBudget {
    /// Give up after `max` empty polls
    Iterations { max: u64, interval: Duration },
    /// Give up once `timeout` has elapsed
    Deadline { timeout: Duration, interval: Duration },
}

impl Default for PollBudget {
    fn default() -> Self {
        EngineConfig::default().poll_budget()
    }
}

impl PollBudget {
    /// Start tracking a single wait
    pub fn start(&self) -> PollWait {
        PollWait {
            budget: *self,
            polls: 0,
            started: Instant::now(),
        }
    }
}

/// An in-progress wait against a [`PollBudget`]
#[derive(Debug)]
pub struct PollWait {
    budget: PollBudget,
    polls: u64,
    started: Instant,
}

impl PollWait {
    /// Record an empty poll: sleep, then fail if the budget is spent
    pub fn tick(&mut self) -> Result<(), ProtocolError> {
        let interval = match self.budget {
            PollBudget::Iterations { interval, .. } | PollBudget::Deadline { interval, .. } => {
                interval
            }
        };
        thread::sleep(interval);
        self.polls += 1;

        let exhausted = match self.budget {
            PollBudget::Iterations { max, .. } => self.polls > max,
            PollBudget::Deadline { timeout, .. } => self.started.elapsed() >= timeout,
        };
        if exhausted {
            return Err(ProtocolError::Timeout { polls: self.polls });
        }
        Ok(())
    }

    /// Number of empty polls so far
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

/// Drains a byte stream on a background thread
struct StreamPump {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    disconnected: bool,
}

impl StreamPump {
    fn spawn<R: Read + Send + 'static>(name: &str, mut reader: R) -> io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();

        thread::Builder::new()
            .name(format!("ifcmesh-{name}"))
            .spawn(move || {
                let mut buf = vec![0u8; PUMP_CHUNK_SIZE];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            })?;

        Ok(Self {
            rx,
            pending: Vec::new(),
            disconnected: false,
        })
    }

    /// Number of bytes delivered so far and not yet taken
    fn available(&mut self) -> usize {
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        self.pending.len()
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn is_closed(&self) -> bool {
        self.disconnected && self.pending.is_empty()
    }
}

/// Channel to a running geometry engine process
pub struct ProcessChannel {
    child: Option<Child>,
    stdin: Option<Box<dyn Write + Send>>,
    stdout: StreamPump,
    stderr: StreamPump,
    budget: PollBudget,
    closed: bool,
}

impl ProcessChannel {
    /// Launch the engine executable and wait for its readiness message
    pub fn spawn<S, I, A>(program: S, args: I, config: &EngineConfig) -> Result<Self, EngineError>
    where
        S: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let program_name = program.as_ref().to_string_lossy().into_owned();
        info!("Launching geometry engine {}", program_name);

        let launch_error = |source: io::Error| EngineError::Launch {
            program: program_name.clone(),
            source,
        };

        let mut child = ProcessCommand::new(program.as_ref())
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(launch_error)?;

        let missing = || io::Error::new(io::ErrorKind::BrokenPipe, "engine stream not captured");
        let stdin = child.stdin.take().ok_or_else(|| launch_error(missing()))?;
        let stdout = child.stdout.take().ok_or_else(|| launch_error(missing()))?;
        let stderr = child.stderr.take().ok_or_else(|| launch_error(missing()))?;

        debug!("Engine process started with pid {}", child.id());

        let mut channel = Self::build(stdin, stdout, stderr, config).map_err(launch_error)?;
        channel.child = Some(child);
        channel.handshake()?;
        Ok(channel)
    }

    /// Wrap the streams of an engine launched elsewhere and wait for its
    /// readiness message
    pub fn from_streams<W, R, E>(
        stdin: W,
        stdout: R,
        stderr: E,
        config: &EngineConfig,
    ) -> Result<Self, EngineError>
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        let mut channel = Self::build(stdin, stdout, stderr, config).map_err(|source| {
            EngineError::Launch {
                program: "<attached>".to_string(),
                source,
            }
        })?;
        channel.handshake()?;
        Ok(channel)
    }

    fn build<W, R, E>(stdin: W, stdout: R, stderr: E, config: &EngineConfig) -> io::Result<Self>
    where
        W: Write + Send + 'static,
        R: Read + Send + 'static,
        E: Read + Send + 'static,
    {
        Ok(Self {
            child: None,
            stdin: Some(Box::new(stdin)),
            stdout: StreamPump::spawn("stdout", stdout)?,
            stderr: StreamPump::spawn("stderr", stderr)?,
            budget: config.poll_budget(),
            closed: false,
        })
    }

    fn handshake(&mut self) -> Result<(), EngineError> {
        let greeting = self.wait_for_data()?;
        info!(
            "Geometry engine ready: {}",
            String::from_utf8_lossy(&greeting).trim()
        );
        Ok(())
    }

    /// Get the budget applied to each response wait
    pub fn poll_budget(&self) -> PollBudget {
        self.budget
    }

    /// OS process id, if this channel launched the engine itself
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// True once [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Drain anything the engine wrote to stderr and log it
    pub fn print_errors(&mut self) -> Option<String> {
        if self.stderr.available() == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&self.stderr.take()).into_owned();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            warn!("Engine: {}", line);
        }
        Some(text)
    }

    /// Shut the engine down
    ///
    /// Drains stderr, asks the engine to exit and reaps the process. Errors
    /// are logged and otherwise ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("Closing geometry engine channel");

        self.print_errors();

        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin
                .write_all(Command::Exit.to_line().as_bytes())
                .and_then(|_| stdin.flush())
            {
                debug!("Ignoring error while sending exit: {}", e);
            }
        }

        if let Some(mut child) = self.child.take() {
            let mut wait = self.budget.start();
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        debug!("Engine exited with {}", status);
                        break;
                    }
                    Ok(None) => {
                        if wait.tick().is_err() {
                            debug!("Engine did not exit, killing it");
                            let _ = child.kill();
                            let _ = child.wait();
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("Ignoring error while waiting for engine: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

impl ResponseChannel for ProcessChannel {
    fn write_request(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "engine stdin closed"))?;
        stdin.write_all(bytes)?;
        stdin.flush()
    }

    fn wait_for_data(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let mut wait = self.budget.start();
        loop {
            let available = self.stdout.available();
            if available > 0 {
                trace!("{} bytes available after {} polls", available, wait.polls());
                return Ok(self.stdout.take());
            }
            if self.stdout.is_closed() {
                return Err(ProtocolError::ChannelClosed);
            }
            wait.tick()?;
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.close();
    }
}
