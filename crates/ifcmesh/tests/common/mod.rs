//! Scripted stand-in for the geometry engine process

#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use ifcmesh::protocol::encode_geometry;
use ifcmesh::{EngineConfig, EngineSession, ProcessChannel, Transport};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One instance the scripted engine will serve
#[derive(Clone)]
pub struct ScriptedInstance {
    pub payload: Vec<u8>,
    pub entity_type: String,
}

impl ScriptedInstance {
    pub fn new(entity_type: &str, vertices: &[f32], indices: &[i32]) -> Self {
        Self {
            payload: encode_geometry(vertices, indices),
            entity_type: entity_type.to_string(),
        }
    }

    /// Instance whose geometry response is too short to decode
    pub fn malformed(entity_type: &str) -> Self {
        Self {
            payload: vec![1, 0, 0, 0],
            entity_type: entity_type.to_string(),
        }
    }
}

/// Engine behaviour for one test
#[derive(Clone)]
pub struct ScriptedEngine {
    pub instances: Vec<ScriptedInstance>,
    pub accept_model: bool,
    /// Never answer `get`
    pub silent_get: bool,
    pub stderr: Vec<u8>,
}

impl ScriptedEngine {
    pub fn new(instances: Vec<ScriptedInstance>) -> Self {
        Self {
            instances,
            accept_model: true,
            silent_get: false,
            stderr: Vec::new(),
        }
    }
}

/// What the engine saw during a test
#[derive(Default)]
pub struct EngineLog {
    pub commands: Vec<String>,
    pub model: Vec<u8>,
}

/// Reader side of an in-memory pipe
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

pub fn pipe() -> (Sender<Vec<u8>>, PipeReader) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (
        tx,
        PipeReader {
            rx,
            pending: Vec::new(),
        },
    )
}

enum InputState {
    Commands,
    AwaitingLength,
    Payload(usize),
}

/// Engine stdin: interprets commands and answers on stdout
pub struct EngineInput {
    script: ScriptedEngine,
    stdout: Option<Sender<Vec<u8>>>,
    buffer: Vec<u8>,
    state: InputState,
    cursor: usize,
    log: Arc<Mutex<EngineLog>>,
}

impl EngineInput {
    fn respond(&mut self, bytes: &[u8]) {
        if let Some(tx) = &self.stdout {
            let _ = tx.send(bytes.to_vec());
        }
    }

    fn respond_line(&mut self, line: &str) {
        self.respond(format!("{line}\n").as_bytes());
    }

    fn handle_command(&mut self, command: &str) {
        self.log.lock().unwrap().commands.push(command.to_string());

        if let InputState::AwaitingLength = self.state {
            let len = command.parse().expect("model length line");
            self.state = InputState::Payload(len);
            return;
        }

        match command {
            "loadstdin" => {
                self.state = InputState::AwaitingLength;
                self.respond_line("ok");
            }
            "get" => {
                if !self.script.silent_get {
                    let payload = self.script.instances[self.cursor].payload.clone();
                    self.respond(&payload);
                }
            }
            "type" => {
                let entity_type = self.script.instances[self.cursor].entity_type.clone();
                self.respond_line(&entity_type);
            }
            "next" => {
                self.cursor += 1;
                let more = self.cursor < self.script.instances.len();
                self.respond_line(if more { "y" } else { "n" });
            }
            "exit" => {
                self.stdout = None;
            }
            other if other.starts_with("load ") => {
                let verdict = if self.script.accept_model { "y" } else { "n" };
                self.respond_line(verdict);
            }
            other => self.respond_line(&format!("unknown command {other}")),
        }
    }

    fn process(&mut self) {
        loop {
            match self.state {
                InputState::Payload(len) => {
                    if self.buffer.len() < len {
                        return;
                    }
                    let model: Vec<u8> = self.buffer.drain(..len).collect();
                    self.log.lock().unwrap().model = model;
                    self.state = InputState::Commands;
                    let verdict = if self.script.accept_model { "y" } else { "n" };
                    self.respond_line(verdict);
                }
                _ => {
                    let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                        return;
                    };
                    let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                    let command = String::from_utf8_lossy(&line).trim().to_string();
                    self.handle_command(&command);
                }
            }
        }
    }
}

impl Write for EngineInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.stdout.is_none() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "engine exited"));
        }
        self.buffer.extend_from_slice(buf);
        self.process();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Config with a short response budget so failing tests fail quickly
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_max_poll_iterations(2_000)
        .with_poll_interval(Duration::from_millis(1))
}

/// Connect a process channel to a scripted engine
pub fn scripted_channel(
    script: ScriptedEngine,
    config: &EngineConfig,
) -> (ProcessChannel, Arc<Mutex<EngineLog>>) {
    let (out_tx, out_rx) = pipe();
    let (err_tx, err_rx) = pipe();
    out_tx
        .send(b"IfcOpenShell 0.3.0-rc3 ready\n".to_vec())
        .unwrap();
    if !script.stderr.is_empty() {
        err_tx.send(script.stderr.clone()).unwrap();
    }
    drop(err_tx);

    let log = Arc::new(Mutex::new(EngineLog::default()));
    let input = EngineInput {
        script,
        stdout: Some(out_tx),
        buffer: Vec::new(),
        state: InputState::Commands,
        cursor: 0,
        log: Arc::clone(&log),
    };

    let channel = ProcessChannel::from_streams(input, out_rx, err_rx, config)
        .expect("scripted engine handshake");
    (channel, log)
}

/// Start a session against a scripted engine
pub fn scripted_session(script: ScriptedEngine) -> (EngineSession, Arc<Mutex<EngineLog>>) {
    let config = test_config();
    let (channel, log) = scripted_channel(script, &config);
    (EngineSession::new(Transport::process(channel, &config)), log)
}

/// Vertices for `n` points along a line
pub fn line_vertices(n: usize) -> Vec<f32> {
    (0..n).flat_map(|i| [i as f32, 0.0, 0.0]).collect()
}

/// Fan triangulation over `n` local vertices
pub fn fan_indices(n: usize) -> Vec<i32> {
    (1..n as i32 - 1).flat_map(|i| [0, i, i + 1]).collect()
}
