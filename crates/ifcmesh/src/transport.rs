//! The two ways of reaching a geometry engine, behind one type

use crate::config::EngineConfig;
use crate::native::{NativeChannel, NativeEngine};
use crate::process::ProcessChannel;
use crate::protocol::{Command, CommandProtocol, ProtocolError, ACK_YES};
use crate::session::EngineError;

use std::ffi::OsStr;
use std::path::Path;
use tracing::{debug, warn};

/// An open connection to a geometry engine
pub enum Transport {
    /// Engine running as a child process, spoken to over its pipes
    Process(CommandProtocol<ProcessChannel>),
    /// Engine linked into this process
    Native(NativeChannel),
}

impl Transport {
    /// Launch an engine executable
    pub fn spawn<S, I, A>(program: S, args: I, config: &EngineConfig) -> Result<Self, EngineError>
    where
        S: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        let channel = ProcessChannel::spawn(program, args, config)?;
        Ok(Self::process(channel, config))
    }

    /// Use an already connected engine process
    pub fn process(channel: ProcessChannel, config: &EngineConfig) -> Self {
        Transport::Process(CommandProtocol::new(channel).with_traffic_logging(config.log_traffic))
    }

    /// Attach a native engine after checking its version
    pub fn native(engine: Box<dyn NativeEngine>, config: &EngineConfig) -> Result<Self, EngineError> {
        let channel = NativeChannel::new(engine, &config.engine_version)?;
        Ok(Transport::Native(channel))
    }

    /// Short name of the transport kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Transport::Process(_) => "process",
            Transport::Native(_) => "native",
        }
    }

    /// Hand serialized model bytes to the engine
    ///
    /// Returns the engine's verdict on the model.
    pub fn push_model(&mut self, data: &[u8]) -> Result<bool, ProtocolError> {
        match self {
            Transport::Process(protocol) => {
                let ack = protocol.send_text(&Command::LoadStdin)?;
                debug!("Engine acknowledged loadstdin: {}", ack);
                let verdict = protocol.send_payload(data)?;
                Ok(is_yes(&verdict, "model data"))
            }
            Transport::Native(native) => Ok(native.set_data(data)),
        }
    }

    /// Ask the engine to load a model file
    ///
    /// A process engine reads the path itself; for a native engine the file
    /// is read here and passed on as bytes.
    pub fn push_model_path(&mut self, path: &Path) -> Result<bool, ProtocolError> {
        match self {
            Transport::Process(protocol) => {
                let verdict =
                    protocol.send_text(&Command::Load(path.to_string_lossy().into_owned()))?;
                Ok(is_yes(&verdict, "load"))
            }
            Transport::Native(_) => {
                let data = std::fs::read(path)?;
                self.push_model(&data)
            }
        }
    }

    /// Release the engine
    ///
    /// Never fails; shutdown problems are logged by the channel.
    pub fn close(&mut self) {
        match self {
            Transport::Process(protocol) => protocol.channel_mut().close(),
            Transport::Native(_) => debug!("Releasing native geometry engine"),
        }
    }
}

fn is_yes(response: &str, what: &str) -> bool {
    let accepted = response.trim() == ACK_YES;
    if !accepted {
        warn!("Engine rejected {}: {:?}", what, response);
    }
    accepted
}
