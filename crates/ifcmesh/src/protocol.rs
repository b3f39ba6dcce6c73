//! Command protocol spoken with the geometry engine process
//!
//! Requests are single text lines. Responses carry no framing: whatever the
//! engine has written by the time the channel reports data is the response.
//! Geometry responses are raw binary in the host's native byte order:
//!
//! ```text
//! i32 vertex_count | vertex_count * 3 f32 | i32 face_count | face_count * 3 i32
//! ```

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Cursor};
use thiserror::Error;
use tracing::{debug, trace};

/// Smallest geometry payload the engine can legally send (two counts)
pub const MIN_GEOMETRY_PAYLOAD: usize = 8;

/// Stand-in for binary bodies in traffic logs
pub const BINARY_PLACEHOLDER: &str = "<binary data>";

/// Acknowledgement the engine sends for "yes"/"continue"
pub const ACK_YES: &str = "y";

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("No response from engine after {polls} polls")]
    Timeout { polls: u64 },

    #[error("Invalid geometry payload of {len} bytes: {reason}")]
    InvalidPayload { len: usize, reason: &'static str },

    #[error("Engine channel closed")]
    ChannelClosed,
}

/// Commands understood by the engine process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Announce that model data follows on stdin
    LoadStdin,
    /// Byte length of the model payload that follows
    Length(usize),
    /// Load a model from a path readable by the engine
    Load(String),
    /// Fetch the current instance's geometry (binary response)
    Get,
    /// Fetch the current instance's entity type
    Type,
    /// Advance to the next instance
    Next,
    /// Terminate the engine
    Exit,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::LoadStdin => f.write_str("loadstdin"),
            Command::Length(len) => write!(f, "{len}"),
            Command::Load(path) => write!(f, "load {path}"),
            Command::Get => f.write_str("get"),
            Command::Type => f.write_str("type"),
            Command::Next => f.write_str("next"),
            Command::Exit => f.write_str("exit"),
        }
    }
}

impl Command {
    /// Encode the command as a single request line
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

/// A byte channel with request/response semantics
pub trait ResponseChannel {
    /// Write request bytes and flush them to the engine
    fn write_request(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Block until response bytes are available and return all of them
    fn wait_for_data(&mut self) -> Result<Vec<u8>, ProtocolError>;
}

/// Half-duplex command protocol over a response channel
///
/// Every request waits for its response before returning, so a new command
/// is never written while a previous response is still pending.
pub struct CommandProtocol<C> {
    channel: C,
    log_traffic: bool,
}

impl<C: ResponseChannel> CommandProtocol<C> {
    /// Create a new protocol handler
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            log_traffic: false,
        }
    }

    /// Log every request and response at debug level
    pub fn with_traffic_logging(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    /// Send a command and decode the response as text
    ///
    /// Trailing line terminators are stripped from the response.
    pub fn send_text(&mut self, command: &Command) -> Result<String, ProtocolError> {
        self.write_line(command)?;
        let text = self.read_text()?;
        Ok(text)
    }

    /// Send a command and return the raw response bytes
    pub fn send_binary(&mut self, command: &Command) -> Result<Vec<u8>, ProtocolError> {
        self.write_line(command)?;
        let response = self.channel.wait_for_data()?;
        if self.log_traffic {
            debug!("<<< {} ({} bytes)", BINARY_PLACEHOLDER, response.len());
        }
        Ok(response)
    }

    /// Send a length-prefixed binary payload and decode the text acknowledgement
    pub fn send_payload(&mut self, payload: &[u8]) -> Result<String, ProtocolError> {
        let mut request = Command::Length(payload.len()).to_line().into_bytes();
        request.extend_from_slice(payload);
        if self.log_traffic {
            debug!(">>> {} {}", payload.len(), BINARY_PLACEHOLDER);
        }
        self.channel.write_request(&request)?;
        self.read_text()
    }

    /// Wait for a response that was not solicited by a command
    pub fn read_text(&mut self) -> Result<String, ProtocolError> {
        let response = self.channel.wait_for_data()?;
        let text = String::from_utf8_lossy(&response)
            .trim_end_matches(['\r', '\n'])
            .to_string();
        if self.log_traffic {
            debug!("<<< {}", text);
        }
        Ok(text)
    }

    /// Borrow the underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutably borrow the underlying channel
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Take back the underlying channel
    pub fn into_inner(self) -> C {
        self.channel
    }

    fn write_line(&mut self, command: &Command) -> Result<(), ProtocolError> {
        if self.log_traffic {
            debug!(">>> {}", command);
        }
        self.channel.write_request(command.to_line().as_bytes())?;
        Ok(())
    }
}

/// Decode a binary geometry response into vertices and triangle indices
pub fn decode_geometry(payload: &[u8]) -> Result<(Vec<f32>, Vec<i32>), ProtocolError> {
    let len = payload.len();
    if len < MIN_GEOMETRY_PAYLOAD {
        return Err(ProtocolError::InvalidPayload {
            len,
            reason: "shorter than the count header",
        });
    }

    let mut reader = Cursor::new(payload);
    let vertex_count = read_count(&mut reader, len)?;
    let vertex_bytes = section_size(vertex_count, len)?;
    // The face count must still fit after the vertex section
    if vertex_bytes.saturating_add(8) > len {
        return Err(ProtocolError::InvalidPayload {
            len,
            reason: "vertex count exceeds payload",
        });
    }

    let mut vertices = Vec::with_capacity(vertex_count * 3);
    for _ in 0..vertex_count * 3 {
        vertices.push(reader.read_f32::<NativeEndian>()?);
    }

    let face_count = read_count(&mut reader, len)?;
    let face_bytes = section_size(face_count, len)?;
    if vertex_bytes.saturating_add(face_bytes).saturating_add(8) > len {
        return Err(ProtocolError::InvalidPayload {
            len,
            reason: "face count exceeds payload",
        });
    }

    let mut indices = Vec::with_capacity(face_count * 3);
    for _ in 0..face_count * 3 {
        indices.push(reader.read_i32::<NativeEndian>()?);
    }

    let trailing = len - reader.position() as usize;
    if trailing > 0 {
        trace!("Ignoring {} trailing bytes after geometry", trailing);
    }

    Ok((vertices, indices))
}

/// Encode vertices and triangle indices in the engine's geometry wire format
pub fn encode_geometry(vertices: &[f32], indices: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + (vertices.len() + indices.len()) * 4);
    // Writing into a Vec cannot fail
    let _ = out.write_i32::<NativeEndian>((vertices.len() / 3) as i32);
    for &v in vertices {
        let _ = out.write_f32::<NativeEndian>(v);
    }
    let _ = out.write_i32::<NativeEndian>((indices.len() / 3) as i32);
    for &i in indices {
        let _ = out.write_i32::<NativeEndian>(i);
    }
    out
}

fn read_count(reader: &mut Cursor<&[u8]>, len: usize) -> Result<usize, ProtocolError> {
    let count = reader.read_i32::<NativeEndian>()?;
    usize::try_from(count).map_err(|_| ProtocolError::InvalidPayload {
        len,
        reason: "negative element count",
    })
}

fn section_size(count: usize, len: usize) -> Result<usize, ProtocolError> {
    count
        .checked_mul(12)
        .ok_or(ProtocolError::InvalidPayload {
            len,
            reason: "element count overflows",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Channel that records requests and replays canned responses
    #[derive(Default)]
    struct CannedChannel {
        written: Vec<u8>,
        responses: VecDeque<Vec<u8>>,
    }

    impl ResponseChannel for CannedChannel {
        fn write_request(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        fn wait_for_data(&mut self) -> Result<Vec<u8>, ProtocolError> {
            self.responses.pop_front().ok_or(ProtocolError::ChannelClosed)
        }
    }

    fn protocol_with(responses: &[&[u8]]) -> CommandProtocol<CannedChannel> {
        let channel = CannedChannel {
            written: Vec::new(),
            responses: responses.iter().map(|r| r.to_vec()).collect(),
        };
        CommandProtocol::new(channel).with_traffic_logging(true)
    }

    #[test]
    fn test_command_lines() {
        assert_eq!(Command::LoadStdin.to_line(), "loadstdin\n");
        assert_eq!(Command::Length(1024).to_line(), "1024\n");
        assert_eq!(Command::Load("/tmp/a.ifc".into()).to_line(), "load /tmp/a.ifc\n");
        assert_eq!(Command::Get.to_line(), "get\n");
        assert_eq!(Command::Type.to_line(), "type\n");
        assert_eq!(Command::Next.to_line(), "next\n");
        assert_eq!(Command::Exit.to_line(), "exit\n");
    }

    #[test]
    fn test_send_text_strips_terminator() {
        let mut protocol = protocol_with(&[b"IfcWall\r\n"]);
        let text = protocol.send_text(&Command::Type).unwrap();

        assert_eq!(text, "IfcWall");
        assert_eq!(protocol.channel().written, b"type\n");
    }

    #[test]
    fn test_send_binary_is_undecoded() {
        let mut protocol = protocol_with(&[&[0xff, 0x00, 0x0a, 0x0d]]);
        let bytes = protocol.send_binary(&Command::Get).unwrap();

        assert_eq!(bytes, vec![0xff, 0x00, 0x0a, 0x0d]);
    }

    #[test]
    fn test_send_payload_framing() {
        let mut protocol = protocol_with(&[b"y\n"]);
        let ack = protocol.send_payload(b"ISO-10303-21;").unwrap();

        assert_eq!(ack, ACK_YES);
        assert_eq!(protocol.channel().written, b"13\nISO-10303-21;");
    }

    #[test]
    fn test_channel_failure_surfaces() {
        let mut protocol = protocol_with(&[]);
        let result = protocol.send_text(&Command::Next);
        assert!(matches!(result, Err(ProtocolError::ChannelClosed)));
    }

    #[test]
    fn test_geometry_round_trip() {
        let vertices = vec![0.0, 0.0, 0.0, 1.5, 0.0, 0.0, 0.0, -2.25, 3.0];
        let indices = vec![0, 1, 2];

        let payload = encode_geometry(&vertices, &indices);
        assert_eq!(payload.len(), 4 + 36 + 4 + 12);

        let (decoded_vertices, decoded_indices) = decode_geometry(&payload).unwrap();
        assert_eq!(decoded_vertices, vertices);
        assert_eq!(decoded_indices, indices);
    }

    #[test]
    fn test_empty_geometry_is_valid() {
        let payload = encode_geometry(&[], &[]);
        assert_eq!(payload.len(), MIN_GEOMETRY_PAYLOAD);

        let (vertices, indices) = decode_geometry(&payload).unwrap();
        assert!(vertices.is_empty());
        assert!(indices.is_empty());
    }

    #[test]
    fn test_short_payload_rejected() {
        for len in 0..MIN_GEOMETRY_PAYLOAD {
            let result = decode_geometry(&vec![0u8; len]);
            assert!(matches!(
                result,
                Err(ProtocolError::InvalidPayload { .. })
            ));
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut payload = encode_geometry(&[0.0; 9], &[0, 1, 2]);
        payload.truncate(payload.len() - 4);
        assert!(matches!(
            decode_geometry(&payload),
            Err(ProtocolError::InvalidPayload { .. })
        ));

        let mut negative = Vec::new();
        negative.write_i32::<NativeEndian>(-1).unwrap();
        negative.write_i32::<NativeEndian>(0).unwrap();
        assert!(matches!(
            decode_geometry(&negative),
            Err(ProtocolError::InvalidPayload { .. })
        ));
    }
}
