//! Geometry engine bridge for building models
//!
//! This crate talks to an external geometry kernel, either a child process
//! speaking a line-based command protocol or an engine linked into the
//! process, pulls triangulated geometry one entity at a time and assembles
//! it into a single indexed mesh with lookup tables by entity type and id.

pub mod accumulator;
pub mod config;
pub mod native;
pub mod process;
pub mod protocol;
pub mod reader;
pub mod registry;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(feature = "ffi")]
pub mod ffi;

// Re-export commonly used types
pub use accumulator::MeshAccumulator;
pub use config::{ConfigError, EngineConfig, ENGINE_VERSION};
pub use native::{NativeChannel, NativeEngine, NativeError};
pub use process::{PollBudget, ProcessChannel};
pub use protocol::{Command, CommandProtocol, ProtocolError, ResponseChannel};
pub use reader::GeometryStreamReader;
pub use registry::InstanceRegistry;
pub use session::{EngineError, EngineSession, SessionState};
pub use transport::Transport;
pub use types::{AccumulatedMesh, GeometryInstance, MeshRegion};

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
