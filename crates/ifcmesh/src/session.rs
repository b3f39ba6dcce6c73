//! Model lifecycle: load a model into the engine and assemble its geometry

use crate::accumulator::MeshAccumulator;
use crate::native::NativeError;
use crate::protocol::ProtocolError;
use crate::reader::GeometryStreamReader;
use crate::registry::InstanceRegistry;
use crate::transport::Transport;
use crate::types::{AccumulatedMesh, MeshRegion};

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while driving an engine session
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to launch geometry engine {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to attach native geometry engine: {0}")]
    NativeLaunch(#[source] NativeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Version mismatch: expected engine version {expected}, engine reports {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Failed to read model {path}: {source}")]
    ModelIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Engine rejected the model")]
    ModelRejected,

    #[error("No valid model loaded")]
    ModelNotReady,

    #[error("Model geometry has already been finalized")]
    AlreadyFinalized,

    #[error("A model is already loaded in this session")]
    AlreadyLoaded,

    #[error("Combined mesh of {vertices} vertices exceeds the 32-bit index range")]
    MeshTooLarge { vertices: usize },
}

/// Lifecycle state of an [`EngineSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Engine attached, no model handed over yet
    Unopened,
    /// Model handed to the engine but not accepted
    Loading,
    /// Engine accepted the model
    Ready,
    /// Session closed or channel lost
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unopened => "unopened",
            SessionState::Loading => "loading",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Geometry assembled from one finalize pass
#[derive(Debug)]
struct Finalized {
    mesh: AccumulatedMesh,
    registry: InstanceRegistry,
}

/// One model loaded into one geometry engine
///
/// The session owns its transport exclusively. Geometry can be pulled once:
/// [`finalize`](Self::finalize) drains the engine's stream, and afterwards
/// the mesh and lookups are read-only.
pub struct EngineSession {
    transport: Transport,
    state: SessionState,
    finalized: Option<Finalized>,
    skipped: usize,
}

impl EngineSession {
    /// Start a session on an open transport
    pub fn new(transport: Transport) -> Self {
        debug!("New engine session over {} transport", transport.kind());
        Self {
            transport,
            state: SessionState::Unopened,
            finalized: None,
            skipped: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the engine has accepted a model
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Hand serialized model bytes to the engine
    pub fn open_model(&mut self, data: &[u8]) -> Result<(), EngineError> {
        self.begin_loading()?;
        info!("Loading model ({} bytes)", data.len());
        let accepted = self.transport.push_model(data);
        self.complete_loading(accepted)
    }

    /// Have the engine load a model file
    ///
    /// A native engine cannot read files itself, so the file is read here and
    /// passed on as bytes.
    pub fn open_model_path(&mut self, path: &Path) -> Result<(), EngineError> {
        if let Transport::Native(_) = self.transport {
            let data = std::fs::read(path).map_err(|source| EngineError::ModelIo {
                path: path.to_path_buf(),
                source,
            })?;
            return self.open_model(&data);
        }

        self.begin_loading()?;
        info!("Loading model from {:?}", path);
        let accepted = self.transport.push_model_path(path);
        self.complete_loading(accepted)
    }

    fn begin_loading(&mut self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Unopened | SessionState::Loading => {
                self.state = SessionState::Loading;
                Ok(())
            }
            SessionState::Ready => Err(EngineError::AlreadyLoaded),
            SessionState::Closed => Err(EngineError::ModelNotReady),
        }
    }

    fn complete_loading(&mut self, accepted: Result<bool, ProtocolError>) -> Result<(), EngineError> {
        match accepted {
            Ok(true) => {
                self.state = SessionState::Ready;
                info!("Engine accepted the model");
                Ok(())
            }
            Ok(false) => Err(EngineError::ModelRejected),
            Err(e) => {
                self.lose_channel(&e);
                Err(e.into())
            }
        }
    }

    /// Pull every instance from the engine and build the combined mesh
    ///
    /// Can run once per session; later calls fail with
    /// [`EngineError::AlreadyFinalized`].
    pub fn finalize(&mut self) -> Result<&AccumulatedMesh, EngineError> {
        if self.state != SessionState::Ready {
            return Err(EngineError::ModelNotReady);
        }
        if self.finalized.is_some() {
            return Err(EngineError::AlreadyFinalized);
        }

        let started = Instant::now();
        let mut reader = GeometryStreamReader::new();
        let mut accumulator = MeshAccumulator::new();
        let mut registry = InstanceRegistry::new();

        loop {
            let instance = match reader.next(&mut self.transport) {
                Ok(Some(instance)) => instance,
                Ok(None) => break,
                Err(e) => {
                    self.lose_channel(&e);
                    return Err(e.into());
                }
            };
            let region = match accumulator.append(&instance) {
                Ok(region) => region,
                Err(e) => {
                    self.lose_channel(&e);
                    return Err(e);
                }
            };
            registry.record(&instance.entity_type, instance.id, region);
        }

        let mesh = accumulator.finish();
        self.skipped = reader.skipped();
        info!(
            "Finalized {} instances ({} vertices, {} triangles, {} skipped) in {:?}",
            reader.pulled(),
            mesh.vertex_count(),
            mesh.triangle_count(),
            self.skipped,
            started.elapsed()
        );

        let finalized = self.finalized.insert(Finalized { mesh, registry });
        Ok(&finalized.mesh)
    }

    /// The combined mesh
    pub fn mesh(&self) -> Result<&AccumulatedMesh, EngineError> {
        self.finalized().map(|f| &f.mesh)
    }

    /// The entity lookup tables
    pub fn registry(&self) -> Result<&InstanceRegistry, EngineError> {
        self.finalized().map(|f| &f.registry)
    }

    /// Regions of every instance of a type, in stream order
    pub fn instances_of_type(&self, entity_type: &str) -> Result<&[MeshRegion], EngineError> {
        Ok(self.registry()?.by_type(entity_type))
    }

    /// Region of a single entity; unknown ids give an empty region
    pub fn instance_by_id(&self, id: i32) -> Result<MeshRegion, EngineError> {
        Ok(self.registry()?.by_id(id))
    }

    /// Number of instances dropped for malformed payloads during finalize
    pub fn skipped_instances(&self) -> usize {
        self.skipped
    }

    /// Release the engine
    ///
    /// Never fails. Geometry from a completed finalize is discarded.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        info!("Closing engine session");
        self.transport.close();
        self.state = SessionState::Closed;
        self.finalized = None;
    }

    fn finalized(&self) -> Result<&Finalized, EngineError> {
        if self.state != SessionState::Ready {
            return Err(EngineError::ModelNotReady);
        }
        self.finalized.as_ref().ok_or(EngineError::ModelNotReady)
    }

    fn lose_channel(&mut self, error: &dyn fmt::Display) {
        warn!("Abandoning engine session: {}", error);
        self.transport.close();
        self.state = SessionState::Closed;
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close();
    }
}
