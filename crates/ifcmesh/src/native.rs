//! In-process engine transport
//!
//! Used when the geometry engine is linked into the process instead of run
//! as a subprocess. A misbehaving native engine can take the whole process
//! down, so the channel refuses to start unless the engine reports exactly
//! the version this crate was built against.

use crate::session::EngineError;
use crate::types::GeometryInstance;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by a native engine surface
#[derive(Error, Debug)]
pub enum NativeError {
    #[error("Native engine entry point unavailable: {0}")]
    Unavailable(String),

    #[error("Native engine returned an invalid string")]
    InvalidString,
}

/// Function-call surface of a natively linked geometry engine
pub trait NativeEngine: Send {
    /// Version string reported by the engine
    fn version(&self) -> Result<String, NativeError>;

    /// Hand the serialized model to the engine; true if it was accepted
    fn set_data(&mut self, data: &[u8]) -> bool;

    /// Next geometry object, or `None` once every instance has been returned
    fn next_geometry(&mut self) -> Option<GeometryInstance>;
}

/// Version-checked wrapper around a [`NativeEngine`]
pub struct NativeChannel {
    engine: Box<dyn NativeEngine>,
    engine_version: String,
}

impl NativeChannel {
    /// Wrap an engine, failing unless it reports `caller_version`
    ///
    /// Versions are compared case-insensitively.
    pub fn new(engine: Box<dyn NativeEngine>, caller_version: &str) -> Result<Self, EngineError> {
        let engine_version = engine.version().map_err(EngineError::NativeLaunch)?;

        if !caller_version.eq_ignore_ascii_case(&engine_version) {
            return Err(EngineError::VersionMismatch {
                expected: caller_version.to_string(),
                found: engine_version,
            });
        }

        info!("Native geometry engine {} attached", engine_version);
        Ok(Self {
            engine,
            engine_version,
        })
    }

    /// Version reported by the engine
    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    /// Pass model bytes to the engine
    pub fn set_data(&mut self, data: &[u8]) -> bool {
        debug!("Passing {} bytes of model data to native engine", data.len());
        self.engine.set_data(data)
    }

    /// Pull the next geometry object
    pub fn next_instance(&mut self) -> Option<GeometryInstance> {
        self.engine.next_geometry()
    }
}
