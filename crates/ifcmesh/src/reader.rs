//! Pulls geometry instances from the engine one at a time

use crate::protocol::{decode_geometry, Command, ProtocolError, ACK_YES};
use crate::transport::Transport;
use crate::types::GeometryInstance;
use tracing::{debug, trace, warn};

/// Iterates the engine's geometry stream
///
/// Over a process transport each instance costs three round trips: `get`
/// for the binary geometry, `type` for the entity type and `next` to
/// advance. A malformed payload, or geometry whose indices do not fit its
/// own vertices, is logged and skipped; the stream carries on with the
/// following instance.
#[derive(Debug, Default)]
pub struct GeometryStreamReader {
    finished: bool,
    pulled: usize,
    skipped: usize,
}

impl GeometryStreamReader {
    /// Create a reader positioned at the start of the stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Pull the next instance, or `None` at end of stream
    pub fn next(
        &mut self,
        transport: &mut Transport,
    ) -> Result<Option<GeometryInstance>, ProtocolError> {
        if self.finished {
            return Ok(None);
        }

        let instance = match transport {
            Transport::Process(protocol) => loop {
                let payload = protocol.send_binary(&Command::Get)?;
                let instance = match decode_geometry(&payload) {
                    Ok((vertices, indices)) => {
                        let entity_type = protocol.send_text(&Command::Type)?;
                        self.accept(GeometryInstance::new(entity_type, vertices, indices))
                    }
                    Err(e @ ProtocolError::InvalidPayload { .. }) => {
                        warn!("Skipping instance {}: {}", self.pulled + self.skipped, e);
                        self.skipped += 1;
                        None
                    }
                    Err(e) => return Err(e),
                };

                let more = protocol.send_text(&Command::Next)?;
                if more.trim() != ACK_YES {
                    trace!("Engine reported end of stream: {:?}", more);
                    self.finished = true;
                }

                if instance.is_some() || self.finished {
                    break instance;
                }
            },
            Transport::Native(native) => loop {
                match native.next_instance() {
                    Some(instance) => {
                        if let Some(instance) = self.accept(instance) {
                            break Some(instance);
                        }
                    }
                    None => {
                        self.finished = true;
                        break None;
                    }
                }
            },
        };

        match &instance {
            Some(geom) => {
                self.pulled += 1;
                trace!(
                    "Pulled {} with {} vertices, {} triangles",
                    geom.entity_type,
                    geom.vertex_count(),
                    geom.triangle_count()
                );
            }
            None => debug!(
                "Geometry stream finished: {} pulled, {} skipped",
                self.pulled, self.skipped
            ),
        }

        Ok(instance)
    }

    fn accept(&mut self, instance: GeometryInstance) -> Option<GeometryInstance> {
        match instance.validate() {
            Ok(()) => Some(instance),
            Err(reason) => {
                warn!(
                    "Skipping instance {} ({}): {}",
                    self.pulled + self.skipped,
                    instance.entity_type,
                    reason
                );
                self.skipped += 1;
                None
            }
        }
    }

    /// True once the engine has signalled end of stream
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of instances returned so far
    pub fn pulled(&self) -> usize {
        self.pulled
    }

    /// Number of instances dropped because of malformed payloads or geometry
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}
