//! Assemble a model mesh from an in-process geometry engine
//!
//! The engine here serves a handful of boxes; a real one would triangulate
//! the entities of the model it was given.

use ifcmesh::{EngineConfig, EngineSession, GeometryInstance, NativeEngine, NativeError, Transport};

struct BoxEngine {
    remaining: Vec<(i32, &'static str, [f32; 3])>,
}

impl NativeEngine for BoxEngine {
    fn version(&self) -> Result<String, NativeError> {
        Ok(ifcmesh::ENGINE_VERSION.to_string())
    }

    fn set_data(&mut self, data: &[u8]) -> bool {
        !data.is_empty()
    }

    fn next_geometry(&mut self) -> Option<GeometryInstance> {
        let (id, entity_type, origin) = self.remaining.pop()?;
        Some(unit_box(entity_type, origin).with_id(id))
    }
}

fn unit_box(entity_type: &str, [x, y, z]: [f32; 3]) -> GeometryInstance {
    let mut vertices = Vec::with_capacity(24);
    for corner in 0..8 {
        vertices.push(x + (corner & 1) as f32);
        vertices.push(y + ((corner >> 1) & 1) as f32);
        vertices.push(z + ((corner >> 2) & 1) as f32);
    }
    let indices = vec![
        0, 2, 1, 1, 2, 3, // bottom
        4, 5, 6, 5, 7, 6, // top
        0, 1, 4, 1, 5, 4, // front
        2, 6, 3, 3, 6, 7, // back
        0, 4, 2, 2, 4, 6, // left
        1, 3, 5, 3, 7, 5, // right
    ];
    GeometryInstance::new(entity_type, vertices, indices)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let engine = BoxEngine {
        remaining: vec![
            (12, "IfcSlab", [0.0, 0.0, 0.0]),
            (31, "IfcWall", [0.0, 0.0, 1.0]),
            (32, "IfcWall", [2.0, 0.0, 1.0]),
        ],
    };

    let transport = Transport::native(Box::new(engine), &EngineConfig::default())?;
    let mut session = EngineSession::new(transport);
    session.open_model(b"ISO-10303-21;")?;

    let mesh = session.finalize()?;
    println!(
        "Assembled {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangle_count()
    );

    for region in session.instances_of_type("IfcWall")? {
        println!(
            "IfcWall at vertex {} index {} ({} triangles)",
            region.start_vertex, region.start_index, region.primitive_count
        );
    }

    let slab = session.instance_by_id(12)?;
    println!("#12 covers indices {:?}", slab.index_range());

    session.close();
    Ok(())
}
