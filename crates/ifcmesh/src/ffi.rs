//! C ABI for natively linked geometry engines
//!
//! An engine built as a C/C++ library fills in a [`GeomEngineVTable`] and the
//! host wraps it in an [`FfiEngine`], which plugs into the session as a
//! native transport. Geometry objects returned by the engine are copied into
//! Rust-owned buffers and handed straight back through `free_geometry`.

use crate::config::ENGINE_VERSION;
use crate::native::{NativeEngine, NativeError};
use crate::types::GeometryInstance;
use std::ffi::{c_char, CStr};
use std::os::raw::{c_float, c_int};
use std::slice;
use tracing::{error, trace};

/// C-compatible geometry object returned by the engine
#[repr(C)]
pub struct CGeomObject {
    /// Numeric entity id
    pub id: c_int,
    /// Null-terminated entity name, may be NULL
    pub name: *const c_char,
    /// Null-terminated entity type name
    pub entity_type: *const c_char,
    /// Null-terminated global unique id, may be NULL
    pub guid: *const c_char,
    /// Number of floats in `vertices` (3 per vertex)
    pub vertex_len: usize,
    /// Pointer to vertex data (x,y,z triplets)
    pub vertices: *const c_float,
    /// Number of floats in `normals`, 0 if there are none
    pub normal_len: usize,
    /// Pointer to normal data (x,y,z triplets), NULL if none
    pub normals: *const c_float,
    /// Number of ints in `indices` (3 per triangle)
    pub index_len: usize,
    /// Pointer to triangle indices local to this object
    pub indices: *const c_int,
}

/// Entry points a native engine exposes
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GeomEngineVTable {
    /// Returns the engine's null-terminated version string
    pub get_version: Option<unsafe extern "C" fn() -> *const c_char>,
    /// Passes serialized model data; returns non-zero if the model was accepted
    pub set_data: Option<unsafe extern "C" fn(data: *const u8, len: usize) -> c_int>,
    /// Returns the next geometry object, or NULL when there are no more
    pub next_geometry: Option<unsafe extern "C" fn() -> *const CGeomObject>,
    /// Releases an object returned by `next_geometry`
    pub free_geometry: Option<unsafe extern "C" fn(object: *const CGeomObject)>,
}

/// Native engine reached through a C function table
pub struct FfiEngine {
    get_version: unsafe extern "C" fn() -> *const c_char,
    set_data: unsafe extern "C" fn(data: *const u8, len: usize) -> c_int,
    next_geometry: unsafe extern "C" fn() -> *const CGeomObject,
    free_geometry: unsafe extern "C" fn(object: *const CGeomObject),
}

impl FfiEngine {
    /// Wrap a function table
    ///
    /// # Safety
    /// Every entry must point at a function with the documented contract that
    /// stays loaded for the lifetime of the returned engine. Strings and
    /// arrays returned by the engine must be valid for the advertised length.
    pub unsafe fn new(vtable: GeomEngineVTable) -> Result<Self, NativeError> {
        fn require<T>(entry: Option<T>, name: &str) -> Result<T, NativeError> {
            entry.ok_or_else(|| NativeError::Unavailable(name.to_string()))
        }

        Ok(Self {
            get_version: require(vtable.get_version, "get_version")?,
            set_data: require(vtable.set_data, "set_data")?,
            next_geometry: require(vtable.next_geometry, "next_geometry")?,
            free_geometry: require(vtable.free_geometry, "free_geometry")?,
        })
    }
}

impl NativeEngine for FfiEngine {
    fn version(&self) -> Result<String, NativeError> {
        let ptr = unsafe { (self.get_version)() };
        if ptr.is_null() {
            return Err(NativeError::InvalidString);
        }
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map(str::to_string)
            .map_err(|_| NativeError::InvalidString)
    }

    fn set_data(&mut self, data: &[u8]) -> bool {
        unsafe { (self.set_data)(data.as_ptr(), data.len()) != 0 }
    }

    fn next_geometry(&mut self) -> Option<GeometryInstance> {
        let object = unsafe { (self.next_geometry)() };
        if object.is_null() {
            return None;
        }

        let instance = unsafe { copy_geometry(&*object) };
        unsafe { (self.free_geometry)(object) };

        trace!(
            "Native engine returned #{:?} {} ({} floats)",
            instance.id,
            instance.entity_type,
            instance.vertices.len()
        );
        Some(instance)
    }
}

unsafe fn copy_geometry(object: &CGeomObject) -> GeometryInstance {
    if object.entity_type.is_null() {
        error!("Native engine returned geometry #{} without a type", object.id);
    }
    GeometryInstance {
        id: Some(object.id),
        name: copy_string(object.name),
        entity_type: copy_string(object.entity_type),
        guid: copy_string(object.guid),
        vertices: copy_array(object.vertices, object.vertex_len),
        indices: copy_array(object.indices, object.index_len),
        normals: copy_array(object.normals, object.normal_len),
    }
}

unsafe fn copy_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

unsafe fn copy_array<T: Copy>(ptr: *const T, len: usize) -> Vec<T> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    slice::from_raw_parts(ptr, len).to_vec()
}

/// Get the engine version this library expects
///
/// # Returns
/// - Null-terminated version string
#[no_mangle]
pub extern "C" fn ifcmesh_expected_engine_version() -> *const c_char {
    static VERSION: &[u8] = b"0.3.0-rc3\0";
    debug_assert_eq!(&VERSION[..VERSION.len() - 1], ENGINE_VERSION.as_bytes());
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::session::EngineSession;
    use crate::transport::Transport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static VERTICES: [c_float; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    static INDICES: [c_int; 3] = [0, 1, 2];
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    static FREED: AtomicUsize = AtomicUsize::new(0);

    struct StaticObject(CGeomObject);
    unsafe impl Sync for StaticObject {}

    static OBJECT: StaticObject = StaticObject(CGeomObject {
        id: 305,
        name: b"North wall\0".as_ptr() as *const c_char,
        entity_type: b"IfcWallStandardCase\0".as_ptr() as *const c_char,
        guid: b"2O2Fr$t4X7Zf8NOew3FLOH\0".as_ptr() as *const c_char,
        vertex_len: 9,
        vertices: VERTICES.as_ptr(),
        normal_len: 0,
        normals: std::ptr::null(),
        index_len: 3,
        indices: INDICES.as_ptr(),
    });

    unsafe extern "C" fn version() -> *const c_char {
        ifcmesh_expected_engine_version()
    }

    unsafe extern "C" fn set_data(_data: *const u8, len: usize) -> c_int {
        (len > 0) as c_int
    }

    unsafe extern "C" fn next_geometry() -> *const CGeomObject {
        if CALLS.fetch_add(1, Ordering::SeqCst) == 0 {
            &OBJECT.0
        } else {
            std::ptr::null()
        }
    }

    unsafe extern "C" fn free_geometry(_object: *const CGeomObject) {
        FREED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_missing_entry_point() {
        let vtable = GeomEngineVTable {
            get_version: Some(version),
            set_data: None,
            next_geometry: Some(next_geometry),
            free_geometry: Some(free_geometry),
        };
        let result = unsafe { FfiEngine::new(vtable) };
        assert!(matches!(result, Err(NativeError::Unavailable(name)) if name == "set_data"));
    }

    #[test]
    fn test_session_over_vtable() {
        let vtable = GeomEngineVTable {
            get_version: Some(version),
            set_data: Some(set_data),
            next_geometry: Some(next_geometry),
            free_geometry: Some(free_geometry),
        };
        let engine = unsafe { FfiEngine::new(vtable) }.unwrap();
        let transport = Transport::native(Box::new(engine), &EngineConfig::default()).unwrap();
        let mut session = EngineSession::new(transport);

        session.open_model(b"ISO-10303-21;").unwrap();
        let mesh = session.finalize().unwrap();
        assert_eq!(mesh.vertices, VERTICES.to_vec());
        assert_eq!(mesh.indices, INDICES.to_vec());

        assert_eq!(session.instance_by_id(305).unwrap().primitive_count, 1);
        assert_eq!(session.instances_of_type("IFCWALLSTANDARDCASE").unwrap().len(), 1);
        assert_eq!(FREED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_header_declares_engine_table() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/include/ifcmesh_engine.h");
        let header = std::fs::read_to_string(path).expect("header generated by build.rs");

        assert!(header.contains("struct GeomEngineVTable"));
        assert!(header.contains("struct CGeomObject"));
        assert!(header.contains("next_geometry"));
        assert!(header.contains("free_geometry"));
        assert!(header.contains("ifcmesh_expected_engine_version"));
    }
}
