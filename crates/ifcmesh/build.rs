//! Build script for generating the native engine C header with cbindgen

use std::env;
use std::path::PathBuf;

fn main() {
    // Only generate bindings when the ffi feature is enabled
    if env::var("CARGO_FEATURE_FFI").is_ok() {
        let crate_dir = match env::var("CARGO_MANIFEST_DIR") {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Warning: CARGO_MANIFEST_DIR unavailable: {}", e);
                return;
            }
        };
        let out_dir = PathBuf::from(&crate_dir).join("include");

        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            eprintln!("Warning: Unable to create {}: {}", out_dir.display(), e);
            return;
        }

        let output_file = out_dir.join("ifcmesh_engine.h");

        match cbindgen::Builder::new()
            .with_crate(&crate_dir)
            .with_language(cbindgen::Language::C)
            .with_header(
                r#"/*
 * ifcmesh native engine interface
 *
 * A geometry engine linked into the host process fills in a
 * GeomEngineVTable; the host hands it to ifcmesh, which pulls one
 * CGeomObject at a time and assembles the model mesh.
 */

#ifndef IFCMESH_ENGINE_H
#define IFCMESH_ENGINE_H

#ifdef __cplusplus
extern "C" {
#endif

#include <stdint.h>
#include <stddef.h>
"#,
            )
            .with_trailer(
                r#"
#ifdef __cplusplus
}
#endif

#endif /* IFCMESH_ENGINE_H */
"#,
            )
            .with_cpp_compat(true)
            .with_documentation(true)
            .with_parse_deps(false)
            .include_item("GeomEngineVTable")
            .include_item("CGeomObject")
            .generate()
        {
            Ok(bindings) => {
                bindings.write_to_file(&output_file);
                println!("cargo:rerun-if-changed=src/ffi.rs");
                println!("cargo:rerun-if-changed=build.rs");
            }
            Err(e) => {
                eprintln!("Warning: Unable to generate C bindings: {}", e);
            }
        }
    }
}
