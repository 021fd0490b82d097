//! Normalizing a GDSII stream for textual/structural diffing.
//!
//! Two functionally identical streams written at different times (or
//! under different `LIBNAME`s) differ byte-for-byte on their `BGNLIB`/
//! `BGNSTR` timestamps and library name alone. `normalize_for_diff`
//! rewrites both away so two exports of the same layout diff clean.

use std::path::Path;

use gds21::{GdsDateTimes, GdsLibrary};

use crate::error::ImportError;

const NORMALIZED_NAME: &str = "normalized";

/// Loads the GDSII stream at `path`, resets its library name and every
/// structure's `modified`/`accessed` timestamps to a fixed value, and
/// writes the result to `out_path`. Geometry, layers, and structure
/// names are untouched.
pub fn normalize_for_diff(path: impl AsRef<Path>, out_path: impl AsRef<Path>) -> Result<(), ImportError> {
    let path_ref = path.as_ref();
    let mut lib = GdsLibrary::load(path_ref).map_err(|e| ImportError::Io {
        path: path_ref.display().to_string(),
        source: std::io::Error::other(e.to_string()),
    })?;

    lib.name = NORMALIZED_NAME.to_string();
    lib.dates = GdsDateTimes::default();
    for gstruct in &mut lib.structs {
        gstruct.dates = GdsDateTimes::default();
    }

    let out_ref = out_path.as_ref();
    lib.save(out_ref).map_err(|e| ImportError::Io {
        path: out_ref.display().to_string(),
        source: std::io::Error::other(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_lib(name: &str) -> GdsLibrary {
        let mut lib = GdsLibrary::new(name);
        lib.structs.push(gds21::GdsStruct::new("top"));
        lib
    }

    #[test]
    fn normalizes_name_and_timestamps() {
        let dir = std::env::temp_dir();
        let src: PathBuf = dir.join("cellforge_gds_diff_src.gds");
        let out: PathBuf = dir.join("cellforge_gds_diff_out.gds");

        sample_lib("run_1234").save(&src).unwrap();
        normalize_for_diff(&src, &out).unwrap();

        let normalized = GdsLibrary::load(&out).unwrap();
        assert_eq!(normalized.name, NORMALIZED_NAME);
        assert_eq!(normalized.dates, GdsDateTimes::default());

        let _ = std::fs::remove_file(&src);
        let _ = std::fs::remove_file(&out);
    }
}
