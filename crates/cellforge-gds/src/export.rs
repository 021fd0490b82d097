//! GDSII export: walk a fully solved tree, emitting one structure per
//! container and one rectangular boundary per leaf.

use std::path::Path;

use tracing::warn;

use cellforge_core::Cell;

use crate::error::ExportError;
use crate::layer_map::LayerMap;
use crate::units::GdsUnits;

const FALLBACK_LAYER: (i16, i16) = (0, 0);

/// Exports `root`'s tree to `path`. Every cell in the tree must have a
/// solved position; any unsolved cell aborts the export before the
/// output file is opened (`ExportError::Unsolved`).
pub fn export_gds(
    root: &Cell,
    path: impl AsRef<Path>,
    layer_map: &LayerMap,
    use_tech_file: bool,
    units: GdsUnits,
) -> Result<(), ExportError> {
    require_all_solved(root)?;

    let mut lib = gds21::GdsLibrary::new(root.name());
    lib.units = units.to_gds21();

    let mut structs = Vec::new();
    let mut seen = hashbrown::HashSet::new();
    emit_struct(root, layer_map, use_tech_file, &mut structs, &mut seen);
    lib.structs = structs;

    let path_ref = path.as_ref();
    lib.save(path_ref).map_err(|e| ExportError::Io {
        path: path_ref.display().to_string(),
        source: std::io::Error::other(e.to_string()),
    })
}

fn require_all_solved(cell: &Cell) -> Result<(), ExportError> {
    if cell.bbox().is_none() {
        return Err(ExportError::Unsolved { name: cell.name() });
    }
    for child in cell.children() {
        require_all_solved(&child)?;
    }
    Ok(())
}

/// Emits one structure per container, postorder (children already
/// written by the time their parent's `SREF` would reference them —
/// GDSII does not require this ordering, but it matches the bottom-up
/// convention `from_gds` builds structures in).
fn emit_struct(
    cell: &Cell,
    layer_map: &LayerMap,
    use_tech_file: bool,
    out: &mut Vec<gds21::GdsStruct>,
    seen: &mut hashbrown::HashSet<String>,
) {
    if !cell.is_container() {
        return;
    }
    for child in cell.children() {
        emit_struct(&child, layer_map, use_tech_file, out, seen);
    }

    if !seen.insert(cell.name()) {
        // Same-named structure already emitted (two siblings sharing
        // a name after a graft suffix collision is not expected, but
        // GDSII structure names must be unique within the library).
        return;
    }

    let mut gstruct = gds21::GdsStruct::new(cell.name());
    let mut elems = Vec::new();

    for child in cell.children() {
        if child.is_container() {
            // Every cell's solved position is already an absolute
            // coordinate, so a substructure's own geometry is emitted
            // in absolute terms too; the `SREF` offset is
            // always zero and exists only to express hierarchy, not
            // to reposition (mirrors `from_gds`, which only ever sees
            // a nonzero `SREF` offset from a *foreign* GDSII stream).
            elems.push(gds21::GdsElement::GdsStructRef(gds21::GdsStructRef {
                name: child.name(),
                xy: gds21::GdsPoint::new(0, 0),
                strans: None,
            }));
        } else {
            let layer = resolve_layer(&child.layer().unwrap_or_default(), layer_map, use_tech_file);
            let r = child.bbox().expect("checked by require_all_solved");
            elems.push(gds21::GdsElement::GdsBoundary(gds21::GdsBoundary {
                layer: layer.0,
                datatype: layer.1,
                xy: vec![
                    gds21::GdsPoint::new(r.x1, r.y1),
                    gds21::GdsPoint::new(r.x2, r.y1),
                    gds21::GdsPoint::new(r.x2, r.y2),
                    gds21::GdsPoint::new(r.x1, r.y2),
                    gds21::GdsPoint::new(r.x1, r.y1),
                ],
            }));
        }
    }

    gstruct.elems = elems;
    out.push(gstruct);
}

fn resolve_layer(name: &str, layer_map: &LayerMap, use_tech_file: bool) -> (i16, i16) {
    if use_tech_file {
        if let Some(layer) = layer_map.layer_of(name) {
            return layer;
        }
    }
    warn!(layer = name, "layer map miss on export, emitting on (0, 0)");
    FALLBACK_LAYER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsolved_tree() {
        let leaf = Cell::leaf("a", "metal1");
        let path = std::env::temp_dir().join("cellforge_gds_export_unsolved.gds");
        let err = export_gds(&leaf, &path, &LayerMap::default(), false, GdsUnits::default()).unwrap_err();
        assert!(matches!(err, ExportError::Unsolved { .. }));
    }

    #[test]
    fn emits_one_structure_per_container() {
        let top = Cell::container("top");
        let leaf = Cell::leaf("m1", "metal1");
        leaf.constrain_self("x1 = 0, y1 = 0, width = 10, height = 10").unwrap();
        cellforge_core::solve(&leaf, cellforge_core::SolveOptions::default()).unwrap();
        top.add_child(leaf).unwrap();
        top.constrain_self("x1 = 0, y1 = 0, width = 10, height = 10").unwrap();
        cellforge_core::solve(&top, cellforge_core::SolveOptions::default()).unwrap();

        let path = std::env::temp_dir().join("cellforge_gds_export_basic.gds");
        export_gds(&top, &path, &LayerMap::default(), false, GdsUnits::default()).unwrap();

        let lib = gds21::GdsLibrary::load(&path).unwrap();
        assert_eq!(lib.structs.len(), 1);
        assert_eq!(lib.structs[0].elems.len(), 1);

        let _ = std::fs::remove_file(&path);
    }
}
