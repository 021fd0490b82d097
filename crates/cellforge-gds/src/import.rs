//! GDSII import: parse a stream, build cells bottom-up (referenced
//! structures before their referrers), set every leaf's position from
//! its polygon's bounding box, aggregate every container's bounding
//! box over its children, then fix the result.

use std::path::Path;

use hashbrown::HashMap;
use tracing::{debug, warn};

use cellforge_core::geom::Rect;
use cellforge_core::Cell;

use crate::error::ImportError;
use crate::layer_map::{synthesized_name, LayerMap};
use crate::units::GdsUnits;

/// Imports `path` into a fresh, independent tree and fixes its root.
/// `use_tech_file` toggles whether `layer_map`
/// is consulted at all; when `false`, every polygon is named from its
/// raw `(layer, datatype)` pair regardless of what the map contains.
pub fn from_gds(
    path: impl AsRef<Path>,
    layer_map: &LayerMap,
    use_tech_file: bool,
) -> Result<(Cell, GdsUnits), ImportError> {
    let path_ref = path.as_ref();
    let lib = gds21::GdsLibrary::load(path_ref).map_err(|e| ImportError::Io {
        path: path_ref.display().to_string(),
        source: std::io::Error::other(e.to_string()),
    })?;

    let units = GdsUnits::from_gds21(lib.units);
    let structs_by_name: HashMap<&str, &gds21::GdsStruct> =
        lib.structs.iter().map(|s| (s.name.as_str(), s)).collect();

    let top = top_level_struct(&lib, &structs_by_name)?;

    let mut memo: HashMap<String, Cell> = HashMap::new();
    let root = build_struct(top, &structs_by_name, layer_map, use_tech_file, &mut memo)?;

    root.fix_layout()?;
    debug!(cell = %root.name(), "GDSII import complete");
    Ok((root, units))
}

/// GDSII has no single mandated top structure; the structure that is
/// never itself referenced by any `SREF`/`AREF` is the root (the usual
/// convention collaborator tech files rely on).
fn top_level_struct<'a>(
    lib: &'a gds21::GdsLibrary,
    structs_by_name: &HashMap<&str, &'a gds21::GdsStruct>,
) -> Result<&'a gds21::GdsStruct, ImportError> {
    let mut referenced: hashbrown::HashSet<&str> = hashbrown::HashSet::new();
    for s in &lib.structs {
        for elem in &s.elems {
            if let Some(name) = ref_target(elem) {
                referenced.insert(name);
            }
        }
    }
    lib.structs
        .iter()
        .find(|s| !referenced.contains(s.name.as_str()))
        .or_else(|| lib.structs.first())
        .ok_or_else(|| ImportError::Malformed("GDSII stream contains no structures".to_string()))
        .map(|s| structs_by_name[s.name.as_str()])
}

fn ref_target(elem: &gds21::GdsElement) -> Option<&str> {
    match elem {
        gds21::GdsElement::GdsStructRef(r) => Some(r.name.as_str()),
        gds21::GdsElement::GdsArrayRef(r) => Some(r.name.as_str()),
        _ => None,
    }
}

fn build_struct(
    gstruct: &gds21::GdsStruct,
    structs_by_name: &HashMap<&str, &gds21::GdsStruct>,
    layer_map: &LayerMap,
    use_tech_file: bool,
    memo: &mut HashMap<String, Cell>,
) -> Result<Cell, ImportError> {
    if let Some(cached) = memo.get(&gstruct.name) {
        return Ok(cached.copy(None));
    }

    let container = Cell::container(gstruct.name.clone());
    let mut child_rects = Vec::new();

    for elem in &gstruct.elems {
        match elem {
            gds21::GdsElement::GdsBoundary(b) => {
                let name = layer_name(&gstruct.name, b.layer, b.datatype, layer_map, use_tech_file);
                let leaf = Cell::leaf(name, "");
                let rect = boundary_bbox(b, &gstruct.name)?;
                leaf.place(rect)?;
                child_rects.push(rect);
                container.add_child(leaf)?;
            }
            gds21::GdsElement::GdsStructRef(r) => {
                if r.strans.is_some() {
                    return Err(ImportError::UnsupportedGeometry {
                        name: gstruct.name.clone(),
                    });
                }
                let target = structs_by_name.get(r.name.as_str()).ok_or_else(|| {
                    ImportError::UnknownStructure(gstruct.name.clone(), r.name.clone())
                })?;
                let instance = build_struct(target, structs_by_name, layer_map, use_tech_file, memo)?;
                let dx = r.xy.x;
                let dy = r.xy.y;
                if let Some(src_rect) = instance.bbox() {
                    translate_placed_tree(&instance, dx, dy);
                    child_rects.push(src_rect.translate(dx, dy));
                }
                container.add_child(instance)?;
            }
            gds21::GdsElement::GdsArrayRef(r) => {
                if r.strans.is_some() {
                    return Err(ImportError::UnsupportedGeometry {
                        name: gstruct.name.clone(),
                    });
                }
                let target = structs_by_name.get(r.name.as_str()).ok_or_else(|| {
                    ImportError::UnknownStructure(gstruct.name.clone(), r.name.clone())
                })?;
                let template = build_struct(target, structs_by_name, layer_map, use_tech_file, memo)?;

                let cols = r.cols as i32;
                let rows = r.rows as i32;
                if cols <= 0 || rows <= 0 {
                    return Err(ImportError::Malformed(format!(
                        "array reference in `{}` has non-positive cols/rows",
                        gstruct.name
                    )));
                }
                // AREF's three reference points: the array origin, the
                // point one `cols` step along the column axis, and the
                // point one `rows` step along the row axis.
                let origin = r.xy[0];
                let col_end = r.xy[1];
                let row_end = r.xy[2];
                let col_dx = (col_end.x - origin.x) / cols;
                let col_dy = (col_end.y - origin.y) / cols;
                let row_dx = (row_end.x - origin.x) / rows;
                let row_dy = (row_end.y - origin.y) / rows;

                for row in 0..rows {
                    for col in 0..cols {
                        let dx = origin.x + col * col_dx + row * row_dx;
                        let dy = origin.y + col * col_dy + row * row_dy;
                        let instance = template.copy(None);
                        if let Some(src_rect) = instance.bbox() {
                            translate_placed_tree(&instance, dx, dy);
                            child_rects.push(src_rect.translate(dx, dy));
                        }
                        container.add_child(instance)?;
                    }
                }
            }
            // Paths and text have no leaf-geometry equivalent and are ignored on read.
            gds21::GdsElement::GdsPath(_) | gds21::GdsElement::GdsTextElem(_) => {}
            gds21::GdsElement::GdsNode(_) | gds21::GdsElement::GdsBox(_) => {
                warn!(
                    structure = %gstruct.name,
                    "ignoring GDSII element type with no cellforge-gds mapping"
                );
            }
        }
    }

    if let Some(bbox) = Rect::union_all(&child_rects) {
        container.place(bbox)?;
    }

    // `container` stays in the memo as the pristine, untranslated
    // template; every caller (the first reference and every repeat)
    // receives its own independent copy to translate in place, so an
    // `SREF` placement offset never leaks back into the template.
    memo.insert(gstruct.name.clone(), container.clone());
    Ok(container.copy(None))
}

/// Translates every placed descendant of an already-built instance by
/// `(dx, dy)` to account for its `SREF` placement offset. The instance
/// was just built fresh by `build_struct` (or copied fresh from the
/// memo table), so every descendant still has the un-offset position
/// it was given while that structure was built standalone.
fn translate_placed_tree(cell: &Cell, dx: i32, dy: i32) {
    if let Some(r) = cell.bbox() {
        let _ = cell.place(r.translate(dx, dy));
    }
    for child in cell.children() {
        translate_placed_tree(&child, dx, dy);
    }
}

fn boundary_bbox(b: &gds21::GdsBoundary, structure: &str) -> Result<Rect, ImportError> {
    if b.xy.len() < 4 {
        return Err(ImportError::Malformed(format!(
            "boundary in `{structure}` has fewer than 4 vertices"
        )));
    }
    let xs: Vec<i32> = b.xy.iter().map(|p| p.x).collect();
    let ys: Vec<i32> = b.xy.iter().map(|p| p.y).collect();
    let (x1, x2) = (xs.iter().copied().min().unwrap(), xs.iter().copied().max().unwrap());
    let (y1, y2) = (ys.iter().copied().min().unwrap(), ys.iter().copied().max().unwrap());

    // Exactly 5 points (closed rectangle) and axis-aligned: a clean
    // rectangle. Anything else is reduced to its bounding box with a
    // warning.
    let is_clean_rect = b.xy.len() == 5
        && b.xy[0] == b.xy[4]
        && b.xy.iter().all(|p| p.x == x1 || p.x == x2)
        && b.xy.iter().all(|p| p.y == y1 || p.y == y2);
    if !is_clean_rect {
        warn!(
            structure,
            vertices = b.xy.len(),
            "non-rectangular polygon reduced to its bounding box"
        );
    }

    Ok(Rect::new(x1, y1, x2, y2))
}

fn layer_name(
    structure: &str,
    layer: i16,
    datatype: i16,
    layer_map: &LayerMap,
    use_tech_file: bool,
) -> String {
    if use_tech_file {
        if let Some(name) = layer_map.name_of((layer, datatype)) {
            return name.to_string();
        }
        warn!(structure, layer, datatype, "layer map miss on import, synthesizing a name");
    }
    synthesized_name((layer, datatype))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::export_gds;

    fn solved_row() -> Cell {
        let top = Cell::container("row");
        let a = Cell::leaf("a", "metal1");
        let b = Cell::leaf("b", "metal1");
        top.constrain_abs(&a, "sx1 = 0, sy1 = 0, swidth = 10, sheight = 10").unwrap();
        top.constrain_abs(&b, "sx1 = 20, sy1 = 0, swidth = 10, sheight = 10").unwrap();
        cellforge_core::solve(&top, cellforge_core::SolveOptions::default()).unwrap();
        top
    }

    #[test]
    fn round_trips_a_solved_tree() {
        let top = solved_row();
        let path = std::env::temp_dir().join("cellforge_gds_import_roundtrip.gds");
        export_gds(&top, &path, &LayerMap::default(), false, GdsUnits::default()).unwrap();

        let (reimported, _units) = from_gds(&path, &LayerMap::default(), false).unwrap();

        assert_eq!(reimported.bbox().unwrap(), top.bbox().unwrap());
        let children = reimported.children();
        assert_eq!(children.len(), 2);
        let mut bboxes: Vec<_> = children.iter().map(|c| c.bbox().unwrap()).collect();
        bboxes.sort_by_key(|r| r.x1);
        assert_eq!(bboxes[0].x1, 0);
        assert_eq!(bboxes[1].x1, 20);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reimported_root_is_fixed() {
        let top = solved_row();
        let path = std::env::temp_dir().join("cellforge_gds_import_fixed.gds");
        export_gds(&top, &path, &LayerMap::default(), false, GdsUnits::default()).unwrap();

        let (reimported, _) = from_gds(&path, &LayerMap::default(), false).unwrap();
        assert!(reimported.is_fixed());

        let _ = std::fs::remove_file(&path);
    }
}
