//! GDSII stream import/export for cellforge, with a tech-file-driven
//! layer map bridging symbolic layer names and GDSII `(layer, datatype)`
//! pairs.
//!
//! - [`layer_map`] — the [`LayerMap`] bijection and its fallback naming.
//! - [`units`] — [`GdsUnits`], the DB/user unit scale carried by a stream.
//! - [`import`] — [`from_gds`], building a fixed [`cellforge_core::Cell`]
//!   tree from a stream.
//! - [`export`] — [`export_gds`], writing a fully solved tree back out.
//! - [`error`] — the crate's error taxonomy.

pub mod diff;
pub mod error;
pub mod export;
pub mod import;
pub mod layer_map;
pub mod units;

pub use diff::normalize_for_diff;
pub use error::{ExportError, ImportError};
pub use export::export_gds;
pub use import::from_gds;
pub use layer_map::{synthesized_name, GdsLayer, LayerMap};
pub use units::GdsUnits;
