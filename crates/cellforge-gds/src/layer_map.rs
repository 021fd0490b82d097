//! The layer map: two read-only tables bridging symbolic layer names
//! and GDSII `(layer_number, datatype)` pairs. Built and owned by the
//! tech-file collaborator; the codec only ever reads it.

use hashbrown::HashMap;

/// `(layer_number, datatype)`.
pub type GdsLayer = (i16, i16);

/// A bijection between layer names and GDSII layer/datatype pairs.
///
/// Both tables are expected to already be injective (the tech-file
/// collaborator's responsibility); this type does not re-validate
/// that on every lookup, only on [`LayerMap::new`].
#[derive(Debug, Clone, Default)]
pub struct LayerMap {
    to_gds: HashMap<String, GdsLayer>,
    from_gds: HashMap<GdsLayer, String>,
}

impl LayerMap {
    /// Builds a layer map from `name -> (layer, datatype)` pairs,
    /// deriving the inverse table. Panics if either direction would
    /// not be injective — a non-injective layer map is a tech-file
    /// authoring bug, not a runtime condition this codec recovers
    /// from.
    pub fn new(pairs: impl IntoIterator<Item = (String, GdsLayer)>) -> Self {
        let mut to_gds = HashMap::new();
        let mut from_gds = HashMap::new();
        for (name, layer) in pairs {
            let prev_name = to_gds.insert(name.clone(), layer);
            assert!(prev_name.is_none(), "duplicate layer name `{name}` in layer map");
            let prev_layer = from_gds.insert(layer, name);
            assert!(prev_layer.is_none(), "duplicate GDSII layer {layer:?} in layer map");
        }
        Self { to_gds, from_gds }
    }

    pub fn layer_of(&self, name: &str) -> Option<GdsLayer> {
        self.to_gds.get(name).copied()
    }

    pub fn name_of(&self, layer: GdsLayer) -> Option<&str> {
        self.from_gds.get(&layer).map(String::as_str)
    }
}

/// Synthesizes the fallback name for an import-time layer-map miss,
/// encoding both the layer number and datatype.
pub fn synthesized_name(layer: GdsLayer) -> String {
    format!("layer_{}_{}", layer.0, layer.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_both_directions() {
        let map = LayerMap::new([
            ("metal1".to_string(), (10, 0)),
            ("metal2".to_string(), (11, 0)),
        ]);
        assert_eq!(map.layer_of("metal1"), Some((10, 0)));
        assert_eq!(map.name_of((11, 0)), Some("metal2"));
        assert_eq!(map.layer_of("poly"), None);
    }

    #[test]
    fn synthesized_name_encodes_both_numbers() {
        assert_eq!(synthesized_name((7, 2)), "layer_7_2");
    }

    #[test]
    #[should_panic(expected = "duplicate layer name")]
    fn rejects_non_injective_name_table() {
        LayerMap::new([
            ("metal1".to_string(), (10, 0)),
            ("metal1".to_string(), (11, 0)),
        ]);
    }
}
