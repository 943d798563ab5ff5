//! Map surface contract and the in-memory marker map drawn by the TUI.

use crate::model::LatLon;

pub type LayerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    Blue,
    Red,
    Purple,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: LatLon,
    pub label: String,
    pub color: MarkerColor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Background layer (world outline, tiles). Never cleared by the renderer.
    Base,
    Marker(Marker),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub kind: LayerKind,
}

impl Layer {
    pub fn is_base(&self) -> bool {
        matches!(self.kind, LayerKind::Base)
    }
}

/// Operations the renderer needs from a map widget.
pub trait MapSurface {
    fn each_layer(&self, visitor: &mut dyn FnMut(&Layer));
    fn remove_layer(&mut self, id: LayerId);
    fn set_view(&mut self, center: LatLon, zoom: u8);
    fn add_marker(&mut self, marker: Marker) -> LayerId;
}

/// Map state kept in memory: an ordered layer stack and the current view.
#[derive(Debug, Clone, Default)]
pub struct MarkerMap {
    layers: Vec<Layer>,
    next_id: LayerId,
    view: Option<(LatLon, u8)>,
}

impl MarkerMap {
    pub fn with_base_layer() -> Self {
        let mut map = Self::default();
        let id = map.alloc_id();
        map.layers.push(Layer {
            id,
            kind: LayerKind::Base,
        });
        map
    }

    fn alloc_id(&mut self) -> LayerId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn view(&self) -> Option<(LatLon, u8)> {
        self.view
    }

    #[cfg(test)]
    pub fn has_base_layer(&self) -> bool {
        self.layers.iter().any(Layer::is_base)
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.layers.iter().filter_map(|l| match &l.kind {
            LayerKind::Marker(m) => Some(m),
            LayerKind::Base => None,
        })
    }

    /// Visible `(lon_bounds, lat_bounds)` for the current view.
    ///
    /// Each zoom step halves the visible span; without a view the whole
    /// world is shown.
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        match self.view {
            None => ([-180.0, 180.0], [-90.0, 90.0]),
            Some((center, zoom)) => {
                let half_lon = (180.0 / 2f64.powi(i32::from(zoom) - 3)).min(180.0);
                let half_lat = (half_lon / 2.0).min(90.0);
                (
                    [center.lon - half_lon, center.lon + half_lon],
                    [center.lat - half_lat, center.lat + half_lat],
                )
            }
        }
    }
}

impl MapSurface for MarkerMap {
    fn each_layer(&self, visitor: &mut dyn FnMut(&Layer)) {
        for layer in &self.layers {
            visitor(layer);
        }
    }

    fn remove_layer(&mut self, id: LayerId) {
        self.layers.retain(|l| l.id != id);
    }

    fn set_view(&mut self, center: LatLon, zoom: u8) {
        self.view = Some((center, zoom));
    }

    fn add_marker(&mut self, marker: Marker) -> LayerId {
        let id = self.alloc_id();
        self.layers.push(Layer {
            id,
            kind: LayerKind::Marker(marker),
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(label: &str) -> Marker {
        Marker {
            position: LatLon::new(1.0, 2.0),
            label: label.into(),
            color: MarkerColor::Red,
        }
    }

    #[test]
    fn layers_are_visited_in_insertion_order() {
        let mut map = MarkerMap::with_base_layer();
        let a = map.add_marker(marker("a"));
        let b = map.add_marker(marker("b"));
        assert_ne!(a, b);

        let mut seen = Vec::new();
        map.each_layer(&mut |l| seen.push((l.id, l.is_base())));
        assert_eq!(seen, vec![(0, true), (a, false), (b, false)]);

        map.remove_layer(a);
        let labels: Vec<_> = map.markers().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, ["b"]);
        assert!(map.has_base_layer());
    }

    #[test]
    fn bounds_narrow_with_zoom() {
        let mut map = MarkerMap::with_base_layer();
        assert_eq!(map.bounds(), ([-180.0, 180.0], [-90.0, 90.0]));

        map.set_view(LatLon::new(18.0, 73.0), 10);
        let (lon10, lat10) = map.bounds();
        map.set_view(LatLon::new(18.0, 73.0), 11);
        let (lon11, lat11) = map.bounds();

        let span = |b: [f64; 2]| b[1] - b[0];
        assert!((span(lon10) - 2.0 * span(lon11)).abs() < 1e-9);
        assert!((span(lat10) - 2.0 * span(lat11)).abs() < 1e-9);
        assert!(lon11[0] < 73.0 && lon11[1] > 73.0);
        assert!(lat11[0] < 18.0 && lat11[1] > 18.0);
    }
}
