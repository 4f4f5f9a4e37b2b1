use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::Serialize;

use crate::diff::Facet;
use crate::vector::Vec3;
use crate::wave::RadarWave;


/// A mesh vertex. Identity is by coordinate value.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub pos: Vec3,
    pub visible: bool,
}

/// An undirected edge between two nodes, with the triangles that share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub nodes: [usize; 2],
    pub visible: bool,
    pub triangles: Vec<usize>,
}

/// A mesh facet. Visibility is supplied by the client and never recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct Triangle {
    pub nodes: [usize; 3],
    pub visible: bool,
}

impl Triangle {
    /// Builds the facet operators for this triangle from the model's nodes.
    pub fn facet(&self, nodes: &[Node]) -> Facet {
        Facet::new(self.nodes.map(|i| nodes[i].pos))
    }
}

/// Which image dimensions a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct PortraitAxes {
    pub azimuth: bool,
    pub range: bool,
    pub elevation: bool,
}

impl PortraitAxes {
    /// Flags in grid axis order: azimuth (x), range (y), elevation (z).
    pub fn as_array(&self) -> [bool; 3] {
        [self.azimuth, self.range, self.elevation]
    }

    pub fn any(&self) -> bool {
        self.azimuth || self.range || self.elevation
    }
}

pub const AXIS_NAMES: [&str; 3] = ["azimuth", "range", "elevation"];

/// Geometric model of one simulation: deduplicated mesh plus the wave and
/// imaging parameters derived from the request.
#[derive(Debug, Clone)]
pub struct Model {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub triangles: Vec<Triangle>,
    /// Diagonal of the bounding box of all nodes.
    pub l_max: f64,
    pub nin: Vec3,
    pub nout: Vec3,
    pub nin_ref: Vec3,
    pub nout_ref: Vec3,
    pub wave: RadarWave,
    pub axes: PortraitAxes,
    /// Grid step per axis, `None` where the axis is disabled.
    pub steps: [Option<f64>; 3],
    pub ground_plane: bool,
}

impl Model {
    /// Facets of the client-visible triangles, in input order.
    pub fn visible_facets(&self) -> Vec<Facet> {
        self.triangles
            .iter()
            .filter(|t| t.visible)
            .map(|t| t.facet(&self.nodes))
            .collect()
    }

    pub fn num_visible(&self) -> usize {
        self.triangles.iter().filter(|t| t.visible).count()
    }
}

/// Diagonal length of the axis-aligned box around `nodes`.
pub fn bounding_diagonal(nodes: &[Node]) -> f64 {
    let mut iter = nodes.iter();
    let Some(first) = iter.next() else {
        return 0.0;
    };
    let (min, max) = iter.fold((first.pos, first.pos), |(min, max), node| {
        (min.inf(&node.pos), max.sup(&node.pos))
    });
    (max - min).norm()
}

/// Loads every mesh of a Wavefront .obj file as flat triangle coordinates,
/// nine values per triangle. Polygons are triangulated.
pub fn load_obj(path: &Path) -> Result<Vec<f64>> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _) = tobj::load_obj(path, &options)
        .with_context(|| format!("loading OBJ file {}", path.display()))?;

    let mut coords = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        for &i in &mesh.indices {
            let i = 3 * i as usize;
            let xyz = mesh
                .positions
                .get(i..i + 3)
                .with_context(|| format!("vertex index out of range in {}", path.display()))?;
            coords.extend(xyz.iter().map(|&v| f64::from(v)));
        }
    }
    ensure!(!coords.is_empty(), "no triangles in {}", path.display());
    Ok(coords)
}
