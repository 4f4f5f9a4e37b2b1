//! Turns raw triangle data into a geometric [`Model`].
//!
//! Clients send a triangle soup: nine coordinates per triangle, with every
//! shared vertex repeated. The builder validates the request, merges
//! vertices by exact coordinate value, merges each edge with its reverse,
//! and wires triangles to the merged nodes.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::BuildError;
use crate::geom::{bounding_diagonal, Edge, Model, Node, PortraitAxes, Triangle};
use crate::protocol::SimulationRequest;
use crate::vector::{mirror_z, try_unit, Vec3};
use crate::wave::{Band, RadarWave};


/// Validating builder for a [`Model`].
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    coordinates: Option<Vec<f64>>,
    visibility: Option<Vec<bool>>,
    direction: Option<Vec3>,
    band: i64,
    tx: i64,
    rx: i64,
    axes: PortraitAxes,
    ground_plane: bool,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the builder inputs from a wire request.
    pub fn from_request(request: &SimulationRequest) -> Result<Self, BuildError> {
        let coordinates = match &request.data {
            Some(data) => Some(data.to_flat()?),
            None => None,
        };
        Ok(Self {
            coordinates,
            visibility: request.visible_triangles.clone(),
            direction: request
                .direct_vector
                .map(|d| Vec3::new(d.x, d.y, d.z)),
            band: request.freq_band,
            tx: request.polar_radiation,
            rx: request.polar_recive,
            axes: PortraitAxes {
                azimuth: request.type_azimut,
                range: request.type_length,
                elevation: request.type_angle,
            },
            ground_plane: request.pplane,
        })
    }

    pub fn coordinates(mut self, coordinates: Vec<f64>) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn visibility(mut self, visibility: Vec<bool>) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn direction(mut self, direction: Vec3) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn band(mut self, band: i64) -> Self {
        self.band = band;
        self
    }

    pub fn polarization(mut self, tx: i64, rx: i64) -> Self {
        self.tx = tx;
        self.rx = rx;
        self
    }

    pub fn axes(mut self, axes: PortraitAxes) -> Self {
        self.axes = axes;
        self
    }

    pub fn ground_plane(mut self, ground_plane: bool) -> Self {
        self.ground_plane = ground_plane;
        self
    }

    pub fn num_triangles(&self) -> usize {
        self.coordinates.as_ref().map_or(0, |c| c.len() / 9)
    }

    /// Runs every input check without building anything.
    pub fn validate(&self) -> Result<(), BuildError> {
        self.checked().map(|_| ())
    }

    /// Validated view of the inputs: coordinates, visibility, unit direction, wave.
    fn checked(&self) -> Result<(&[f64], &[bool], Vec3, RadarWave), BuildError> {
        let coords = match &self.coordinates {
            Some(c) if !c.is_empty() && c.len() % 9 == 0 && c.iter().all(|v| v.is_finite()) => {
                c.as_slice()
            }
            _ => return Err(BuildError::MissingCoordinates),
        };
        let visibility = match &self.visibility {
            Some(v) if v.len() == coords.len() / 9 => v.as_slice(),
            _ => return Err(BuildError::MissingVisibility),
        };
        let nin = self
            .direction
            .as_ref()
            .and_then(try_unit)
            .ok_or(BuildError::MissingDirection)?;

        let mut wave = RadarWave::new(Band::try_from(self.band)?);
        wave.set_polarization(self.tx, self.rx, &nin)?;

        if !self.axes.any() {
            return Err(BuildError::NoPortraitAxisSelected);
        }
        Ok((coords, visibility, nin, wave))
    }

    pub fn build(&self) -> Result<Model, BuildError> {
        let (coords, visibility, nin, wave) = self.checked()?;

        let mut nodes: Vec<Node> = Vec::new();
        let mut node_index: HashMap<[u64; 3], usize> = HashMap::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_index: HashMap<(usize, usize), usize> = HashMap::new();
        let mut triangles = Vec::with_capacity(visibility.len());

        for (t, (chunk, &visible)) in coords.chunks_exact(9).zip(visibility).enumerate() {
            let mut ids = [0usize; 3];
            for (corner, xyz) in chunk.chunks_exact(3).enumerate() {
                let pos = Vec3::new(xyz[0], xyz[1], xyz[2]);
                let id = match node_index.entry(coordinate_key(&pos)) {
                    Entry::Occupied(e) => *e.get(),
                    Entry::Vacant(e) => {
                        nodes.push(Node {
                            pos,
                            visible: false,
                        });
                        *e.insert(nodes.len() - 1)
                    }
                };
                nodes[id].visible |= visible;
                ids[corner] = id;
            }

            for (p, q) in [(ids[0], ids[1]), (ids[1], ids[2]), (ids[2], ids[0])] {
                // a repeated vertex spans no edge
                if p == q {
                    continue;
                }
                // an edge and its reverse share one key
                let key = (p.min(q), p.max(q));
                let id = *edge_index.entry(key).or_insert_with(|| {
                    edges.push(Edge {
                        nodes: [p, q],
                        visible: false,
                        triangles: Vec::new(),
                    });
                    edges.len() - 1
                });
                let edge = &mut edges[id];
                edge.visible |= visible;
                edge.triangles.push(t);
            }

            triangles.push(Triangle {
                nodes: ids,
                visible,
            });
        }

        let l_max = bounding_diagonal(&nodes);
        let nout = -nin;
        let axes = self.axes;
        let enabled = axes.as_array();
        let steps = [0, 1, 2].map(|i| enabled[i].then_some(wave.steps[i]));

        Ok(Model {
            nodes,
            edges,
            triangles,
            l_max,
            nin,
            nout,
            nin_ref: mirror_z(&nin),
            nout_ref: mirror_z(&nout),
            wave,
            axes,
            steps,
            ground_plane: self.ground_plane,
        })
    }

    /// Hash of every input field. Identical requests hash identically.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match &self.coordinates {
            Some(coords) => {
                coords.len().hash(&mut hasher);
                for value in coords {
                    float_bits(*value).hash(&mut hasher);
                }
            }
            None => usize::MAX.hash(&mut hasher),
        }
        self.visibility.hash(&mut hasher);
        match &self.direction {
            Some(d) => coordinate_key(d).hash(&mut hasher),
            None => 0u8.hash(&mut hasher),
        }
        self.band.hash(&mut hasher);
        self.tx.hash(&mut hasher);
        self.rx.hash(&mut hasher);
        self.axes.hash(&mut hasher);
        self.ground_plane.hash(&mut hasher);
        hasher.finish()
    }
}

fn float_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

fn coordinate_key(pos: &Vec3) -> [u64; 3] {
    [float_bits(pos.x), float_bits(pos.y), float_bits(pos.z)]
}
