//! Shared-arc topology over a polygon layer, used to simplify adjacent polygons without opening
//! gaps or overlaps between them.
//!
//! Every ring is cut at its junctions (vertices where the neighbouring rings diverge) into arcs.
//! An arc shared by two polygons is stored once, so simplifying each stored arc once moves both
//! polygons' boundaries identically.

use std::collections::{BTreeMap, BTreeSet};

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{
    Area, BoundingRect, Contains, Coord, Intersects, Line, LineString, MultiPolygon, Point,
    Polygon, Rect, Simplify,
};
use log::debug;

/// Exact identity of a coordinate.
type Key = (u64, u64);

fn key(c: &Coord<f64>) -> Key {
    // Adding zero maps -0.0 to 0.0
    ((c.x + 0.0).to_bits(), (c.y + 0.0).to_bits())
}

/// Open vertex sequence of a ring with consecutive duplicates removed.
fn open_ring(ring: &LineString<f64>) -> Vec<Coord<f64>> {
    let mut coords = ring.0.clone();
    coords.dedup_by(|a, b| key(a) == key(b));
    if coords.len() > 1 && key(&coords[0]) == key(&coords[coords.len() - 1]) {
        coords.pop();
    }
    coords
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArcRef {
    arc: usize,
    reversed: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Ring {
    /// Too short to form an area; carried through untouched
    Verbatim(LineString<f64>),
    Arcs(Vec<ArcRef>),
}

/// A polygon layer decomposed into shared arcs.
#[derive(Debug, Clone)]
pub struct Topology {
    arcs: Vec<Vec<Coord<f64>>>,
    /// Feature -> polygon -> rings (exterior first)
    features: Vec<Vec<Vec<Ring>>>,
}

struct ArcRegistry {
    arcs: Vec<Vec<Coord<f64>>>,
    index: BTreeMap<Vec<Key>, usize>,
}

impl ArcRegistry {
    /// Stores an arc under its canonical direction (the lexicographically smaller key sequence)
    /// and returns how the caller's direction relates to it.
    fn intern(&mut self, coords: Vec<Coord<f64>>) -> ArcRef {
        let forward: Vec<Key> = coords.iter().map(key).collect();
        let backward: Vec<Key> = forward.iter().rev().copied().collect();
        let (canonical, reversed) = if backward < forward {
            (backward, true)
        } else {
            (forward, false)
        };
        if let Some(&arc) = self.index.get(&canonical) {
            return ArcRef { arc, reversed };
        }
        let mut coords = coords;
        if reversed {
            coords.reverse();
        }
        let arc = self.arcs.len();
        self.arcs.push(coords);
        self.index.insert(canonical, arc);
        ArcRef { arc, reversed }
    }
}

/// Vertices whose neighbour pairs differ between occurrences: where one ring leaves another.
fn find_junctions(rings: &[Vec<Coord<f64>>]) -> BTreeSet<Key> {
    let mut neighbours: BTreeMap<Key, BTreeSet<(Key, Key)>> = BTreeMap::new();
    for ring in rings.iter().filter(|ring| ring.len() >= 3) {
        let n = ring.len();
        for i in 0..n {
            let previous = key(&ring[(i + n - 1) % n]);
            let next = key(&ring[(i + 1) % n]);
            let pair = if previous <= next {
                (previous, next)
            } else {
                (next, previous)
            };
            neighbours.entry(key(&ring[i])).or_default().insert(pair);
        }
    }
    neighbours
        .into_iter()
        .filter(|(_, pairs)| pairs.len() > 1)
        .map(|(k, _)| k)
        .collect()
}

fn cut_ring(open: &[Coord<f64>], junctions: &BTreeSet<Key>, registry: &mut ArcRegistry) -> Ring {
    let n = open.len();
    let cuts: Vec<usize> = (0..n).filter(|&i| junctions.contains(&key(&open[i]))).collect();

    let Some(&start) = cuts.first() else {
        // A ring without junctions is one closed arc, started at its smallest vertex so that
        // rings traversing the same loop from different points share it
        let start = (0..n).min_by_key(|&i| key(&open[i])).unwrap_or(0);
        let mut coords: Vec<Coord<f64>> =
            open[start..].iter().chain(&open[..start]).copied().collect();
        coords.push(open[start]);
        return Ring::Arcs(vec![registry.intern(coords)]);
    };

    let rotated: Vec<Coord<f64>> = open[start..]
        .iter()
        .chain(&open[..start])
        .chain(std::iter::once(&open[start]))
        .copied()
        .collect();
    let mut parts = vec![];
    let mut from = 0;
    for i in 1..rotated.len() {
        if junctions.contains(&key(&rotated[i])) {
            parts.push(registry.intern(rotated[from..=i].to_vec()));
            from = i;
        }
    }
    Ring::Arcs(parts)
}

/// Concatenates arcs into a closed ring; each arc after the first starts where the previous ended.
fn ring_coords(parts: &[ArcRef], arcs: &[Vec<Coord<f64>>]) -> Vec<Coord<f64>> {
    let mut coords: Vec<Coord<f64>> = vec![];
    for part in parts {
        let arc = &arcs[part.arc];
        let skip = usize::from(!coords.is_empty());
        if part.reversed {
            coords.extend(arc.iter().rev().skip(skip));
        } else {
            coords.extend(arc.iter().skip(skip));
        }
    }
    coords
}

fn ring_area(coords: &[Coord<f64>]) -> f64 {
    Polygon::new(LineString(coords.to_vec()), vec![]).unsigned_area()
}

fn is_degenerate(coords: &[Coord<f64>]) -> bool {
    coords.len() < 4 || ring_area(coords) == 0.0
}

fn segments(arc: &[Coord<f64>]) -> impl Iterator<Item = Line<f64>> + '_ {
    arc.windows(2).map(|pair| Line::new(pair[0], pair[1]))
}

fn bounds(arc: &[Coord<f64>]) -> Option<Rect<f64>> {
    LineString(arc.to_vec()).bounding_rect()
}

fn endpoints(arc: &[Coord<f64>]) -> [Key; 2] {
    [key(&arc[0]), key(&arc[arc.len() - 1])]
}

/// Whether two distinct arcs meet anywhere other than at an endpoint they share.
fn arcs_cross(a: &[Coord<f64>], b: &[Coord<f64>]) -> bool {
    let shared: Vec<Key> = endpoints(a)
        .into_iter()
        .filter(|k| endpoints(b).contains(k))
        .collect();
    segments(a).any(|sa| {
        segments(b).any(|sb| match line_intersection(sa, sb) {
            None => false,
            Some(LineIntersection::SinglePoint {
                intersection,
                is_proper,
            }) => is_proper || !shared.contains(&key(&intersection)),
            Some(LineIntersection::Collinear { .. }) => true,
        })
    })
}

/// Whether an arc crosses or touches itself away from its own consecutive vertices.
fn arc_self_crosses(arc: &[Coord<f64>]) -> bool {
    let lines: Vec<Line<f64>> = segments(arc).collect();
    let n = lines.len();
    let closed = n > 1 && key(&arc[0]) == key(&arc[arc.len() - 1]);
    (0..n).any(|i| {
        (i + 2..n)
            .filter(|&j| !(closed && i == 0 && j == n - 1))
            .any(|j| line_intersection(lines[i], lines[j]).is_some())
    })
}

/// The region between an arc and its simplification. A vertex of another arc strictly inside it
/// has been jumped over, so it would end up on the other side of the boundary.
fn swept_region(original: &[Coord<f64>], simplified: &[Coord<f64>]) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = original
        .iter()
        .chain(simplified.iter().rev().skip(1))
        .copied()
        .collect();
    Polygon::new(LineString(ring), vec![])
}

impl Topology {
    pub fn build(geometries: &[MultiPolygon<f64>]) -> Self {
        let opened: Vec<Vec<Vec<Vec<Coord<f64>>>>> = geometries
            .iter()
            .map(|geometry| {
                geometry
                    .0
                    .iter()
                    .map(|polygon| {
                        std::iter::once(polygon.exterior())
                            .chain(polygon.interiors())
                            .map(open_ring)
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let all_rings: Vec<Vec<Coord<f64>>> = opened
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect();
        let junctions = find_junctions(&all_rings);

        let mut registry = ArcRegistry {
            arcs: vec![],
            index: BTreeMap::new(),
        };
        let features = opened
            .iter()
            .zip(geometries)
            .map(|(polygons, geometry)| {
                polygons
                    .iter()
                    .zip(&geometry.0)
                    .map(|(rings, polygon)| {
                        let originals =
                            std::iter::once(polygon.exterior()).chain(polygon.interiors());
                        rings
                            .iter()
                            .zip(originals)
                            .map(|(open, original)| {
                                if open.len() < 3 {
                                    Ring::Verbatim(original.clone())
                                } else {
                                    cut_ring(open, &junctions, &mut registry)
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        debug!(
            "Topology: {} junction(s), {} arc(s) over {} ring(s)",
            junctions.len(),
            registry.arcs.len(),
            all_rings.len()
        );
        Topology {
            arcs: registry.arcs,
            features,
        }
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    fn rings(&self) -> impl Iterator<Item = &[ArcRef]> {
        self.features.iter().flatten().flatten().filter_map(|ring| match ring {
            Ring::Arcs(parts) => Some(parts.as_slice()),
            Ring::Verbatim(_) => None,
        })
    }

    /// Arcs simplified with Douglas-Peucker at `epsilon`. An arc is kept as is when its
    /// simplification would degenerate a ring it bounds (fewer than four coordinates, or no
    /// area), cross another arc or itself, or pass over another arc's vertices.
    fn simplified_arcs(&self, epsilon: f64) -> Vec<Vec<Coord<f64>>> {
        let mut arcs: Vec<Vec<Coord<f64>>> = self
            .arcs
            .iter()
            .map(|arc| {
                let simplified = LineString(arc.clone()).simplify(&epsilon).0;
                let closed = key(&arc[0]) == key(&arc[arc.len() - 1]);
                if closed && simplified.len() < 4 {
                    arc.clone()
                } else {
                    simplified
                }
            })
            .collect();

        let mut pinned = vec![false; arcs.len()];
        loop {
            let mut to_pin: BTreeSet<usize> = BTreeSet::new();
            for parts in self.rings() {
                if is_degenerate(&ring_coords(parts, &arcs)) {
                    to_pin.extend(parts.iter().map(|part| part.arc));
                }
            }
            to_pin.extend(self.conflicting_arcs(&arcs));

            let mut changed = false;
            for arc in to_pin {
                if !pinned[arc] {
                    pinned[arc] = true;
                    arcs[arc] = self.arcs[arc].clone();
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        debug!(
            "Kept {} of {} arc(s) unsimplified to preserve the topology",
            pinned.iter().filter(|&&p| p).count(),
            arcs.len()
        );
        arcs
    }

    /// Simplified arcs that now cross an arc, cross themselves or have jumped over a vertex of
    /// another arc or of a verbatim ring.
    fn conflicting_arcs(&self, arcs: &[Vec<Coord<f64>>]) -> BTreeSet<usize> {
        let moved: Vec<usize> = (0..arcs.len())
            .filter(|&i| arcs[i].len() != self.arcs[i].len())
            .collect();
        let boxes: Vec<Option<Rect<f64>>> = arcs.iter().map(|arc| bounds(arc)).collect();
        let verbatim: Vec<&LineString<f64>> = self
            .features
            .iter()
            .flatten()
            .flatten()
            .filter_map(|ring| match ring {
                Ring::Verbatim(line) => Some(line),
                Ring::Arcs(_) => None,
            })
            .collect();

        let mut conflicts = BTreeSet::new();
        for &i in &moved {
            if arc_self_crosses(&arcs[i]) {
                conflicts.insert(i);
                continue;
            }
            let swept = swept_region(&self.arcs[i], &arcs[i]);
            let Some(swept_box) = swept.bounding_rect() else {
                continue;
            };
            for j in (0..arcs.len()).filter(|&j| j != i) {
                let Some(other_box) = boxes[j] else {
                    continue;
                };
                if !swept_box.intersects(&other_box) {
                    continue;
                }
                let jumped = arcs[j]
                    .iter()
                    .any(|c| swept.contains(&Point::from(*c)));
                if jumped || arcs_cross(&arcs[i], &arcs[j]) {
                    conflicts.insert(i);
                    if moved.binary_search(&j).is_ok() {
                        conflicts.insert(j);
                    }
                }
            }
            if verbatim
                .iter()
                .flat_map(|line| line.0.iter())
                .any(|c| swept.contains(&Point::from(*c)))
            {
                conflicts.insert(i);
            }
        }
        conflicts
    }

    fn assemble(&self, arcs: &[Vec<Coord<f64>>]) -> Vec<MultiPolygon<f64>> {
        self.features
            .iter()
            .map(|polygons| {
                MultiPolygon(
                    polygons
                        .iter()
                        .filter_map(|rings| {
                            let mut rings = rings.iter().map(|ring| match ring {
                                Ring::Verbatim(line) => line.clone(),
                                Ring::Arcs(parts) => LineString(ring_coords(parts, arcs)),
                            });
                            let exterior = rings.next()?;
                            Some(Polygon::new(exterior, rings.collect()))
                        })
                        .collect(),
                )
            })
            .collect()
    }

    /// Rebuilds the layer with every shared arc simplified exactly once.
    pub fn simplify(&self, epsilon: f64) -> Vec<MultiPolygon<f64>> {
        self.assemble(&self.simplified_arcs(epsilon))
    }
}
