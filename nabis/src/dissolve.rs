//! Polygon union and repair.

use std::collections::BTreeMap;

use geo::orient::Direction;
use geo::{Area, BooleanOps, LineString, MultiPolygon, Orient, Polygon, RemoveRepeatedPoints};
use nonempty::NonEmpty;

/// Union of all geometries, merged pairwise so that intermediate results stay balanced.
pub fn union_all(geometries: NonEmpty<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    let mut layer: Vec<MultiPolygon<f64>> = geometries.into();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity(layer.len() / 2 + 1);
        let mut pending = layer.into_iter();
        while let Some(first) = pending.next() {
            match pending.next() {
                Some(second) => next.push(first.union(&second)),
                None => next.push(first),
            }
        }
        layer = next;
    }
    layer.pop().unwrap_or_else(|| MultiPolygon(vec![]))
}

/// Groups items by key, keeping first-seen order within each group. Groups are returned in key
/// order.
pub fn group_by<T, K: Ord>(
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> K,
) -> BTreeMap<K, NonEmpty<T>> {
    let mut groups: BTreeMap<K, NonEmpty<T>> = BTreeMap::new();
    for item in items {
        let k = key(&item);
        match groups.get_mut(&k) {
            Some(group) => group.push(item),
            None => {
                groups.insert(k, NonEmpty::new(item));
            }
        }
    }
    groups
}

/// A ring that cannot bound any area: too short, or with every vertex on one line.
fn is_degenerate_ring(ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    if coords.len() < 4 {
        return true;
    }
    let origin = coords[0];
    coords.iter().all(|c| {
        let (a, b) = (coords[1] - origin, *c - origin);
        a.x * b.y - a.y * b.x == 0.0
    })
}

fn clean_ring(ring: &LineString<f64>) -> LineString<f64> {
    let mut ring = ring.remove_repeated_points();
    if let (Some(&first), Some(&last)) = (ring.0.first(), ring.0.last()) {
        if first != last {
            ring.0.push(first);
        }
    }
    ring
}

/// Resolves self-intersections by overlaying the polygon on nothing: crossing edges are split at
/// their intersections and each enclosed region becomes its own ring.
fn resolve_self_intersections(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon]).union(&MultiPolygon(vec![]))
}

fn drop_empty_rings(geometry: MultiPolygon<f64>) -> MultiPolygon<f64> {
    let has_area = |ring: &LineString<f64>| Polygon::new(ring.clone(), vec![]).unsigned_area() > 0.0;
    MultiPolygon(
        geometry
            .0
            .into_iter()
            .filter(|polygon| has_area(polygon.exterior()))
            .map(|polygon| {
                let (exterior, interiors) = polygon.into_inner();
                Polygon::new(exterior, interiors.into_iter().filter(has_area).collect())
            })
            .collect(),
    )
}

/// Repairs a polygon layer before it is dissolved: repeated vertices are removed, self-intersecting
/// rings are split where they cross, rings without area are dropped, exteriors are wound
/// counter-clockwise and interiors clockwise, and overlapping parts are merged.
pub fn make_valid(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    let polygons: Vec<MultiPolygon<f64>> = geometry
        .0
        .iter()
        .filter_map(|polygon| {
            let exterior = clean_ring(polygon.exterior());
            if is_degenerate_ring(&exterior) {
                return None;
            }
            let interiors = polygon
                .interiors()
                .iter()
                .map(clean_ring)
                .filter(|ring| !is_degenerate_ring(ring))
                .collect();
            let repaired =
                drop_empty_rings(resolve_self_intersections(Polygon::new(exterior, interiors)));
            (!repaired.0.is_empty()).then(|| repaired.orient(Direction::Default))
        })
        .collect();

    match NonEmpty::from_vec(polygons) {
        Some(polygons) => union_all(polygons),
        None => MultiPolygon(vec![]),
    }
}

#[cfg(test)]
mod tests {
    use geo::{polygon, Contains, Point, Winding};

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    #[test]
    fn adjacent_squares_should_union_into_one_polygon() {
        let squares = NonEmpty::from((
            square(0.0, 0.0, 1.0),
            vec![square(1.0, 0.0, 1.0), square(2.0, 0.0, 1.0)],
        ));
        let union = union_all(squares);
        assert_eq!(union.0.len(), 1, "Shared edges should dissolve");
        assert!((union.unsigned_area() - 3.0).abs() < 1e-9);
        assert!(union.contains(&Point::new(1.0, 0.5)));
    }

    #[test]
    fn disjoint_parts_should_be_kept() {
        let union = union_all(NonEmpty::from((
            square(0.0, 0.0, 1.0),
            vec![square(5.0, 5.0, 1.0)],
        )));
        assert_eq!(union.0.len(), 2);
        assert!((union.unsigned_area() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn single_geometry_should_pass_through() {
        let union = union_all(NonEmpty::new(square(0.0, 0.0, 2.0)));
        assert_eq!(union, square(0.0, 0.0, 2.0));
    }

    #[test]
    fn groups_should_keep_first_seen_order() {
        let groups = group_by(
            vec![("경기도", 1), ("강원특별자치도", 2), ("경기도", 3)],
            |(province, _)| province.to_string(),
        );
        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, vec!["강원특별자치도", "경기도"]);
        let gyeonggi = &groups["경기도"];
        assert_eq!(gyeonggi.head.1, 1);
        assert_eq!(gyeonggi.len(), 2);
    }

    #[test]
    fn make_valid_should_drop_degenerate_rings_and_orient() {
        let clockwise = Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (0.0, 0.0),
                (0.0, 2.0),
                (2.0, 2.0),
                (2.0, 0.0),
                (0.0, 0.0),
            ]),
            vec![LineString::from(vec![(0.5, 0.5), (1.0, 1.0), (0.5, 0.5)])],
        );
        let sliver = Polygon::new(
            LineString::from(vec![(5.0, 5.0), (6.0, 6.0), (7.0, 7.0), (5.0, 5.0)]),
            vec![],
        );
        let repaired = make_valid(&MultiPolygon(vec![clockwise, sliver]));
        assert_eq!(repaired.0.len(), 1, "The zero-area sliver is dropped");
        let polygon = &repaired.0[0];
        assert!(polygon.interiors().is_empty(), "The collapsed hole is dropped");
        assert!(polygon.exterior().is_ccw());
        assert!((repaired.unsigned_area() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn make_valid_should_merge_overlapping_parts() {
        let overlapping = MultiPolygon(
            square(0.0, 0.0, 2.0)
                .0
                .into_iter()
                .chain(square(1.0, 0.0, 2.0).0)
                .collect(),
        );
        let repaired = make_valid(&overlapping);
        assert_eq!(repaired.0.len(), 1);
        assert!((repaired.unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn symmetric_bowtie_should_split_into_two_triangles() {
        let bowtie = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]]);
        // The signed areas of the two lobes cancel out
        assert_eq!(bowtie.signed_area(), 0.0);
        let repaired = make_valid(&bowtie);
        assert_eq!(repaired.0.len(), 2, "{repaired:?}");
        assert!((repaired.unsigned_area() - 2.0).abs() < 1e-9);
        assert!(repaired.0.iter().all(|p| p.exterior().is_ccw()));
    }

    #[test]
    fn lopsided_bowtie_should_keep_both_lobes() {
        let bowtie = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]]);
        let repaired = make_valid(&bowtie);
        // Lobes of 4/3 and 16/3 meeting at (4/3, 4/3)
        assert_eq!(repaired.0.len(), 2, "{repaired:?}");
        assert!(
            (repaired.unsigned_area() - 20.0 / 3.0).abs() < 1e-9,
            "area {}",
            repaired.unsigned_area()
        );
        let mut lobes: Vec<f64> = repaired.0.iter().map(|p| p.unsigned_area()).collect();
        lobes.sort_by(f64::total_cmp);
        assert!((lobes[0] - 4.0 / 3.0).abs() < 1e-9);
        assert!((lobes[1] - 16.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_geometry_should_stay_empty() {
        assert!(make_valid(&MultiPolygon(vec![])).0.is_empty());
    }
}
