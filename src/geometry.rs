//! Geometry assembly and WKT encoding for ways and relation members.

use std::fmt::Write as _;

use geo::{Area, Contains, Coord, LineString, Point, Polygon};
use tracing::debug;

/// Builds WKT geometries from resolved node coordinates.
pub trait GeomBuilder {
    fn set_exclude_broken_polygon(&mut self, exclude: bool);

    /// Geometry for a single way. With the area hint set, a closed
    /// ring becomes a polygon; anything else with at least two nodes
    /// becomes a linestring.
    fn simple(&self, nodes: &[Coord<f64>], area: bool) -> Option<String>;

    /// Polygon / multipolygon candidates assembled from relation
    /// member ways.
    fn build_both(&self, ways: &[Vec<Coord<f64>>], osm_id: i64) -> Vec<String>;

    /// Multilinestring over all member ways, for waterway relations.
    fn build_multilines(&self, ways: &[Vec<Coord<f64>>], osm_id: i64) -> Option<String>;
}

/// Default geometry builder writing WKT by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct WktBuilder {
    exclude_broken_polygon: bool,
}

impl WktBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn ring_ok(&self, ring: &[Coord<f64>]) -> bool {
        if !self.exclude_broken_polygon {
            return true;
        }
        ring_area(ring) > 0.0
    }
}

impl GeomBuilder for WktBuilder {
    fn set_exclude_broken_polygon(&mut self, exclude: bool) {
        self.exclude_broken_polygon = exclude;
    }

    fn simple(&self, nodes: &[Coord<f64>], area: bool) -> Option<String> {
        if area && nodes.len() >= 4 && nodes.first() == nodes.last() {
            if !self.ring_ok(nodes) {
                return None;
            }
            return Some(polygon_wkt(nodes, &[]));
        }
        if nodes.len() >= 2 {
            return Some(linestring_wkt(nodes));
        }
        None
    }

    fn build_both(&self, ways: &[Vec<Coord<f64>>], osm_id: i64) -> Vec<String> {
        let (rings, open) = assemble_rings(ways);
        if open > 0 {
            debug!("relation {}: {} unclosed member chains", osm_id, open);
        }

        let rings: Vec<Vec<Coord<f64>>> =
            rings.into_iter().filter(|r| self.ring_ok(r)).collect();
        if rings.is_empty() {
            return Vec::new();
        }

        let shells = nest_rings(rings);
        if shells.len() == 1 {
            let (shell, holes) = &shells[0];
            vec![polygon_wkt(shell, holes)]
        } else {
            vec![multipolygon_wkt(&shells)]
        }
    }

    fn build_multilines(&self, ways: &[Vec<Coord<f64>>], osm_id: i64) -> Option<String> {
        let lines: Vec<&Vec<Coord<f64>>> = ways.iter().filter(|w| w.len() >= 2).collect();
        if lines.is_empty() {
            debug!("relation {}: no usable line members", osm_id);
            return None;
        }

        let mut wkt = String::from("MULTILINESTRING(");
        for (i, line) in lines.into_iter().enumerate() {
            if i > 0 {
                wkt.push(',');
            }
            wkt.push('(');
            push_coords(&mut wkt, line);
            wkt.push(')');
        }
        wkt.push(')');
        Some(wkt)
    }
}

/// Point WKT at full coordinate precision.
pub fn point_wkt(lon: f64, lat: f64) -> String {
    format!("POINT({} {})", lon, lat)
}

fn push_coords(out: &mut String, coords: &[Coord<f64>]) {
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{} {}", c.x, c.y);
    }
}

fn linestring_wkt(coords: &[Coord<f64>]) -> String {
    let mut wkt = String::from("LINESTRING(");
    push_coords(&mut wkt, coords);
    wkt.push(')');
    wkt
}

fn polygon_wkt(shell: &[Coord<f64>], holes: &[Vec<Coord<f64>>]) -> String {
    let mut wkt = String::from("POLYGON(");
    push_ring_list(&mut wkt, shell, holes);
    wkt.push(')');
    wkt
}

fn multipolygon_wkt(shells: &[(Vec<Coord<f64>>, Vec<Vec<Coord<f64>>>)]) -> String {
    let mut wkt = String::from("MULTIPOLYGON(");
    for (i, (shell, holes)) in shells.iter().enumerate() {
        if i > 0 {
            wkt.push(',');
        }
        wkt.push('(');
        push_ring_list(&mut wkt, shell, holes);
        wkt.push(')');
    }
    wkt.push(')');
    wkt
}

fn push_ring_list(out: &mut String, shell: &[Coord<f64>], holes: &[Vec<Coord<f64>>]) {
    out.push('(');
    push_coords(out, shell);
    out.push(')');
    for hole in holes {
        out.push_str(",(");
        push_coords(out, hole);
        out.push(')');
    }
}

fn ring_area(ring: &[Coord<f64>]) -> f64 {
    Polygon::new(LineString::from(ring.to_vec()), vec![]).unsigned_area()
}

/// Chain member ways into closed rings by joining shared endpoints,
/// reversing segments where needed. Returns the closed rings and the
/// number of chains that could not be closed.
fn assemble_rings(ways: &[Vec<Coord<f64>>]) -> (Vec<Vec<Coord<f64>>>, usize) {
    let mut segments: Vec<Vec<Coord<f64>>> =
        ways.iter().filter(|w| w.len() >= 2).cloned().collect();
    let mut rings = Vec::new();
    let mut open = 0;

    while let Some(mut current) = segments.pop() {
        loop {
            let (Some(&start), Some(&end)) = (current.first(), current.last()) else {
                break;
            };

            if current.len() >= 4 && start == end {
                rings.push(current);
                break;
            }

            let mut extended = false;
            for i in 0..segments.len() {
                let (Some(&s), Some(&e)) = (segments[i].first(), segments[i].last()) else {
                    continue;
                };

                if s == end {
                    let seg = segments.remove(i);
                    current.extend(seg.into_iter().skip(1));
                } else if e == end {
                    let mut seg = segments.remove(i);
                    seg.reverse();
                    current.extend(seg.into_iter().skip(1));
                } else if e == start {
                    let mut seg = segments.remove(i);
                    seg.extend(current.iter().skip(1).copied());
                    current = seg;
                } else if s == start {
                    let mut seg = segments.remove(i);
                    seg.reverse();
                    seg.extend(current.iter().skip(1).copied());
                    current = seg;
                } else {
                    continue;
                }
                extended = true;
                break;
            }

            if !extended {
                open += 1;
                break;
            }
        }
    }

    (rings, open)
}

/// Sort rings by shrinking area and nest each ring inside the first
/// shell that contains it; contained rings become holes.
fn nest_rings(mut rings: Vec<Vec<Coord<f64>>>) -> Vec<(Vec<Coord<f64>>, Vec<Vec<Coord<f64>>>)> {
    rings.sort_by(|a, b| {
        ring_area(b)
            .partial_cmp(&ring_area(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut shells: Vec<(Vec<Coord<f64>>, Vec<Vec<Coord<f64>>>)> = Vec::new();
    for ring in rings {
        let probe = ring.first().copied().map(Point::from);
        let parent = probe.and_then(|p| {
            shells.iter().position(|(shell, _)| {
                Polygon::new(LineString::from(shell.clone()), vec![]).contains(&p)
            })
        });

        match parent {
            Some(i) => shells[i].1.push(ring),
            None => shells.push((ring, Vec::new())),
        }
    }
    shells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn square(origin: f64, size: f64) -> Vec<Coord<f64>> {
        vec![
            c(origin, origin),
            c(origin + size, origin),
            c(origin + size, origin + size),
            c(origin, origin + size),
            c(origin, origin),
        ]
    }

    #[test]
    fn test_point_wkt_full_precision() {
        assert_eq!(
            point_wkt(13.388861234567, 52.517037),
            "POINT(13.388861234567 52.517037)"
        );
    }

    #[test]
    fn test_simple_closed_ring_is_polygon() {
        let builder = WktBuilder::new();
        let wkt = builder.simple(&square(0.0, 1.0), true);
        assert_eq!(wkt.as_deref(), Some("POLYGON((0 0,1 0,1 1,0 1,0 0))"));
    }

    #[test]
    fn test_simple_open_way_is_linestring() {
        let builder = WktBuilder::new();
        let wkt = builder.simple(&[c(0.0, 0.0), c(1.0, 1.0), c(2.0, 0.0)], true);
        assert_eq!(wkt.as_deref(), Some("LINESTRING(0 0,1 1,2 0)"));
    }

    #[test]
    fn test_simple_single_node_is_nothing() {
        let builder = WktBuilder::new();
        assert!(builder.simple(&[c(0.0, 0.0)], true).is_none());
        assert!(builder.simple(&[], false).is_none());
    }

    #[test]
    fn test_broken_polygon_exclusion() {
        let degenerate = vec![c(0.0, 0.0), c(1.0, 1.0), c(0.0, 0.0), c(0.0, 0.0)];

        let lax = WktBuilder::new();
        assert!(lax.simple(&degenerate, true).is_some());

        let mut strict = WktBuilder::new();
        strict.set_exclude_broken_polygon(true);
        assert!(strict.simple(&degenerate, true).is_none());
    }

    #[test]
    fn test_build_both_joins_arcs_into_polygon() {
        // Two half-rings of a unit square, the second reversed.
        let arcs = vec![
            vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)],
            vec![c(0.0, 0.0), c(0.0, 1.0), c(1.0, 1.0)],
        ];
        let builder = WktBuilder::new();
        let wkts = builder.build_both(&arcs, 42);

        assert_eq!(wkts.len(), 1);
        assert!(wkts[0].starts_with("POLYGON(("));
    }

    #[test]
    fn test_build_both_disjoint_rings_make_multipolygon() {
        let builder = WktBuilder::new();
        let wkts = builder.build_both(&[square(0.0, 1.0), square(5.0, 1.0)], 42);

        assert_eq!(wkts.len(), 1);
        assert!(wkts[0].starts_with("MULTIPOLYGON((("));
    }

    #[test]
    fn test_build_both_nests_hole() {
        let builder = WktBuilder::new();
        let wkts = builder.build_both(&[square(0.0, 10.0), square(4.0, 1.0)], 42);

        assert_eq!(wkts.len(), 1);
        let wkt = &wkts[0];
        assert!(wkt.starts_with("POLYGON(("));
        // Shell and hole: two rings inside one polygon.
        assert_eq!(wkt.matches("),(").count(), 1);
    }

    #[test]
    fn test_build_both_unclosed_members_yield_nothing() {
        let builder = WktBuilder::new();
        let wkts = builder.build_both(&[vec![c(0.0, 0.0), c(1.0, 0.0)]], 42);
        assert!(wkts.is_empty());
    }

    #[test]
    fn test_multilines() {
        let builder = WktBuilder::new();
        let ways = vec![
            vec![c(0.0, 0.0), c(1.0, 0.0)],
            vec![c(2.0, 2.0), c(3.0, 3.0)],
            vec![c(9.0, 9.0)],
        ];
        let wkt = builder.build_multilines(&ways, 7);
        assert_eq!(
            wkt.as_deref(),
            Some("MULTILINESTRING((0 0,1 0),(2 2,3 3))")
        );

        assert!(builder.build_multilines(&[], 7).is_none());
    }
}
