//! Delaunay triangulation of scattered planar samples (Bowyer–Watson).
//!
//! Input points are sorted and coincident positions merged before insertion,
//! so the same point set always produces the same triangles regardless of
//! the order the samples arrived in.

use std::cmp::Ordering;
use std::collections::HashMap;

use log::{debug, warn};

use crate::core::dataset::{coordinate_key, DatasetError, Result};
use crate::core::transforms::CartesianPoint;

/// Super-triangle half-size as a multiple of the data extent.
const SUPER_SCALE: f64 = 100.0;

/// Circumcircle tolerance relative to the squared data extent.
const CIRCLE_EPS: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
struct Circle {
    cx: f64,
    cy: f64,
    r2: f64,
}

impl Circle {
    fn through(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> Self {
        let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
        if d == 0.0 {
            // collinear: every later point falls inside and replaces it
            return Self {
                cx: (a[0] + b[0] + c[0]) / 3.0,
                cy: (a[1] + b[1] + c[1]) / 3.0,
                r2: f64::INFINITY,
            };
        }
        let a2 = a[0] * a[0] + a[1] * a[1];
        let b2 = b[0] * b[0] + b[1] * b[1];
        let c2 = c[0] * c[0] + c[1] * c[1];
        let cx = (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d;
        let cy = (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d;
        let r2 = (a[0] - cx).powi(2) + (a[1] - cy).powi(2);
        Self { cx, cy, r2 }
    }

    #[inline]
    fn contains(&self, p: [f64; 2], eps: f64) -> bool {
        let d2 = (p[0] - self.cx).powi(2) + (p[1] - self.cy).powi(2);
        d2 < self.r2 - eps
    }
}

#[derive(Debug, Clone, Copy)]
struct Working {
    v: [usize; 3],
    circle: Circle,
}

#[inline]
fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

fn working(coords: &[[f64; 2]], a: usize, b: usize, c: usize) -> Working {
    let v = if orient(coords[a], coords[b], coords[c]) < 0.0 {
        [b, a, c]
    } else {
        [a, b, c]
    };
    Working {
        v,
        circle: Circle::through(coords[v[0]], coords[v[1]], coords[v[2]]),
    }
}

/// Triangulated sample set with merged, sorted vertices.
#[derive(Debug, Clone)]
pub struct Triangulation {
    vertices: Vec<CartesianPoint>,
    /// Counter-clockwise vertex indices
    triangles: Vec<[usize; 3]>,
}

impl Triangulation {
    /// Triangulate scattered samples.
    ///
    /// # Errors
    ///
    /// `DatasetError::Structure` when fewer than three distinct positions
    /// remain after merging, or when every position is collinear.
    pub fn new(points: &[CartesianPoint]) -> Result<Self> {
        let vertices = merge_coincident(points);
        if vertices.len() < 3 {
            return Err(DatasetError::Structure(format!(
                "need at least 3 distinct positions to triangulate, got {}",
                vertices.len()
            )));
        }

        let triangles = bowyer_watson(&vertices);
        if triangles.is_empty() {
            return Err(DatasetError::Structure(format!(
                "all {} positions are collinear",
                vertices.len()
            )));
        }

        debug!(
            "Triangulated {} vertices into {} triangles",
            vertices.len(),
            triangles.len()
        );

        Ok(Self {
            vertices,
            triangles,
        })
    }

    pub fn vertices(&self) -> &[CartesianPoint] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Vertices sharing an edge with each vertex, sorted.
    pub fn neighbours(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.vertices.len()];
        for t in &self.triangles {
            for k in 0..3 {
                let (a, b) = (t[k], t[(k + 1) % 3]);
                adjacency[a].push(b);
                adjacency[b].push(a);
            }
        }
        for list in adjacency.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }
        adjacency
    }

    /// Barycentric coordinates of `(x, y)` with respect to a triangle.
    pub fn barycentric(&self, triangle: usize, x: f64, y: f64) -> [f64; 3] {
        let [ia, ib, ic] = self.triangles[triangle];
        let (a, b, c) = (self.vertices[ia], self.vertices[ib], self.vertices[ic]);
        let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
        let l0 = ((b.y - c.y) * (x - c.x) + (c.x - b.x) * (y - c.y)) / det;
        let l1 = ((c.y - a.y) * (x - c.x) + (a.x - c.x) * (y - c.y)) / det;
        [l0, l1, 1.0 - l0 - l1]
    }
}

/// Sort by position and average the field of exact duplicates.
pub(crate) fn merge_coincident(points: &[CartesianPoint]) -> Vec<CartesianPoint> {
    let mut sorted: Vec<CartesianPoint> = points
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    sorted.sort_by(|a, b| match a.x.total_cmp(&b.x) {
        Ordering::Equal => a.y.total_cmp(&b.y),
        other => other,
    });

    let mut merged: Vec<CartesianPoint> = Vec::with_capacity(sorted.len());
    let mut run = 0usize;
    for p in sorted {
        let same = merged.last().map_or(false, |q| {
            coordinate_key(q.x) == coordinate_key(p.x) && coordinate_key(q.y) == coordinate_key(p.y)
        });
        match merged.last_mut() {
            Some(q) if same => {
                run += 1;
                q.field += (p.field - q.field) / run as f64;
            }
            _ => {
                run = 1;
                merged.push(p);
            }
        }
    }
    merged
}

fn bowyer_watson(vertices: &[CartesianPoint]) -> Vec<[usize; 3]> {
    let n = vertices.len();
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in vertices {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    let extent = (max_x - min_x).max(max_y - min_y);
    let (mid_x, mid_y) = ((min_x + max_x) / 2.0, (min_y + max_y) / 2.0);
    let s = SUPER_SCALE * extent;
    let eps = CIRCLE_EPS * extent * extent;

    let mut coords: Vec<[f64; 2]> = vertices.iter().map(|p| [p.x, p.y]).collect();
    coords.push([mid_x - s, mid_y - s]);
    coords.push([mid_x + s, mid_y - s]);
    coords.push([mid_x, mid_y + s]);

    let mut triangles = vec![working(&coords, n, n + 1, n + 2)];

    for i in 0..n {
        let p = coords[i];
        let (bad, good): (Vec<Working>, Vec<Working>) = triangles
            .into_iter()
            .partition(|t| t.circle.contains(p, eps));
        triangles = good;

        if bad.is_empty() {
            warn!("Skipping vertex ({}, {}): no enclosing circumcircle", p[0], p[1]);
            continue;
        }

        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for t in &bad {
            for k in 0..3 {
                let (a, b) = (t.v[k], t.v[(k + 1) % 3]);
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
        }

        for t in &bad {
            for k in 0..3 {
                let (a, b) = (t.v[k], t.v[(k + 1) % 3]);
                if edge_count.get(&(a.min(b), a.max(b))) == Some(&1) {
                    triangles.push(working(&coords, a, b, i));
                }
            }
        }
    }

    triangles
        .into_iter()
        .filter(|t| t.v.iter().all(|&v| v < n))
        .filter(|t| orient(coords[t.v[0]], coords[t.v[1]], coords[t.v[2]]) > 0.0)
        .map(|t| t.v)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(side: usize) -> Vec<CartesianPoint> {
        let mut points = Vec::new();
        for j in 0..side {
            for i in 0..side {
                points.push(CartesianPoint::new(i as f64, j as f64, (i + j) as f64));
            }
        }
        points
    }

    fn covered_area(tri: &Triangulation) -> f64 {
        let v = tri.vertices();
        tri.triangles()
            .iter()
            .map(|t| {
                let (a, b, c) = (v[t[0]], v[t[1]], v[t[2]]);
                0.5 * orient([a.x, a.y], [b.x, b.y], [c.x, c.y])
            })
            .sum()
    }

    #[test]
    fn test_square() {
        let points = vec![
            CartesianPoint::new(0.0, 0.0, 1.0),
            CartesianPoint::new(1.0, 0.0, 1.0),
            CartesianPoint::new(1.0, 1.0, 1.0),
            CartesianPoint::new(0.0, 1.0, 1.0),
        ];

        let tri = Triangulation::new(&points).unwrap();

        assert_eq!(tri.triangles().len(), 2);
        assert!((covered_area(&tri) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_grid_covers_hull() {
        let tri = Triangulation::new(&grid(5)).unwrap();

        // 2n - h - 2 with 16 boundary points
        assert_eq!(tri.triangles().len(), 32);
        assert!((covered_area(&tri) - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_independent() {
        let points = grid(4);
        let mut reversed = points.clone();
        reversed.reverse();

        let a = Triangulation::new(&points).unwrap();
        let b = Triangulation::new(&reversed).unwrap();

        assert_eq!(a.triangles(), b.triangles());
        assert_eq!(a.vertices(), b.vertices());
    }

    #[test]
    fn test_coincident_points_are_averaged() {
        let points = vec![
            CartesianPoint::new(0.0, 0.0, 1.0),
            CartesianPoint::new(0.0, 0.0, 3.0),
            CartesianPoint::new(1.0, 0.0, 0.0),
            CartesianPoint::new(0.0, 1.0, 0.0),
        ];

        let tri = Triangulation::new(&points).unwrap();

        assert_eq!(tri.vertices().len(), 3);
        assert_eq!(tri.vertices()[0].field, 2.0);
    }

    #[test]
    fn test_collinear_is_structure_error() {
        let points: Vec<CartesianPoint> = (0..5)
            .map(|i| CartesianPoint::new(i as f64, 2.0 * i as f64, 0.0))
            .collect();

        assert!(matches!(
            Triangulation::new(&points),
            Err(DatasetError::Structure(_))
        ));
    }

    #[test]
    fn test_too_few_points() {
        let points = vec![
            CartesianPoint::new(0.0, 0.0, 1.0),
            CartesianPoint::new(0.0, 0.0, 1.0),
            CartesianPoint::new(1.0, 0.0, 1.0),
        ];
        assert!(Triangulation::new(&points).is_err());
    }

    #[test]
    fn test_barycentric_and_neighbours() {
        let points = vec![
            CartesianPoint::new(0.0, 0.0, 0.0),
            CartesianPoint::new(2.0, 0.0, 0.0),
            CartesianPoint::new(0.0, 2.0, 0.0),
        ];
        let tri = Triangulation::new(&points).unwrap();

        let l = tri.barycentric(0, 0.5, 0.5);
        assert!((l.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(l.iter().all(|&v| v > 0.0));

        let neighbours = tri.neighbours();
        assert!(neighbours.iter().all(|n| n.len() == 2));
    }
}
