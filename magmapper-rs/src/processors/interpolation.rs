//! Smooth gridding of scattered slice samples.
//!
//! Samples are triangulated, each vertex gets a gradient from a weighted
//! least-squares plane through its neighbours, and every triangle carries a
//! Clough–Tocher patch: three cubic Bézier micro-triangles meeting at the
//! centroid, C¹ across every edge. Grid nodes outside the triangulated hull
//! are `None`.

use rayon::prelude::*;
use serde::Serialize;

use crate::config::InterpolationConfig;
use crate::core::dataset::{DatasetError, Result};
use crate::core::transforms::CartesianPoint;

use super::partition::Slice;
use super::triangulation::Triangulation;

/// Barycentric slack allowed when deciding a node lies in a triangle.
const CONTAINMENT_EPS: f64 = 1e-10;

/// Regular square grid of interpolated field values.
///
/// Values are row-major: `values[iy * xs.len() + ix]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolatedGrid {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub values: Vec<Option<f64>>,
}

impl InterpolatedGrid {
    /// Value at column `ix`, row `iy`; `None` outside the data hull.
    pub fn get(&self, ix: usize, iy: usize) -> Option<f64> {
        if ix >= self.xs.len() || iy >= self.ys.len() {
            return None;
        }
        self.values[iy * self.xs.len() + ix]
    }

    /// Nodes per side.
    pub fn size(&self) -> usize {
        self.xs.len()
    }

    /// Nodes holding data.
    pub fn filled(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Smallest and largest interpolated value.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.values.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// `(x, y, value)` for every node, row by row.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, Option<f64>)> + '_ {
        self.ys.iter().enumerate().flat_map(move |(iy, &y)| {
            self.xs
                .iter()
                .enumerate()
                .map(move |(ix, &x)| (x, y, self.values[iy * self.xs.len() + ix]))
        })
    }
}

/// Bézier control net of one Clough–Tocher macro-triangle.
#[derive(Debug, Clone, Copy)]
struct Patch {
    /// Vertex values
    f: [f64; 3],
    /// `e[i][0]` toward the next vertex, `e[i][1]` toward the previous one
    e: [[f64; 2]; 3],
    /// Inner points on the vertex-to-centroid edges
    a: [f64; 3],
    /// Edge-interior points, indexed by opposite vertex
    t: [f64; 3],
    /// Points adjacent to the centroid
    q: [f64; 3],
    centre: f64,
}

impl Patch {
    fn build(v: [CartesianPoint; 3], g: [[f64; 2]; 3]) -> Self {
        let cx = (v[0].x + v[1].x + v[2].x) / 3.0;
        let cy = (v[0].y + v[1].y + v[2].y) / 3.0;
        let f = [v[0].field, v[1].field, v[2].field];
        let dot = |g: [f64; 2], dx: f64, dy: f64| g[0] * dx + g[1] * dy;

        let mut e = [[0.0; 2]; 3];
        let mut a = [0.0; 3];
        for i in 0..3 {
            let next = (i + 1) % 3;
            let prev = (i + 2) % 3;
            e[i][0] = f[i] + dot(g[i], v[next].x - v[i].x, v[next].y - v[i].y) / 3.0;
            e[i][1] = f[i] + dot(g[i], v[prev].x - v[i].x, v[prev].y - v[i].y) / 3.0;
            a[i] = f[i] + dot(g[i], cx - v[i].x, cy - v[i].y) / 3.0;
        }

        // edge i -> j, opposite k
        let mut t = [0.0; 3];
        for k in 0..3 {
            let i = (k + 1) % 3;
            let j = (k + 2) % 3;
            let e_ij = e[i][0];
            let e_ji = e[j][1];
            let (tx, ty) = (v[j].x - v[i].x, v[j].y - v[i].y);
            let len = tx.hypot(ty);
            let (tx, ty) = (tx / len, ty / len);
            let (nx, ny) = (-ty, tx);
            let mx = (v[i].x + v[j].x) / 2.0;
            let my = (v[i].y + v[j].y) / 2.0;
            let (wx, wy) = (cx - mx, cy - my);
            let alpha = wx * nx + wy * ny;
            let beta = wx * tx + wy * ty;
            let normal_mid = (dot(g[i], nx, ny) + dot(g[j], nx, ny)) / 2.0;
            let tangential_mid = 3.0 * (e_ji - e_ij) / len;
            t[k] = (e_ij + e_ji) / 2.0 + (alpha * normal_mid + beta * tangential_mid) / 3.0;
        }

        let mut q = [0.0; 3];
        for i in 0..3 {
            // the two outer edges meeting at vertex i are opposite i+1 and i+2
            q[i] = (a[i] + t[(i + 1) % 3] + t[(i + 2) % 3]) / 3.0;
        }
        let centre = (q[0] + q[1] + q[2]) / 3.0;

        Self {
            f,
            e,
            a,
            t,
            q,
            centre,
        }
    }

    /// Evaluate at macro-triangle barycentrics `l`.
    fn evaluate(&self, l: [f64; 3]) -> f64 {
        let k = if l[0] <= l[1] && l[0] <= l[2] {
            0
        } else if l[1] <= l[2] {
            1
        } else {
            2
        };
        let i = (k + 1) % 3;
        let j = (k + 2) % 3;
        let u = l[i] - l[k];
        let v = l[j] - l[k];
        let w = 3.0 * l[k];

        let b300 = self.f[i];
        let b030 = self.f[j];
        let b210 = self.e[i][0];
        let b120 = self.e[j][1];
        let b201 = self.a[i];
        let b021 = self.a[j];
        let b111 = self.t[k];
        let b102 = self.q[i];
        let b012 = self.q[j];
        let b003 = self.centre;

        b300 * u * u * u
            + b030 * v * v * v
            + b003 * w * w * w
            + 3.0 * b210 * u * u * v
            + 3.0 * b120 * u * v * v
            + 3.0 * b201 * u * u * w
            + 3.0 * b021 * v * v * w
            + 3.0 * b102 * u * w * w
            + 3.0 * b012 * v * w * w
            + 6.0 * b111 * u * v * w
    }
}

/// Uniform bucket grid over triangle bounding boxes.
#[derive(Debug, Clone)]
struct TriangleIndex {
    min_x: f64,
    min_y: f64,
    cell_w: f64,
    cell_h: f64,
    nx: usize,
    ny: usize,
    cells: Vec<Vec<usize>>,
}

impl TriangleIndex {
    fn build(tri: &Triangulation) -> Self {
        let vertices = tri.vertices();
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in vertices {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }

        let side = ((tri.triangles().len() as f64).sqrt().ceil() as usize).max(1);
        let mut index = Self {
            min_x,
            min_y,
            cell_w: ((max_x - min_x) / side as f64).max(f64::MIN_POSITIVE),
            cell_h: ((max_y - min_y) / side as f64).max(f64::MIN_POSITIVE),
            nx: side,
            ny: side,
            cells: vec![Vec::new(); side * side],
        };

        for (t_idx, t) in tri.triangles().iter().enumerate() {
            let xs = t.map(|v| vertices[v].x);
            let ys = t.map(|v| vertices[v].y);
            let (cx0, cy0) = index.cell(
                xs.iter().copied().fold(f64::INFINITY, f64::min),
                ys.iter().copied().fold(f64::INFINITY, f64::min),
            );
            let (cx1, cy1) = index.cell(
                xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                ys.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            );
            for cy in cy0..=cy1 {
                for cx in cx0..=cx1 {
                    index.cells[cy * index.nx + cx].push(t_idx);
                }
            }
        }

        index
    }

    fn cell(&self, x: f64, y: f64) -> (usize, usize) {
        let cx = ((x - self.min_x) / self.cell_w).floor().max(0.0) as usize;
        let cy = ((y - self.min_y) / self.cell_h).floor().max(0.0) as usize;
        (cx.min(self.nx - 1), cy.min(self.ny - 1))
    }

    fn candidates(&self, x: f64, y: f64) -> &[usize] {
        let (cx, cy) = self.cell(x, y);
        &self.cells[cy * self.nx + cx]
    }
}

/// C¹ interpolant over a triangulated sample set.
#[derive(Debug, Clone)]
pub struct CloughTocher {
    triangulation: Triangulation,
    patches: Vec<Patch>,
    index: TriangleIndex,
}

impl CloughTocher {
    /// Fit the interpolant to scattered samples.
    ///
    /// # Errors
    ///
    /// `DatasetError::Structure` if the samples cannot be triangulated.
    pub fn new(points: &[CartesianPoint]) -> Result<Self> {
        let triangulation = Triangulation::new(points)?;
        let gradients = estimate_gradients(&triangulation);
        let vertices = triangulation.vertices();

        let patches = triangulation
            .triangles()
            .iter()
            .map(|t| {
                Patch::build(
                    t.map(|v| vertices[v]),
                    t.map(|v| gradients[v]),
                )
            })
            .collect();
        let index = TriangleIndex::build(&triangulation);

        Ok(Self {
            triangulation,
            patches,
            index,
        })
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    /// Interpolated field at `(x, y)`, `None` outside the hull.
    pub fn evaluate(&self, x: f64, y: f64) -> Option<f64> {
        self.index.candidates(x, y).iter().find_map(|&t| {
            let l = self.triangulation.barycentric(t, x, y);
            l.iter()
                .all(|&v| v >= -CONTAINMENT_EPS)
                .then(|| self.patches[t].evaluate(l))
        })
    }
}

/// Weighted least-squares gradient at every vertex (weights `1/d²`).
///
/// Vertices whose neighbourhood is degenerate get a zero gradient.
fn estimate_gradients(tri: &Triangulation) -> Vec<[f64; 2]> {
    let vertices = tri.vertices();
    tri.neighbours()
        .iter()
        .enumerate()
        .map(|(i, neighbours)| {
            let p = vertices[i];
            let (mut sxx, mut sxy, mut syy, mut sxf, mut syf) = (0.0, 0.0, 0.0, 0.0, 0.0);
            for &j in neighbours {
                let q = vertices[j];
                let (dx, dy, df) = (q.x - p.x, q.y - p.y, q.field - p.field);
                let w = 1.0 / (dx * dx + dy * dy);
                sxx += w * dx * dx;
                sxy += w * dx * dy;
                syy += w * dy * dy;
                sxf += w * dx * df;
                syf += w * dy * df;
            }
            let det = sxx * syy - sxy * sxy;
            let trace = sxx + syy;
            if det.abs() <= 1e-12 * trace * trace || !det.is_finite() {
                return [0.0, 0.0];
            }
            [(syy * sxf - sxy * syf) / det, (sxx * syf - sxy * sxf) / det]
        })
        .collect()
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => {
            let step = (hi - lo) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { hi } else { lo + step * i as f64 })
                .collect()
        }
    }
}

/// Grid scattered samples onto `grid_size × grid_size` nodes spanning their
/// bounding box.
///
/// # Errors
///
/// `DatasetError::Structure` for a grid smaller than 2×2 or samples that
/// cannot be triangulated.
pub fn interpolate(points: &[CartesianPoint], grid_size: usize) -> Result<InterpolatedGrid> {
    if grid_size < 2 {
        return Err(DatasetError::Structure(format!(
            "grid size must be at least 2, got {}",
            grid_size
        )));
    }

    let interpolant = CloughTocher::new(points)?;
    let vertices = interpolant.triangulation().vertices();

    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in vertices {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let xs = linspace(min_x, max_x, grid_size);
    let ys = linspace(min_y, max_y, grid_size);

    let values: Vec<Option<f64>> = ys
        .par_iter()
        .map(|&y| {
            xs.iter()
                .map(|&x| interpolant.evaluate(x, y))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();

    Ok(InterpolatedGrid { xs, ys, values })
}

/// Grid one slice with the configured resolution.
pub fn interpolate_slice(slice: &Slice, config: &InterpolationConfig) -> Result<InterpolatedGrid> {
    let points = slice.to_cartesian()?;
    interpolate(&points, config.grid_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::Axis;
    use crate::processors::partition::{ProfilePoint, SlicePoints};

    /// Hexagon of radius 5 with a few interior samples.
    fn hexagon(field: impl Fn(f64, f64) -> f64) -> Vec<CartesianPoint> {
        let mut points: Vec<(f64, f64)> = (0..6)
            .map(|k| {
                let a = k as f64 * std::f64::consts::PI / 3.0;
                (5.0 * a.cos(), 5.0 * a.sin())
            })
            .collect();
        points.extend([(0.0, 0.0), (1.0, 0.5), (-1.5, -1.0), (2.0, -2.5), (-0.5, 3.0)]);
        points
            .into_iter()
            .map(|(x, y)| CartesianPoint::new(x, y, field(x, y)))
            .collect()
    }

    #[test]
    fn test_constant_field_inside_hull() {
        let grid = interpolate(&hexagon(|_, _| 0.7), 41).unwrap();

        for v in grid.values.iter().flatten() {
            assert!((v - 0.7).abs() < 1e-12, "value {}", v);
        }
        // bounding-box corners lie outside the hexagon
        assert_eq!(grid.get(0, 0), None);
        assert_eq!(grid.get(40, 40), None);
        assert_eq!(grid.get(0, 40), None);
        assert!(grid.get(20, 20).is_some());
        assert!(grid.filled() > 0 && grid.filled() < grid.values.len());
    }

    #[test]
    fn test_linear_field_is_reproduced() {
        let f = |x: f64, y: f64| 2.0 * x - 3.0 * y + 1.0;
        let grid = interpolate(&hexagon(f), 31).unwrap();

        for (x, y, v) in grid.iter() {
            if let Some(v) = v {
                assert!((v - f(x, y)).abs() < 1e-9, "({}, {}) -> {}", x, y, v);
            }
        }
    }

    #[test]
    fn test_interpolant_passes_through_samples() {
        let points = hexagon(|x, y| (x * 0.3).sin() + y * y * 0.1);
        let interpolant = CloughTocher::new(&points).unwrap();

        for p in &points {
            let v = interpolant.evaluate(p.x, p.y).unwrap();
            assert!((v - p.field).abs() < 1e-9);
        }
    }

    #[test]
    fn test_continuous_across_edges() {
        let points = hexagon(|x, y| (x * 0.3).sin() * (y * 0.2).cos());
        let interpolant = CloughTocher::new(&points).unwrap();

        // walk a line through the interior; neighbouring evaluations stay close
        let mut previous: Option<f64> = None;
        for i in 0..=400 {
            let x = -3.5 + 7.0 * i as f64 / 400.0;
            let v = interpolant.evaluate(x, 0.2 * x).unwrap();
            if let Some(p) = previous {
                assert!((v - p).abs() < 0.05);
            }
            previous = Some(v);
        }
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let points = hexagon(|x, y| x * y);
        let mut reversed = points.clone();
        reversed.reverse();

        let a = interpolate(&points, 25).unwrap();
        let b = interpolate(&reversed, 25).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_grid_spans_bounding_box() {
        let grid = interpolate(&hexagon(|_, _| 1.0), 11).unwrap();

        assert_eq!(grid.size(), 11);
        assert_eq!(grid.xs[0], -5.0);
        assert_eq!(grid.xs[10], 5.0);
        assert_eq!(grid.values.len(), 121);
    }

    #[test]
    fn test_profile_slice_cannot_be_gridded() {
        let slice = Slice {
            z: 0.0,
            points: SlicePoints::Profile {
                axis: Axis::Y,
                points: vec![ProfilePoint {
                    position: 0.0,
                    field: 1.0,
                    sem: 0.0,
                }],
            },
        };

        let result = interpolate_slice(&slice, &InterpolationConfig::default());
        assert!(matches!(result, Err(DatasetError::Structure(_))));
    }

    #[test]
    fn test_grid_size_too_small() {
        assert!(interpolate(&hexagon(|_, _| 1.0), 1).is_err());
    }
}
