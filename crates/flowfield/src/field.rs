// Continuous fields over a lon/lat lattice

use crate::config::HolePolicy;
use crate::error::{FieldError, FieldResult};
use crate::grid::{GridHeader, GridRecord, select_vector_components};
use glam::Vec2;

/// Interpolated vector sample with its Euclidean magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub u: f32,
    pub v: f32,
    pub magnitude: f32,
}

impl FieldSample {
    pub fn new(u: f32, v: f32) -> Self {
        Self {
            u,
            v,
            magnitude: u.hypot(v),
        }
    }

    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.u, self.v)
    }
}

/// Four lattice corners enclosing a fractional index, plus the offsets inside the cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cell {
    pub i0: usize,
    pub i1: usize,
    pub j0: usize,
    pub j1: usize,
    pub tx: f32,
    pub ty: f32,
}

impl Cell {
    /// Floor/ceil corners so an exact lattice hit on the last row or column still resolves.
    pub fn locate(i: f64, j: f64, width: usize, height: usize) -> Option<Self> {
        if !i.is_finite() || !j.is_finite() {
            return None;
        }
        let (fi, ci, fj, cj) = (i.floor(), i.ceil(), j.floor(), j.ceil());
        if fi < 0.0 || fj < 0.0 || ci >= width as f64 || cj >= height as f64 {
            return None;
        }
        Some(Self {
            i0: fi as usize,
            i1: ci as usize,
            j0: fj as usize,
            j1: cj as usize,
            tx: (i - fi) as f32,
            ty: (j - fj) as f32,
        })
    }

    /// Corner values in (00, 10, 01, 11) order.
    pub fn gather<T: Copy>(&self, lookup: impl Fn(usize, usize) -> Option<T>) -> [Option<T>; 4] {
        [
            lookup(self.i0, self.j0),
            lookup(self.i1, self.j0),
            lookup(self.i0, self.j1),
            lookup(self.i1, self.j1),
        ]
    }
}

/// Applies the hole policy to a corner set: all present, or zero-filled when lenient allows it.
pub(crate) fn resolve_corners<const N: usize>(
    corners: [Option<[f32; N]>; 4],
    policy: HolePolicy,
) -> Option<[[f32; N]; 4]> {
    let present = corners.iter().filter(|c| c.is_some()).count();
    if present < policy.min_corners() {
        return None;
    }
    Some(corners.map(|c| c.unwrap_or([0.0; N])))
}

/// Component-wise bilinear blend of (00, 10, 01, 11) corners.
pub(crate) fn bilinear<const N: usize>(tx: f32, ty: f32, g: [[f32; N]; 4]) -> [f32; N] {
    let rx = 1.0 - tx;
    let ry = 1.0 - ty;
    let (a, b, c, d) = (rx * ry, tx * ry, rx * ty, tx * ty);
    let mut out = [0.0; N];
    for k in 0..N {
        out[k] = g[0][k] * a + g[1][k] * b + g[2][k] * c + g[3][k] * d;
    }
    out
}

/// Min/max of each component over the valid samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentRange {
    pub min: Vec2,
    pub max: Vec2,
}

/// Vector field (u, v) built from two records with identical geometry.
#[derive(Debug, Clone)]
pub struct VectorField {
    header: GridHeader,
    /// `[row][col]`, `None` where either component is missing.
    rows: Vec<Vec<Option<[f32; 2]>>>,
    policy: HolePolicy,
}

impl VectorField {
    pub fn build(u: &GridRecord, v: &GridRecord, policy: HolePolicy) -> FieldResult<Self> {
        u.validate()?;
        v.validate()?;
        if !u.header().same_geometry(v.header()) {
            return Err(FieldError::InvalidGrid(
                "u and v records have different grid geometry".into(),
            ));
        }

        let header = *u.header();
        let rows = (0..header.height)
            .map(|row| {
                (0..header.width)
                    .map(|col| match (u.value(col, row), v.value(col, row)) {
                        (Some(u), Some(v)) => Some([u, v]),
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        log::debug!(
            "built vector field {}x{} at ({}, {}) step ({}, {})",
            header.width,
            header.height,
            header.origin_lon,
            header.origin_lat,
            header.delta_lon,
            header.delta_lat
        );

        Ok(Self { header, rows, policy })
    }

    /// Builds from a full backend response, selecting components by parameter number.
    pub fn from_records(records: &[GridRecord], policy: HolePolicy) -> FieldResult<Self> {
        let (u, v) = select_vector_components(records)?;
        Self::build(u, v, policy)
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn policy(&self) -> HolePolicy {
        self.policy
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<[f32; 2]> {
        self.rows.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    /// Bilinear vector at (lon, lat), or `None` over missing data or outside the grid.
    pub fn interpolate(&self, lon: f64, lat: f64) -> Option<FieldSample> {
        let (i, j) = self.header.fractional_index(lon, lat);
        let cell = Cell::locate(i, j, self.header.width, self.header.height)?;
        let corners = resolve_corners(cell.gather(|c, r| self.cell(c, r)), self.policy)?;
        let [u, v] = bilinear(cell.tx, cell.ty, corners);
        Some(FieldSample::new(u, v))
    }

    pub fn value_range(&self) -> Option<ComponentRange> {
        let mut cells = self.rows.iter().flatten().flatten();
        let first = cells.next()?;
        let start = Vec2::from_array(*first);
        let (min, max) = cells.fold((start, start), |(min, max), c| {
            let value = Vec2::from_array(*c);
            (min.min(value), max.max(value))
        });
        Some(ComponentRange { min, max })
    }
}

/// Single-quantity field (concentration, temperature).
#[derive(Debug, Clone)]
pub struct ScalarField {
    header: GridHeader,
    rows: Vec<Vec<Option<f32>>>,
    policy: HolePolicy,
}

impl ScalarField {
    pub fn build(record: &GridRecord, policy: HolePolicy) -> FieldResult<Self> {
        record.validate()?;
        let header = *record.header();
        let rows = (0..header.height)
            .map(|row| (0..header.width).map(|col| record.value(col, row)).collect())
            .collect();
        Ok(Self { header, rows, policy })
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn cell(&self, col: usize, row: usize) -> Option<f32> {
        self.rows.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn interpolate(&self, lon: f64, lat: f64) -> Option<f32> {
        let (i, j) = self.header.fractional_index(lon, lat);
        let cell = Cell::locate(i, j, self.header.width, self.header.height)?;
        let corners = cell.gather(|c, r| self.cell(c, r).map(|v| [v]));
        let [value] = bilinear(cell.tx, cell.ty, resolve_corners(corners, self.policy)?);
        Some(value)
    }

    pub fn value_range(&self) -> Option<(f32, f32)> {
        self.rows
            .iter()
            .flatten()
            .flatten()
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((min, max)) => Some((f32::min(min, v), f32::max(max, v))),
            })
    }
}
