// Raw gridded records as delivered by the data backend

use crate::error::{FieldError, FieldResult};
use crate::palette::Quantity;
use glam::DVec2;
use serde::{Deserialize, Serialize};

/// `parameterNumber` of the eastward (u) wind component.
pub const EASTWARD_PARAMETER: u32 = 2;
/// `parameterNumber` of the northward (v) wind component.
pub const NORTHWARD_PARAMETER: u32 = 3;

/// Grid geometry shared by every component of a field.
///
/// Serialized with the earth-style GRIB-JSON key names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridHeader {
    /// Longitude of sample [0, 0].
    #[serde(rename = "lo1")]
    pub origin_lon: f64,
    /// Latitude of sample [0, 0].
    #[serde(rename = "la1")]
    pub origin_lat: f64,
    #[serde(rename = "dx")]
    pub delta_lon: f64,
    /// Usually negative: rows run north to south.
    #[serde(rename = "dy")]
    pub delta_lat: f64,
    #[serde(rename = "nx")]
    pub width: usize,
    #[serde(rename = "ny")]
    pub height: usize,
    #[serde(rename = "parameterCategory", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<u32>,
    #[serde(rename = "parameterNumber", default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

impl GridHeader {
    pub fn new(origin: DVec2, delta: DVec2, width: usize, height: usize) -> Self {
        Self {
            origin_lon: origin.x,
            origin_lat: origin.y,
            delta_lon: delta.x,
            delta_lat: delta.y,
            width,
            height,
            category: None,
            number: None,
        }
    }

    pub fn with_parameter(mut self, category: u32, number: u32) -> Self {
        self.category = Some(category);
        self.number = Some(number);
        self
    }

    pub fn validate(&self) -> FieldResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FieldError::InvalidGrid(format!(
                "empty grid {}x{}",
                self.width, self.height
            )));
        }
        if !self.origin_lon.is_finite() || !self.origin_lat.is_finite() {
            return Err(FieldError::InvalidGrid("non-finite grid origin".into()));
        }
        if self.width.checked_mul(self.height).is_none() {
            return Err(FieldError::InvalidGrid(format!(
                "grid {}x{} has too many samples",
                self.width, self.height
            )));
        }
        let deltas_ok = |d: f64| d.is_finite() && d != 0.0;
        if !deltas_ok(self.delta_lon) || !deltas_ok(self.delta_lat) {
            return Err(FieldError::InvalidGrid(format!(
                "grid steps must be finite and non-zero, got dx={} dy={}",
                self.delta_lon, self.delta_lat
            )));
        }
        Ok(())
    }

    /// Origin, steps and sample counts match. Parameter tags are ignored.
    pub fn same_geometry(&self, other: &GridHeader) -> bool {
        self.origin_lon == other.origin_lon
            && self.origin_lat == other.origin_lat
            && self.delta_lon == other.delta_lon
            && self.delta_lat == other.delta_lat
            && self.width == other.width
            && self.height == other.height
    }

    /// Sample count, saturating for headers that have not been validated.
    pub fn len(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fractional (column, row) of a geographic coordinate.
    ///
    /// Row order is not fixed by convention, so both signs of `delta_lat` are handled.
    pub fn fractional_index(&self, lon: f64, lat: f64) -> (f64, f64) {
        let i = (lon - self.origin_lon) / self.delta_lon;
        let j = if self.delta_lat < 0.0 {
            (self.origin_lat - lat) / -self.delta_lat
        } else {
            (lat - self.origin_lat) / self.delta_lat
        };
        (i, j)
    }

    /// Geographic coordinate of sample (col, row).
    pub fn coordinate_of(&self, col: usize, row: usize) -> DVec2 {
        let lon = self.origin_lon + col as f64 * self.delta_lon;
        let lat = if self.delta_lat < 0.0 {
            self.origin_lat - row as f64 * -self.delta_lat
        } else {
            self.origin_lat + row as f64 * self.delta_lat
        };
        DVec2::new(lon, lat)
    }
}

/// One immutable lattice of samples. `None` is the explicit no-data marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRecord {
    header: GridHeader,
    data: Vec<Option<f32>>,
}

impl GridRecord {
    /// Validates geometry and data length. Non-finite samples are stored as no-data.
    pub fn new(header: GridHeader, data: Vec<Option<f32>>) -> FieldResult<Self> {
        let record = Self {
            header,
            data: data
                .into_iter()
                .map(|value| value.filter(|v| v.is_finite()))
                .collect(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> FieldResult<()> {
        self.header.validate()?;
        if self.data.len() != self.header.len() {
            return Err(FieldError::InvalidGrid(format!(
                "expected {} samples for a {}x{} grid, got {}",
                self.header.len(),
                self.header.width,
                self.header.height,
                self.data.len()
            )));
        }
        Ok(())
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn data(&self) -> &[Option<f32>] {
        &self.data
    }

    /// Sample at (col, row); `None` when missing or out of range.
    pub fn value(&self, col: usize, row: usize) -> Option<f32> {
        if col >= self.header.width || row >= self.header.height {
            return None;
        }
        self.data[row * self.header.width + col]
    }

    pub fn is_parameter(&self, category: Option<u32>, number: u32) -> bool {
        self.header.number == Some(number)
            && (category.is_none() || self.header.category == category)
    }

    /// Parses a JSON array of records and validates each one.
    pub fn list_from_json(json: &str) -> FieldResult<Vec<GridRecord>> {
        let records: Vec<GridRecord> = serde_json::from_str(json)?;
        for record in &records {
            record.validate()?;
        }
        Ok(records)
    }

    pub fn list_from_file(path: impl AsRef<std::path::Path>) -> FieldResult<Vec<GridRecord>> {
        let content = std::fs::read_to_string(path)?;
        Self::list_from_json(&content)
    }
}

/// Picks the eastward and northward components out of a vector-field response.
pub fn select_vector_components(records: &[GridRecord]) -> FieldResult<(&GridRecord, &GridRecord)> {
    let find = |number: u32, name: &str| {
        records
            .iter()
            .find(|r| r.is_parameter(None, number))
            .ok_or_else(|| FieldError::InvalidGrid(format!("missing {name} wind component")))
    };
    Ok((find(EASTWARD_PARAMETER, "eastward")?, find(NORTHWARD_PARAMETER, "northward")?))
}

/// Picks a scalar record by its category/number tag.
pub fn select_scalar(records: &[GridRecord], category: u32, number: u32) -> FieldResult<&GridRecord> {
    records
        .iter()
        .find(|r| r.is_parameter(Some(category), number))
        .ok_or_else(|| {
            FieldError::InvalidGrid(format!("missing scalar record {category}/{number}"))
        })
}

/// Parameters of one backend request for gridded data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRequest {
    /// Grid resolution selector in kilometres (9 or 27).
    pub grid_km: u32,
    pub layer: u32,
    #[serde(rename = "tstep")]
    pub time_step: u32,
    #[serde(rename = "bgPoll")]
    pub quantity: Quantity,
}

impl Default for FieldRequest {
    fn default() -> Self {
        Self {
            grid_km: 9,
            layer: 0,
            time_step: 0,
            quantity: Quantity::O3,
        }
    }
}
