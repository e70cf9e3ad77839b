//! Landmark map and sensor-range selection.
//!
//! The map is loaded once and treated as read-only by the filter. Two on-disk formats are supported:
//! - CSV with an `id,x,y` header.
//! - The whitespace separated `x y id` text format (one landmark per line, no header) used by the
//!   common kidnapped-vehicle datasets.
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::error::{FilterError, Result};
use crate::geometry::dist;
use crate::{Landmark, LandmarkObservation};

/// Ordered, immutable collection of map landmarks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LandmarkMap {
    landmarks: Vec<Landmark>,
}
impl From<Vec<Landmark>> for LandmarkMap {
    fn from(landmarks: Vec<Landmark>) -> Self {
        LandmarkMap { landmarks }
    }
}
impl LandmarkMap {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        LandmarkMap { landmarks }
    }
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
    /// Landmarks within `sensor_range` (inclusive) of the point `(x, y)`, in map order.
    ///
    /// The result keeps each landmark's own id and may be empty.
    ///
    /// # Example
    /// ```rust
    /// use localizer::{Landmark, LandmarkMap};
    /// let map = LandmarkMap::new(vec![Landmark::new(1, 1.0, 0.0), Landmark::new(2, 10.0, 0.0)]);
    /// let in_range = map.landmarks_in_range(0.0, 0.0, 5.0);
    /// assert_eq!(in_range.len(), 1);
    /// assert_eq!(in_range[0].id, 1);
    /// ```
    pub fn landmarks_in_range(
        &self,
        x: f64,
        y: f64,
        sensor_range: f64,
    ) -> Vec<LandmarkObservation> {
        self.landmarks
            .iter()
            .filter(|landmark| dist(x, y, landmark.x, landmark.y) <= sensor_range)
            .map(LandmarkObservation::from)
            .collect()
    }
    /// Read a map from a CSV file with an `id,x,y` header.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let mut landmarks = Vec::new();
        for result in rdr.deserialize() {
            let landmark: Landmark = result?;
            landmarks.push(landmark);
        }
        Ok(LandmarkMap { landmarks })
    }
    /// Write the map as CSV with an `id,x,y` header.
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for landmark in &self.landmarks {
            writer.serialize(landmark)?;
        }
        writer.flush()?;
        Ok(())
    }
    /// Read a map in the whitespace separated `x y id` text format. Blank lines are skipped.
    pub fn from_text<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut landmarks = Vec::new();
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 3 {
                return Err(FilterError::Format(format!(
                    "map line {}: expected 3 fields (x y id), found {}",
                    line_number + 1,
                    fields.len()
                )));
            }
            let x: f64 = parse_field(fields[0], line_number)?;
            let y: f64 = parse_field(fields[1], line_number)?;
            let id: usize = parse_field(fields[2], line_number)?;
            landmarks.push(Landmark::new(id, x, y));
        }
        Ok(LandmarkMap { landmarks })
    }
    /// Read a map choosing the format by extension: `.csv` for CSV, anything else for the text format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let ext = p
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_lowercase());
        match ext.as_deref() {
            Some("csv") => Self::from_csv(p),
            _ => Self::from_text(p),
        }
    }
}

fn parse_field<T>(field: &str, line_number: usize) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    field
        .parse::<T>()
        .map_err(|e| FilterError::Format(format!("map line {}: {e}", line_number + 1)))
}
