//! Collection of per-(configuration, image) measurements.

use serde::{Deserialize, Serialize};

use rdsweep_core::{RateDistortionPoint, Result, SweepError};

/// A `configurations × images` matrix of optional measurements.
///
/// Serialized as nested arrays: unwritten cells are `null` and infinite
/// values are the strings `"inf"` / `"-inf"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredMatrix", into = "StoredMatrix")]
pub struct ResultMatrix {
    rows: usize,
    cols: usize,
    cells: Vec<Option<f64>>,
}

impl ResultMatrix {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            self.cells[row * self.cols + col]
        } else {
            None
        }
    }

    /// Cells of `row`, or `None` past the last row.
    pub fn row(&self, row: usize) -> Option<&[Option<f64>]> {
        (row < self.rows).then(|| &self.cells[row * self.cols..(row + 1) * self.cols])
    }

    /// True if every cell of `row` was written.
    pub fn is_row_complete(&self, row: usize) -> bool {
        self.row(row)
            .is_some_and(|cells| cells.iter().all(Option::is_some))
    }

    /// Mean of the written cells of `row`.
    pub fn row_mean(&self, row: usize) -> Option<f64> {
        let written: Vec<f64> = self.row(row)?.iter().flatten().copied().collect();
        if written.is_empty() {
            return None;
        }
        Some(written.iter().sum::<f64>() / written.len() as f64)
    }

    fn is_written(&self, row: usize, col: usize) -> bool {
        self.cells[row * self.cols + col].is_some()
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        self.cells[row * self.cols + col] = Some(value);
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredCell {
    Number(f64),
    Text(String),
}

#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct StoredMatrix(Vec<Vec<Option<StoredCell>>>);

impl From<ResultMatrix> for StoredMatrix {
    fn from(matrix: ResultMatrix) -> Self {
        let rows = (0..matrix.rows)
            .map(|r| {
                matrix
                    .row(r)
                    .into_iter()
                    .flatten()
                    .map(|cell| {
                        cell.map(|v| {
                            if v.is_finite() {
                                StoredCell::Number(v)
                            } else if v > 0.0 {
                                StoredCell::Text("inf".into())
                            } else {
                                StoredCell::Text("-inf".into())
                            }
                        })
                    })
                    .collect()
            })
            .collect();
        StoredMatrix(rows)
    }
}

impl TryFrom<StoredMatrix> for ResultMatrix {
    type Error = String;

    fn try_from(stored: StoredMatrix) -> std::result::Result<Self, String> {
        let rows = stored.0.len();
        let cols = stored.0.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(rows * cols);
        for (r, row) in stored.0.into_iter().enumerate() {
            if row.len() != cols {
                return Err(format!("row {r} has {} cells, expected {cols}", row.len()));
            }
            for cell in row {
                cells.push(match cell {
                    None => None,
                    Some(StoredCell::Number(v)) => Some(v),
                    Some(StoredCell::Text(t)) => Some(match t.as_str() {
                        "inf" => f64::INFINITY,
                        "-inf" => f64::NEG_INFINITY,
                        other => return Err(format!("unexpected cell value {other:?}")),
                    }),
                });
            }
        }
        Ok(Self { rows, cols, cells })
    }
}

/// Rate and PSNR matrices of one sweep.
///
/// Every cell is written at most once. Recorded values are never changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultAggregator {
    rate: ResultMatrix,
    psnr: ResultMatrix,
}

impl ResultAggregator {
    pub fn new(configurations: usize, images: usize) -> Self {
        Self {
            rate: ResultMatrix::new(configurations, images),
            psnr: ResultMatrix::new(configurations, images),
        }
    }

    /// Records one measurement.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for out-of-range indices, `InvalidMeasurement` for a
    /// value outside its domain and `AggregationConflict` if the cell was
    /// already written.
    pub fn record(&mut self, configuration: usize, image: usize, rate: f64, psnr: f64) -> Result<()> {
        let point = RateDistortionPoint::new(rate, psnr)?;
        self.record_point(configuration, image, point)
    }

    /// Records an already validated point.
    pub fn record_point(
        &mut self,
        configuration: usize,
        image: usize,
        point: RateDistortionPoint,
    ) -> Result<()> {
        let (rows, cols) = self.rate.shape();
        if configuration >= rows || image >= cols {
            return Err(SweepError::shape_mismatch(
                "result cell",
                format!("< ({rows}, {cols})"),
                format!("({configuration}, {image})"),
            ));
        }
        if self.rate.is_written(configuration, image) || self.psnr.is_written(configuration, image)
        {
            return Err(SweepError::AggregationConflict {
                configuration,
                image,
            });
        }
        self.rate.set(configuration, image, point.rate);
        self.psnr.set(configuration, image, point.psnr);
        Ok(())
    }

    pub fn rate(&self) -> &ResultMatrix {
        &self.rate
    }

    pub fn psnr(&self) -> &ResultMatrix {
        &self.psnr
    }

    pub fn configurations(&self) -> usize {
        self.rate.rows()
    }

    pub fn images(&self) -> usize {
        self.rate.cols()
    }

    /// Mean rate over the recorded images of a configuration.
    pub fn mean_rate(&self, configuration: usize) -> Option<f64> {
        self.rate.row_mean(configuration)
    }

    /// Mean PSNR over the recorded images of a configuration.
    pub fn mean_psnr(&self, configuration: usize) -> Option<f64> {
        self.psnr.row_mean(configuration)
    }

    /// Splits into `(rate, psnr)`.
    pub fn into_matrices(self) -> (ResultMatrix, ResultMatrix) {
        (self.rate, self.psnr)
    }
}
