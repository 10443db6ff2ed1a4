//! Dollar-volume weighted daily returns from stacked quote records

use crate::error::{RegimeError, Result};
use crate::regime::RetainedIndex;
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// One instrument on one day, CRSP daily layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub date: NaiveDate,
    /// Permanent instrument identifier
    pub permno: i64,
    /// Daily low (or closing bid)
    pub bid_lo: Option<f64>,
    /// Daily high (or closing ask)
    pub ask_hi: Option<f64>,
    pub volume: Option<f64>,
    /// Return excluding dividends
    pub retx: Option<f64>,
}

impl QuoteRecord {
    /// Mid price times volume; missing or non-finite inputs count as zero
    pub fn dollar_volume(&self) -> f64 {
        let mid = (value_or_zero(self.ask_hi) + value_or_zero(self.bid_lo)) / 2.0;
        mid * value_or_zero(self.volume)
    }
}

fn value_or_zero(v: Option<f64>) -> f64 {
    v.filter(|x| x.is_finite()).unwrap_or(0.0)
}

/// Dates × instruments matrix of weighted returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedReturns {
    /// Trading days kept, ascending
    pub index: RetainedIndex,
    /// Instrument ids, ascending; one per column
    pub instruments: Vec<i64>,
    pub matrix: Array2<f64>,
}

impl WeightedReturns {
    pub fn n_days(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_instruments(&self) -> usize {
        self.matrix.ncols()
    }
}

/// Pivots quotes by date and instrument and weights each return by the
/// instrument's share of that day's dollar volume.
///
/// Days with no traded dollar volume are dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReturnsTransform {
    /// Multiplier applied to every weighted return
    pub alpha: f64,
}

impl Default for ReturnsTransform {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl ReturnsTransform {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn transform(&self, records: &[QuoteRecord]) -> Result<WeightedReturns> {
        if !self.alpha.is_finite() {
            return Err(RegimeError::InvalidParameter {
                name: "alpha".to_string(),
                value: self.alpha.to_string(),
                reason: "must be finite".to_string(),
            });
        }
        if records.is_empty() {
            return Err(RegimeError::DataError("no quote records to transform".to_string()));
        }

        let dates: Vec<NaiveDate> = records
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let instruments: Vec<i64> = records
            .iter()
            .map(|r| r.permno)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column_of: HashMap<i64, usize> = instruments
            .iter()
            .enumerate()
            .map(|(j, &p)| (p, j))
            .collect();
        let row_of: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, &d)| (d, i)).collect();

        let shape = (dates.len(), instruments.len());
        let mut dollars = Array2::<f64>::zeros(shape);
        let mut retx = Array2::<f64>::zeros(shape);
        let mut seen = Array2::<bool>::from_elem(shape, false);

        for record in records {
            let (i, j) = (row_of[&record.date], column_of[&record.permno]);
            if seen[[i, j]] {
                return Err(RegimeError::DataError(format!(
                    "duplicate quote for PERMNO {} on {}",
                    record.permno, record.date
                )));
            }
            seen[[i, j]] = true;
            dollars[[i, j]] = record.dollar_volume();
            retx[[i, j]] = value_or_zero(record.retx);
        }

        let active: Vec<usize> = dollars
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| row.sum() != 0.0)
            .map(|(i, _)| i)
            .collect();
        debug!(
            n_days = dates.len(),
            n_inactive = dates.len() - active.len(),
            "Dropping days without traded dollar volume"
        );
        if active.is_empty() {
            return Err(RegimeError::DataError(
                "every day has zero traded dollar volume".to_string(),
            ));
        }

        let mut matrix = Array2::<f64>::zeros((active.len(), instruments.len()));
        for (out, &i) in active.iter().enumerate() {
            let total = dollars.row(i).sum();
            for j in 0..instruments.len() {
                matrix[[out, j]] = self.alpha * (dollars[[i, j]] / total) * retx[[i, j]];
            }
        }

        let index: RetainedIndex = active.iter().map(|&i| dates[i]).collect();
        info!(
            n_days = index.len(),
            n_instruments = instruments.len(),
            n_records = records.len(),
            "Built weighted returns matrix"
        );

        Ok(WeightedReturns {
            index,
            instruments,
            matrix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 6, d).unwrap()
    }

    fn quote(d: u32, permno: i64, lo: f64, hi: f64, vol: f64, ret: f64) -> QuoteRecord {
        QuoteRecord {
            date: day(d),
            permno,
            bid_lo: Some(lo),
            ask_hi: Some(hi),
            volume: Some(vol),
            retx: Some(ret),
        }
    }

    #[test]
    fn test_weights_by_dollar_volume() {
        let records = vec![
            // mid 10 * 100 = 1000 dollars
            quote(3, 20, 9.0, 11.0, 100.0, 0.02),
            // mid 30 * 100 = 3000 dollars
            quote(3, 10, 29.0, 31.0, 100.0, -0.04),
        ];
        let out = ReturnsTransform::default().transform(&records).unwrap();
        assert_eq!(out.instruments, vec![10, 20]);
        assert_eq!(out.matrix.dim(), (1, 2));
        assert!((out.matrix[[0, 0]] - 0.75 * -0.04).abs() < 1e-12);
        assert!((out.matrix[[0, 1]] - 0.25 * 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_scales_returns() {
        let records = vec![quote(3, 1, 1.0, 1.0, 10.0, 0.1)];
        let out = ReturnsTransform::new(100.0).transform(&records).unwrap();
        assert!((out.matrix[[0, 0]] - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_inactive_days_dropped() {
        let records = vec![
            quote(5, 1, 1.0, 1.0, 10.0, 0.1),
            quote(4, 1, 1.0, 1.0, 0.0, 0.3),
            quote(3, 1, 2.0, 2.0, 5.0, -0.1),
        ];
        let out = ReturnsTransform::default().transform(&records).unwrap();
        assert_eq!(out.index.as_slice(), &[day(3), day(5)]);
        assert_eq!(out.n_days(), 2);
    }

    #[test]
    fn test_missing_values_count_as_zero() {
        let mut sparse = quote(3, 2, 1.0, 1.0, 10.0, 0.5);
        sparse.volume = None;
        let records = vec![quote(3, 1, 1.0, 1.0, 10.0, 0.2), sparse];
        let out = ReturnsTransform::default().transform(&records).unwrap();
        assert!((out.matrix[[0, 0]] - 0.2).abs() < 1e-12);
        assert_eq!(out.matrix[[0, 1]], 0.0);
    }

    #[test]
    fn test_duplicate_quote_rejected() {
        let records = vec![quote(3, 1, 1.0, 1.0, 1.0, 0.0), quote(3, 1, 1.0, 1.0, 2.0, 0.0)];
        assert!(matches!(
            ReturnsTransform::default().transform(&records),
            Err(RegimeError::DataError(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(ReturnsTransform::default().transform(&[]).is_err());
    }
}
