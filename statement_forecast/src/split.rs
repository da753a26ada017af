//! Chronological train/validation partitioning

use crate::data::FinancialSeries;
use crate::error::{PipelineError, Result};
use crate::features::FeatureTable;
use std::ops::Range;

/// Default share of periods used for training
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Time-ordered data that can be cut into contiguous blocks
pub trait Chronological: Sized {
    fn len(&self) -> usize;
    fn slice(&self, range: Range<usize>) -> Self;
}

impl Chronological for FeatureTable {
    fn len(&self) -> usize {
        FeatureTable::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Self {
        FeatureTable::slice(self, range)
    }
}

impl Chronological for FinancialSeries {
    fn len(&self) -> usize {
        FinancialSeries::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Self {
        FinancialSeries::slice(self, range)
    }
}

/// Training segment followed by validation segment
#[derive(Debug, Clone, PartialEq)]
pub struct Split<T> {
    pub training: T,
    pub validation: T,
}

/// Cuts data at `floor(len * train_fraction)` without reordering
#[derive(Debug, Clone, Copy)]
pub struct Splitter {
    train_fraction: f64,
}

impl Default for Splitter {
    fn default() -> Self {
        Self {
            train_fraction: DEFAULT_TRAIN_FRACTION,
        }
    }
}

impl Splitter {
    pub fn new(train_fraction: f64) -> Result<Self> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(PipelineError::InvalidParameter(format!(
                "Train fraction must be between 0 and 1 (exclusive), got {}",
                train_fraction
            )));
        }
        Ok(Self { train_fraction })
    }

    pub fn train_fraction(&self) -> f64 {
        self.train_fraction
    }

    /// Index of the first validation row
    pub fn cutoff(&self, len: usize) -> usize {
        (len as f64 * self.train_fraction).floor() as usize
    }

    pub fn split<T: Chronological>(&self, data: &T) -> Result<Split<T>> {
        let len = data.len();
        let cutoff = self.cutoff(len);

        if cutoff == 0 || cutoff >= len {
            return Err(PipelineError::InsufficientData {
                required: self.minimum_len(),
                actual: len,
            });
        }

        Ok(Split {
            training: data.slice(0..cutoff),
            validation: data.slice(cutoff..len),
        })
    }

    /// Smallest length that leaves both segments non-empty
    pub fn minimum_len(&self) -> usize {
        (2..)
            .find(|&n| {
                let cutoff = self.cutoff(n);
                cutoff > 0 && cutoff < n
            })
            .unwrap_or(2)
    }
}

/// Split with an explicit training fraction
pub fn split<T: Chronological>(data: &T, train_fraction: f64) -> Result<Split<T>> {
    Splitter::new(train_fraction)?.split(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeriesId;
    use crate::schema::StatementKind;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn series(len: usize) -> FinancialSeries {
        let start = NaiveDate::from_ymd_opt(2020, 3, 31).unwrap();
        let periods = (0..len)
            .map(|i| start + chrono::Duration::days(91 * i as i64))
            .collect();
        let values = (0..len).map(|i| i as f64).collect();
        FinancialSeries::from_parts(
            SeriesId::new("TEST", StatementKind::QuarterlyIncomeStatement, "total_revenue"),
            periods,
            values,
        )
        .unwrap()
    }

    #[rstest]
    #[case(10, 0.8, 8)]
    #[case(12, 0.8, 9)]
    #[case(5, 0.5, 2)]
    #[case(3, 0.9, 2)]
    #[case(7, 0.15, 1)]
    fn test_cutoff_and_concatenation(
        #[case] len: usize,
        #[case] fraction: f64,
        #[case] cutoff: usize,
    ) {
        let data = series(len);
        let parts = split(&data, fraction).unwrap();
        assert_eq!(parts.training.len(), cutoff);
        assert_eq!(parts.training.len() + parts.validation.len(), len);

        let rejoined: Vec<f64> = parts
            .training
            .values()
            .iter()
            .chain(parts.validation.values())
            .copied()
            .collect();
        assert_eq!(rejoined, data.values());
    }

    #[rstest]
    #[case(1, 0.8)]
    #[case(4, 0.1)]
    #[case(0, 0.5)]
    fn test_empty_segment_rejected(#[case] len: usize, #[case] fraction: f64) {
        let err = split(&series(len), fraction).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { .. }));
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(-0.2)]
    #[case(f64::NAN)]
    fn test_fraction_out_of_range(#[case] fraction: f64) {
        assert!(matches!(
            Splitter::new(fraction),
            Err(PipelineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_minimum_len() {
        assert_eq!(Splitter::default().minimum_len(), 2);
        assert_eq!(Splitter::new(0.1).unwrap().minimum_len(), 10);
    }
}
