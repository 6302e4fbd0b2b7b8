use crate::evaluate::Prediction;
use crate::functions;
use itertools::Itertools as _;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCurve {
    pub mean_sizes: Vec<f64>,
    pub mean_errors: Vec<f64>,
    pub stddev_errors: Vec<f64>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    pub size: f64,
    pub mean_error: f64,
    pub stddev_error: f64,
    pub count: usize,
}

impl LearningCurve {
    pub fn len(&self) -> usize {
        self.mean_sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean_sizes.is_empty()
    }

    pub fn points(&self) -> impl '_ + Iterator<Item = CurvePoint> {
        (0..self.len()).map(move |i| CurvePoint {
            size: self.mean_sizes[i],
            mean_error: self.mean_errors[i],
            stddev_error: self.stddev_errors[i],
            count: self.counts[i],
        })
    }

    pub fn best(&self) -> Option<CurvePoint> {
        self.points().min_by_key(|p| OrderedFloat(p.mean_error))
    }
}

/// Groups `results` by training size and averages the error within each group.
pub fn transform_output(results: &[Prediction]) -> Result<LearningCurve, EmptyInputError> {
    if results.is_empty() {
        return Err(EmptyInputError);
    }

    let mut curve = LearningCurve {
        mean_sizes: Vec::new(),
        mean_errors: Vec::new(),
        stddev_errors: Vec::new(),
        counts: Vec::new(),
    };
    let groups = results
        .iter()
        .sorted_by_key(|p| p.size)
        .group_by(|p| p.size);
    for (size, group) in &groups {
        let errors = group.map(|p| p.result).collect::<Vec<_>>();
        let (mean, stddev) = functions::mean_and_stddev(errors.iter().copied());
        curve.mean_sizes.push(size as f64);
        curve.mean_errors.push(mean);
        curve.stddev_errors.push(stddev);
        curve.counts.push(errors.len());
    }
    Ok(curve)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot aggregate an empty list of prediction results")]
pub struct EmptyInputError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_output_works() -> Result<(), anyhow::Error> {
        let curve = transform_output(&[
            Prediction::new(6.0, 20),
            Prediction::new(2.0, 10),
            Prediction::new(4.0, 10),
        ])?;
        assert_eq!(curve.mean_sizes, vec![10.0, 20.0]);
        assert_eq!(curve.mean_errors, vec![3.0, 6.0]);
        assert_eq!(curve.stddev_errors, vec![1.0, 0.0]);
        assert_eq!(curve.counts, vec![2, 1]);
        Ok(())
    }

    #[test]
    fn singleton_groups_are_unchanged() -> Result<(), anyhow::Error> {
        let curve = transform_output(&[Prediction::new(0.25, 5), Prediction::new(0.5, 3)])?;
        assert_eq!(curve.mean_sizes, vec![3.0, 5.0]);
        assert_eq!(curve.mean_errors, vec![0.5, 0.25]);
        Ok(())
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(transform_output(&[]), Err(EmptyInputError));
    }

    #[test]
    fn best_point_has_lowest_error() -> Result<(), anyhow::Error> {
        let curve = transform_output(&[
            Prediction::new(9.0, 10),
            Prediction::new(3.0, 40),
            Prediction::new(5.0, 20),
        ])?;
        let best = curve.best().expect("non-empty curve");
        assert_eq!(best.size, 40.0);
        assert_eq!(best.mean_error, 3.0);
        assert_eq!(curve.points().count(), 3);
        Ok(())
    }
}
