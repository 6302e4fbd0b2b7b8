use crate::split::{IndexSplit, Subset};
use crate::store::{DatasetStore, StoreError};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub result: f64,
    pub size: usize,
}

impl Prediction {
    pub fn new(result: f64, size: usize) -> Self {
        Self { result, size }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    FailFast,
    BestEffort,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::FailFast
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    policy: ErrorPolicy,
    parallel: bool,
}

impl EvaluateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    /// `predict` receives `(train_features, train_targets, test_features, test_targets)`.
    pub fn split_predict<F, E>(
        &self,
        store: &DatasetStore,
        split: &IndexSplit,
        predict: F,
    ) -> Result<Evaluation, EvaluateError>
    where
        F: Fn(&[Vec<f64>], &[f64], &[Vec<f64>], &[f64]) -> Result<Prediction, E> + Sync,
        E: Into<BoxError>,
    {
        let evaluate = |(i, subset): (usize, &Subset)| evaluate_subset(store, i, subset, &predict);
        let subsets = split.subsets();

        let outcomes: Vec<Result<Evaluated, Failure>> = match (self.parallel, self.policy) {
            (true, ErrorPolicy::FailFast) => subsets
                .par_iter()
                .enumerate()
                .map(|x| evaluate(x).map(Ok))
                .collect::<Result<Vec<_>, _>>()?,
            (true, ErrorPolicy::BestEffort) => subsets
                .par_iter()
                .enumerate()
                .map(|x| into_outcome(evaluate(x)))
                .collect::<Result<Vec<_>, _>>()?,
            (false, ErrorPolicy::FailFast) => subsets
                .iter()
                .enumerate()
                .map(|x| evaluate(x).map(Ok))
                .collect::<Result<Vec<_>, _>>()?,
            (false, ErrorPolicy::BestEffort) => subsets
                .iter()
                .enumerate()
                .map(|x| into_outcome(evaluate(x)))
                .collect::<Result<Vec<_>, _>>()?,
        };

        let mut evaluation = Evaluation::default();
        for outcome in outcomes {
            match outcome {
                Ok(evaluated) => evaluation.predictions.push(evaluated),
                Err(failure) => {
                    tracing::warn!("Skipping subset {}: {}", failure.subset, failure.error);
                    evaluation.failures.push(failure);
                }
            }
        }
        Ok(evaluation)
    }
}

fn evaluate_subset<F, E>(
    store: &DatasetStore,
    position: usize,
    subset: &Subset,
    predict: &F,
) -> Result<Evaluated, SubsetError>
where
    F: Fn(&[Vec<f64>], &[f64], &[Vec<f64>], &[f64]) -> Result<Prediction, E>,
    E: Into<BoxError>,
{
    let (train_features, train_targets) = store.load_rows(&subset.train)?;
    let (test_features, test_targets) = store.load_rows(&subset.test)?;

    let prediction = predict(&train_features, &train_targets, &test_features, &test_targets)
        .map_err(|e| SubsetError::Prediction {
            size: subset.train.len(),
            error: PredictionError::Failed {
                subset: position,
                source: e.into(),
            },
        })?;
    if !prediction.result.is_finite() {
        return Err(SubsetError::Prediction {
            size: subset.train.len(),
            error: PredictionError::NonFiniteResult {
                subset: position,
                result: prediction.result,
            },
        });
    }

    tracing::debug!(
        "Subset {} (level {}): size={}, result={}",
        position,
        subset.level,
        prediction.size,
        prediction.result
    );
    Ok(Evaluated {
        subset: position,
        prediction,
    })
}

// Store errors stay fatal.
fn into_outcome(
    result: Result<Evaluated, SubsetError>,
) -> Result<Result<Evaluated, Failure>, EvaluateError> {
    match result {
        Ok(evaluated) => Ok(Ok(evaluated)),
        Err(SubsetError::Store(e)) => Err(e.into()),
        Err(SubsetError::Prediction { size, error }) => Ok(Err(Failure {
            subset: error.subset(),
            size,
            error,
        })),
    }
}

#[derive(Debug)]
enum SubsetError {
    Store(StoreError),
    Prediction { size: usize, error: PredictionError },
}

impl From<StoreError> for SubsetError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<SubsetError> for EvaluateError {
    fn from(e: SubsetError) -> Self {
        match e {
            SubsetError::Store(e) => Self::Store(e),
            SubsetError::Prediction { error, .. } => Self::Prediction(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluated {
    pub subset: usize,
    pub prediction: Prediction,
}

#[derive(Debug)]
pub struct Failure {
    pub subset: usize,
    pub size: usize,
    pub error: PredictionError,
}

#[derive(Debug, Default)]
pub struct Evaluation {
    predictions: Vec<Evaluated>,
    failures: Vec<Failure>,
}

impl Evaluation {
    pub fn evaluated(&self) -> &[Evaluated] {
        &self.predictions
    }

    pub fn predictions(&self) -> Vec<Prediction> {
        self.predictions.iter().map(|e| e.prediction).collect()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("prediction for subset {subset} failed: {source}")]
    Failed {
        subset: usize,
        #[source]
        source: BoxError,
    },

    #[error("prediction for subset {subset} returned a non finite result ({result})")]
    NonFiniteResult { subset: usize, result: f64 },
}

impl PredictionError {
    pub fn subset(&self) -> usize {
        match self {
            Self::Failed { subset, .. } | Self::NonFiniteResult { subset, .. } => *subset,
        }
    }
}

#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),
}
