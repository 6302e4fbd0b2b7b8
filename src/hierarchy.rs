use crate::evaluate::{BoxError, EvaluateError, EvaluateOptions, Evaluation, Prediction};
use crate::split::{ConfigError, IndexSplit, SplitFileError, SplitOptions};
use crate::store::DatasetStore;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug)]
pub struct Hierarchy {
    store: DatasetStore,
    split_file: Option<PathBuf>,
    evaluate: EvaluateOptions,
}

impl Hierarchy {
    pub fn new(store: DatasetStore) -> Self {
        Self {
            store,
            split_file: None,
            evaluate: EvaluateOptions::default(),
        }
    }

    pub fn split_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.split_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn evaluate_options(mut self, options: EvaluateOptions) -> Self {
        self.evaluate = options;
        self
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn into_store(self) -> DatasetStore {
        self.store
    }

    /// Computes the subsets for `options`, reusing the split file when it
    /// holds a split made with the same parameters over the same rows.
    pub fn split_index(&self, options: &SplitOptions) -> Result<IndexSplit, HierarchyError> {
        let rows = self.store.rows_len();
        if let Some(path) = self.split_file.as_ref().filter(|p| p.exists()) {
            match IndexSplit::load(path) {
                Ok(split) if split.matches(options, rows) => {
                    tracing::info!("Reusing {} subsets from {}", split.len(), path.display());
                    return Ok(split);
                }
                Ok(_) => tracing::info!("Split file {} is stale; recomputing", path.display()),
                Err(e) => tracing::warn!("Ignoring unreadable split file: {}", e),
            }
        }

        let split = options.split_index(&self.store.load_index())?;
        if let Some(path) = &self.split_file {
            split.save(path)?;
            tracing::info!("Saved {} subsets to {}", split.len(), path.display());
        }
        Ok(split)
    }

    pub fn split_predict<F, E>(
        &self,
        split: &IndexSplit,
        predict: F,
    ) -> Result<Evaluation, EvaluateError>
    where
        F: Fn(&[Vec<f64>], &[f64], &[Vec<f64>], &[f64]) -> Result<Prediction, E> + Sync,
        E: Into<BoxError>,
    {
        self.evaluate.split_predict(&self.store, split, predict)
    }
}

#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    SplitFile(#[from] SplitFileError),
}
