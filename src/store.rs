use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type RowId = usize;

pub type FeatureMatrix = Vec<Vec<f64>>;

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    index: Vec<RowId>,
    features: FeatureMatrix,
    targets: Vec<f64>,
}

/// The backing file is never removed implicitly; call [`DatasetStore::remove`].
#[derive(Debug)]
pub struct DatasetStore {
    path: PathBuf,
    document: Document,
    positions: HashMap<RowId, usize>,
}

impl DatasetStore {
    /// Writes `features` and `targets` to `path`, replacing any existing file.
    pub fn create<P: AsRef<Path>>(
        path: P,
        features: &[Vec<f64>],
        targets: &[f64],
    ) -> Result<Self, StoreError> {
        if targets.is_empty() {
            return Err(StoreError::EmptyTable);
        }
        if features.len() != targets.len() {
            return Err(StoreError::RowSizeMismatch {
                features: features.len(),
                targets: targets.len(),
            });
        }

        let width = features[0].len();
        for (row, (xs, y)) in features.iter().zip(targets.iter()).enumerate() {
            if xs.len() != width {
                return Err(StoreError::RaggedFeatures { row });
            }
            if !y.is_finite() || xs.iter().any(|x| !x.is_finite()) {
                return Err(StoreError::NonFiniteValue { row });
            }
        }

        let document = Document {
            index: (0..targets.len()).collect(),
            features: features.to_vec(),
            targets: targets.to_vec(),
        };

        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path).map_err(StoreError::io(&path))?);
        serde_json::to_writer(&mut writer, &document).map_err(StoreError::json(&path))?;
        writer.flush().map_err(StoreError::io(&path))?;
        tracing::info!(
            "Stored {} rows x {} features in {}",
            document.targets.len(),
            width,
            path.display()
        );

        Ok(Self::with_document(path, document))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let reader = BufReader::new(File::open(&path).map_err(StoreError::io(&path))?);
        let document: Document =
            serde_json::from_reader(reader).map_err(StoreError::json(&path))?;

        let rows = document.index.len();
        if document.features.len() != rows || document.targets.len() != rows {
            return Err(StoreError::Corrupted {
                path,
                reason: "index, features and targets have different lengths",
            });
        }
        if let Some(first) = document.features.first() {
            if document.features.iter().any(|xs| xs.len() != first.len()) {
                return Err(StoreError::Corrupted {
                    path,
                    reason: "feature rows have different widths",
                });
            }
        }

        let store = Self::with_document(path, document);
        if store.positions.len() != rows {
            return Err(StoreError::Corrupted {
                path: store.path,
                reason: "row index contains duplicate ids",
            });
        }
        Ok(store)
    }

    fn with_document(path: PathBuf, document: Document) -> Self {
        let positions = document
            .index
            .iter()
            .enumerate()
            .map(|(position, &id)| (id, position))
            .collect();
        Self {
            path,
            document,
            positions,
        }
    }

    pub fn load_index(&self) -> Vec<RowId> {
        self.document.index.clone()
    }

    pub fn load_rows(&self, ids: &[RowId]) -> Result<(FeatureMatrix, Vec<f64>), StoreError> {
        let mut features = Vec::with_capacity(ids.len());
        let mut targets = Vec::with_capacity(ids.len());
        for &id in ids {
            let &position = self
                .positions
                .get(&id)
                .ok_or(StoreError::UnknownRow { id, rows: self.rows_len() })?;
            features.push(self.document.features[position].clone());
            targets.push(self.document.targets[position]);
        }
        Ok((features, targets))
    }

    pub fn rows_len(&self) -> usize {
        self.document.index.len()
    }

    pub fn features_len(&self) -> usize {
        self.document.features.first().map_or(0, Vec::len)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(self) -> Result<(), StoreError> {
        std::fs::remove_file(&self.path).map_err(StoreError::io(&self.path))?;
        tracing::debug!("Removed dataset store {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on dataset store {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode or decode dataset store {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("dataset store {path:?} is corrupted: {reason}")]
    Corrupted { path: PathBuf, reason: &'static str },

    #[error("features and targets must have one or more rows")]
    EmptyTable,

    #[error("features have {features} rows but targets have {targets}")]
    RowSizeMismatch { features: usize, targets: usize },

    #[error("feature row {row} has a different width from the first row")]
    RaggedFeatures { row: usize },

    #[error("row {row} contains non finite numbers")]
    NonFiniteValue { row: usize },

    #[error("row id {id} is out of range for a store of {rows} rows")]
    UnknownRow { id: RowId, rows: usize },
}

impl StoreError {
    fn io(path: &Path) -> impl '_ + FnOnce(std::io::Error) -> Self {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path) -> impl '_ + FnOnce(serde_json::Error) -> Self {
        move |source| Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> (FeatureMatrix, Vec<f64>) {
        let features = vec![
            vec![0.0, 2.0, 1.0],
            vec![1.0, 2.0, 1.0],
            vec![2.0, 1.0, 0.0],
            vec![2.0, 0.0, 0.0],
            vec![0.5, 1.5, 1.0],
        ];
        let targets = vec![25.0, 46.0, 45.0, 52.0, 23.0];
        (features, targets)
    }

    #[test]
    fn full_index_round_trips() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (features, targets) = dataset();
        let store = DatasetStore::create(dir.path().join("store.json"), &features, &targets)?;

        let index = store.load_index();
        assert_eq!(index, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.load_rows(&index)?, (features.clone(), targets.clone()));

        let reopened = DatasetStore::open(store.path())?;
        assert_eq!(reopened.load_rows(&index)?, (features, targets));
        assert_eq!(reopened.features_len(), 3);
        Ok(())
    }

    #[test]
    fn rows_come_back_in_requested_order() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (features, targets) = dataset();
        let store = DatasetStore::create(dir.path().join("store.json"), &features, &targets)?;

        let (xs, ys) = store.load_rows(&[3, 0])?;
        assert_eq!(xs, vec![features[3].clone(), features[0].clone()]);
        assert_eq!(ys, vec![52.0, 25.0]);
        Ok(())
    }

    #[test]
    fn unknown_row_is_rejected() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (features, targets) = dataset();
        let store = DatasetStore::create(dir.path().join("store.json"), &features, &targets)?;

        assert!(matches!(
            store.load_rows(&[1, 5]),
            Err(StoreError::UnknownRow { id: 5, rows: 5 })
        ));
        Ok(())
    }

    #[test]
    fn invalid_input_is_rejected() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        let (features, targets) = dataset();

        assert!(matches!(
            DatasetStore::create(&path, &features, &targets[..4]),
            Err(StoreError::RowSizeMismatch { features: 5, targets: 4 })
        ));
        assert!(matches!(
            DatasetStore::create(&path, &[], &[]),
            Err(StoreError::EmptyTable)
        ));

        let mut ragged = features.clone();
        ragged[2].pop();
        assert!(matches!(
            DatasetStore::create(&path, &ragged, &targets),
            Err(StoreError::RaggedFeatures { row: 2 })
        ));

        let mut non_finite = targets.clone();
        non_finite[1] = f64::NAN;
        assert!(matches!(
            DatasetStore::create(&path, &features, &non_finite),
            Err(StoreError::NonFiniteValue { row: 1 })
        ));
        Ok(())
    }

    #[test]
    fn unwritable_location_is_a_storage_error() {
        let (features, targets) = dataset();
        let result = DatasetStore::create("/nonexistent-dir/store.json", &features, &targets);
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[test]
    fn corrupted_document_is_detected() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"index":[0,0],"features":[[1.0],[2.0]],"targets":[1.0,2.0]}"#,
        )?;
        assert!(matches!(
            DatasetStore::open(&path),
            Err(StoreError::Corrupted { .. })
        ));

        std::fs::write(&path, "not json")?;
        assert!(matches!(
            DatasetStore::open(&path),
            Err(StoreError::Json { .. })
        ));
        Ok(())
    }

    #[test]
    fn remove_deletes_the_backing_file() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let (features, targets) = dataset();
        let store = DatasetStore::create(dir.path().join("store.json"), &features, &targets)?;
        let path = store.path().to_path_buf();

        assert!(path.exists());
        store.remove()?;
        assert!(!path.exists());
        Ok(())
    }
}
