use crate::store::RowId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom as _;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldOut {
    Sibling,

    // Every row outside the training half.
    Remainder,
}

impl Default for HoldOut {
    fn default() -> Self {
        Self::Sibling
    }
}

impl FromStr for HoldOut {
    type Err = ParseHoldOutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sibling" => Ok(Self::Sibling),
            "remainder" => Ok(Self::Remainder),
            _ => Err(ParseHoldOutError(s.to_owned())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown hold-out rule {0:?} (expected \"sibling\" or \"remainder\")")]
pub struct ParseHoldOutError(String);

#[derive(Debug, Clone)]
pub struct SplitOptions {
    min_split: usize,
    max_split: usize,
    seed: u64,
    hold_out: HoldOut,
}

impl SplitOptions {
    pub fn new(min_split: usize, max_split: usize) -> Self {
        Self {
            min_split,
            max_split,
            seed: 0,
            hold_out: HoldOut::default(),
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn hold_out(mut self, hold_out: HoldOut) -> Self {
        self.hold_out = hold_out;
        self
    }

    pub fn min_split(&self) -> usize {
        self.min_split
    }

    pub fn max_split(&self) -> usize {
        self.max_split
    }

    fn validate(&self, rows: usize) -> Result<(), ConfigError> {
        if self.min_split == 0 {
            return Err(ConfigError::ZeroMinSplit);
        }
        if self.min_split > self.max_split {
            return Err(ConfigError::InvertedBounds {
                min_split: self.min_split,
                max_split: self.max_split,
            });
        }
        if self.max_split > rows {
            return Err(ConfigError::ExceedsRows {
                max_split: self.max_split,
                rows,
            });
        }
        if self.min_split > rows / 2 {
            return Err(self.no_subsets(rows));
        }
        Ok(())
    }

    fn no_subsets(&self, rows: usize) -> ConfigError {
        ConfigError::NoSubsets {
            min_split: self.min_split,
            max_split: self.max_split,
            rows,
        }
    }

    /// Shuffles `index` and halves it recursively; every half sized within
    /// `[min_split, max_split]` becomes one training set, largest first.
    pub fn split_index(&self, index: &[RowId]) -> Result<IndexSplit, ConfigError> {
        self.validate(index.len())?;

        let mut shuffled = index.to_vec();
        shuffled.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let mut subsets = Vec::new();
        let mut level = 1;
        let mut groups = vec![0..shuffled.len()];
        while !groups.is_empty() {
            let mut next = Vec::new();
            for group in groups {
                let middle = group.start + group.len() / 2;
                let left = group.start..middle;
                let right = middle..group.end;
                for (train, sibling) in [(left.clone(), right.clone()), (right, left)] {
                    if train.len() < self.min_split {
                        continue;
                    }
                    if train.len() <= self.max_split {
                        subsets.push(Subset {
                            level,
                            train: shuffled[train.clone()].to_vec(),
                            test: self.test_rows(&shuffled, &train, sibling),
                        });
                    }
                    if train.len() / 2 >= self.min_split {
                        next.push(train);
                    }
                }
            }
            groups = next;
            level += 1;
        }
        if subsets.is_empty() {
            return Err(self.no_subsets(index.len()));
        }
        tracing::debug!(
            "Split {} rows into {} subsets over {} levels",
            index.len(),
            subsets.len(),
            level - 1
        );

        Ok(IndexSplit {
            min_split: self.min_split,
            max_split: self.max_split,
            seed: self.seed,
            hold_out: self.hold_out,
            rows: index.len(),
            subsets,
        })
    }

    fn test_rows(&self, all: &[RowId], train: &Range<usize>, sibling: Range<usize>) -> Vec<RowId> {
        match self.hold_out {
            HoldOut::Sibling => all[sibling].to_vec(),
            HoldOut::Remainder => all[..train.start]
                .iter()
                .chain(&all[train.end..])
                .copied()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subset {
    pub level: usize,
    pub train: Vec<RowId>,
    pub test: Vec<RowId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSplit {
    min_split: usize,
    max_split: usize,
    seed: u64,
    hold_out: HoldOut,
    rows: usize,
    subsets: Vec<Subset>,
}

impl IndexSplit {
    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    pub fn len(&self) -> usize {
        self.subsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsets.is_empty()
    }

    pub fn matches(&self, options: &SplitOptions, rows: usize) -> bool {
        self.min_split == options.min_split
            && self.max_split == options.max_split
            && self.seed == options.seed
            && self.hold_out == options.hold_out
            && self.rows == rows
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SplitFileError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| SplitFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(|source| SplitFileError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|source| SplitFileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SplitFileError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SplitFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| SplitFileError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("min_split must be greater than zero")]
    ZeroMinSplit,

    #[error("min_split ({min_split}) must not exceed max_split ({max_split})")]
    InvertedBounds { min_split: usize, max_split: usize },

    #[error("max_split ({max_split}) exceeds the dataset size ({rows})")]
    ExceedsRows { max_split: usize, rows: usize },

    #[error("halving {rows} rows yields no training set of {min_split} to {max_split} rows")]
    NoSubsets {
        min_split: usize,
        max_split: usize,
        rows: usize,
    },
}

#[derive(Debug, Error)]
pub enum SplitFileError {
    #[error("I/O error on split file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode or decode split file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
