pub use aggregate::{transform_output, CurvePoint, EmptyInputError, LearningCurve};
pub use evaluate::{
    ErrorPolicy, EvaluateError, EvaluateOptions, Evaluated, Evaluation, Failure, Prediction,
    PredictionError,
};
pub use hierarchy::{Hierarchy, HierarchyError};
pub use split::{
    ConfigError, HoldOut, IndexSplit, ParseHoldOutError, SplitFileError, SplitOptions, Subset,
};
pub use store::{DatasetStore, FeatureMatrix, RowId, StoreError};

pub mod aggregate;
pub mod evaluate;
pub mod hierarchy;
pub mod split;
pub mod store;

mod functions;
