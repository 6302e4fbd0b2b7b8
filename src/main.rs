use anyhow::ensure;
use hierarchy_cv::{
    transform_output, DatasetStore, ErrorPolicy, EvaluateOptions, Hierarchy, HoldOut, Prediction,
    SplitOptions,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Dataset {
    features: Vec<Vec<f64>>,
    targets: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct Output {
    mean_sizes: Vec<f64>,
    mean_errors: Vec<f64>,
    stddev_errors: Vec<f64>,
    raw: Vec<Prediction>,
    failures: usize,
}

#[derive(Debug, StructOpt)]
#[structopt(about = "Learning curve of a mean-value baseline over hierarchical subsets")]
struct Opt {
    #[structopt(long, default_value = "hierarchy-store.json")]
    store: PathBuf,

    #[structopt(long)]
    split_file: Option<PathBuf>,

    #[structopt(long)]
    min_split: usize,

    #[structopt(long)]
    max_split: Option<usize>,

    #[structopt(long, default_value = "0")]
    seed: u64,

    #[structopt(long, default_value = "sibling")]
    hold_out: HoldOut,

    #[structopt(long)]
    parallel: bool,

    #[structopt(long)]
    best_effort: bool,

    #[structopt(long)]
    keep_store: bool,
}

fn baseline(
    _train_features: &[Vec<f64>],
    train_targets: &[f64],
    _test_features: &[Vec<f64>],
    test_targets: &[f64],
) -> anyhow::Result<Prediction> {
    ensure!(!train_targets.is_empty(), "empty training set");
    ensure!(!test_targets.is_empty(), "empty test set");

    let mean = train_targets.iter().sum::<f64>() / train_targets.len() as f64;
    let mse = test_targets
        .iter()
        .map(|y| (y - mean).powi(2))
        .sum::<f64>()
        / test_targets.len() as f64;
    Ok(Prediction::new(mse.sqrt(), train_targets.len()))
}

fn run(opt: &Opt, dataset: &Dataset) -> anyhow::Result<Output> {
    let store = DatasetStore::create(&opt.store, &dataset.features, &dataset.targets)?;
    let mut hv = Hierarchy::new(store).evaluate_options(
        EvaluateOptions::new()
            .parallel(opt.parallel)
            .policy(if opt.best_effort {
                ErrorPolicy::BestEffort
            } else {
                ErrorPolicy::FailFast
            }),
    );
    if let Some(path) = &opt.split_file {
        hv = hv.split_file(path);
    }

    let output = learning_curve(&hv, opt, dataset.targets.len());
    if opt.keep_store {
        return output;
    }
    let removed = hv.into_store().remove();
    let output = output?;
    removed?;
    Ok(output)
}

fn learning_curve(hv: &Hierarchy, opt: &Opt, rows: usize) -> anyhow::Result<Output> {
    let options = SplitOptions::new(opt.min_split, opt.max_split.unwrap_or(rows))
        .seed(opt.seed)
        .hold_out(opt.hold_out);

    let split = hv.split_index(&options)?;
    let evaluation = hv.split_predict(&split, baseline)?;
    let raw = evaluation.predictions();
    let curve = transform_output(&raw)?;

    Ok(Output {
        mean_sizes: curve.mean_sizes,
        mean_errors: curve.mean_errors,
        stddev_errors: curve.stddev_errors,
        raw,
        failures: evaluation.failures().len(),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opt = Opt::from_args();
    let dataset: Dataset = serde_json::from_reader(std::io::stdin().lock())?;
    ensure!(!dataset.targets.is_empty(), "too few rows");

    let output = run(&opt, &dataset)?;
    serde_json::to_writer_pretty(std::io::stdout().lock(), &output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn dataset(rows: usize) -> Dataset {
        let features = (0..rows)
            .map(|i| vec![(i % 7) as f64, (i % 3) as f64])
            .collect::<Vec<_>>();
        let targets = features.iter().map(|x| x[0] + 2.0 * x[1]).collect();
        Dataset { features, targets }
    }

    fn opt(store: &Path, args: &[&str]) -> Opt {
        let store = store.to_str().expect("utf-8 path");
        let argv = ["hierarchy-cv", "--store", store]
            .iter()
            .chain(args.iter())
            .copied()
            .collect::<Vec<_>>();
        Opt::from_iter(argv)
    }

    #[test]
    fn baseline_works() -> Result<(), anyhow::Error> {
        let features = vec![vec![0.0]; 3];
        let prediction = baseline(&features, &[1.0, 2.0, 3.0], &features[..2], &[2.0, 4.0])?;
        assert_eq!(prediction.size, 3);
        assert_eq!(prediction.result, 2.0f64.sqrt());
        Ok(())
    }

    #[test]
    fn baseline_rejects_empty_sets() {
        let features = vec![vec![0.0]; 2];
        assert!(baseline(&[], &[], &features, &[1.0, 2.0]).is_err());
        assert!(baseline(&features, &[1.0, 2.0], &[], &[]).is_err());
    }

    #[test]
    fn store_is_removed_after_success() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let store = dir.path().join("store.json");
        let opt = opt(&store, &["--min-split", "10", "--hold-out", "remainder"]);

        let output = run(&opt, &dataset(100))?;
        assert_eq!(output.mean_sizes, vec![12.0, 13.0, 25.0, 50.0]);
        assert_eq!(output.raw.len(), 2 + 4 + 8);
        assert_eq!(output.failures, 0);
        assert!(!store.exists());
        Ok(())
    }

    #[test]
    fn store_is_removed_after_failure() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let store = dir.path().join("store.json");
        // Halving 100 rows gives 50, 25 and 12/13; nothing lands in [20, 22].
        let opt = opt(&store, &["--min-split", "20", "--max-split", "22"]);

        assert!(run(&opt, &dataset(100)).is_err());
        assert!(!store.exists());
        Ok(())
    }

    #[test]
    fn keep_store_leaves_the_file() -> Result<(), anyhow::Error> {
        let dir = tempfile::tempdir()?;
        let store = dir.path().join("store.json");
        let opt = opt(&store, &["--min-split", "10", "--keep-store"]);

        run(&opt, &dataset(100))?;
        assert!(store.exists());
        Ok(())
    }

    #[test]
    fn unknown_hold_out_is_rejected() {
        let argv = ["hierarchy-cv", "--min-split", "10", "--hold-out", "siblings"];
        assert!(Opt::from_iter_safe(argv).is_err());

        let opt = Opt::from_iter(["hierarchy-cv", "--min-split", "10"]);
        assert_eq!(opt.hold_out, HoldOut::Sibling);
    }
}
