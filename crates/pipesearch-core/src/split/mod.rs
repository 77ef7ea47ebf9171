//! Dataset split and sample strategies.
//!
//! Three interchangeable strategies partition or subsample tabular rows:
//! basic random, stratified-by-category, and temporal-threshold. Strategy
//! selection follows the task type plus a stratify flag. A split is
//! memoized on disk: its output directory name is a deterministic hash of
//! the strategy configuration and caller context, and an existing output
//! under that name is reused instead of recomputed.

mod basic;
mod rowlimit;
mod stratified;
mod temporal;

use std::path::Path;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::dataset::{DatasetLayout, TableData};
use crate::error::{CoreError, CoreResult};
use crate::types::TaskType;

pub use rowlimit::RowLimits;

/// Configuration shared by every strategy. Immutable per split operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    pub row_limits: RowLimits,
    /// Index of the target column.
    pub target_col: usize,
    /// Index of the grouping column used for stratification, when one is
    /// designated; otherwise the target column stratifies.
    pub grouping_col: Option<usize>,
    /// Fraction of rows assigned to the train partition.
    pub train_ratio: f64,
    pub stratify: bool,
    /// Fixed RNG seed for reproducible splits; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl SplitConfig {
    pub fn new(target_col: usize, train_ratio: f64) -> Self {
        Self {
            row_limits: RowLimits::default(),
            target_col,
            grouping_col: None,
            train_ratio,
            stratify: false,
            seed: None,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// The three partitioning strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Random shuffle assignment.
    Basic(SplitConfig),
    /// Proportional per-category assignment.
    Stratified(SplitConfig),
    /// Single time-threshold assignment.
    Temporal {
        config: SplitConfig,
        /// Index of the column parsed as a numeric timestamp.
        time_col: usize,
    },
}

impl SplitStrategy {
    /// Select the strategy for a task.
    ///
    /// Forecasting tasks split on time and require a designated time
    /// column; classification tasks and any task with the stratify flag
    /// set stratify; everything else splits randomly.
    pub fn for_task(
        task: TaskType,
        config: SplitConfig,
        time_col: Option<usize>,
    ) -> CoreResult<Self> {
        match task {
            TaskType::Forecasting => {
                let time_col = time_col.ok_or_else(|| {
                    CoreError::Split("forecasting split requires a time column".to_string())
                })?;
                Ok(SplitStrategy::Temporal { config, time_col })
            }
            TaskType::Classification => Ok(SplitStrategy::Stratified(config)),
            _ if config.stratify => Ok(SplitStrategy::Stratified(config)),
            _ => Ok(SplitStrategy::Basic(config)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SplitStrategy::Basic(_) => "basic",
            SplitStrategy::Stratified(_) => "stratified",
            SplitStrategy::Temporal { .. } => "temporal",
        }
    }

    fn config(&self) -> &SplitConfig {
        match self {
            SplitStrategy::Basic(c) | SplitStrategy::Stratified(c) => c,
            SplitStrategy::Temporal { config, .. } => config,
        }
    }

    /// Partition a table into (train, test).
    pub fn split(&self, table: &TableData) -> CoreResult<(TableData, TableData)> {
        let (train, test) = match self {
            SplitStrategy::Basic(config) => basic::split(table, config, &mut config.rng())?,
            SplitStrategy::Stratified(config) => {
                stratified::split(table, config, &mut config.rng())?
            }
            SplitStrategy::Temporal { config, time_col } => {
                temporal::split(table, *time_col, config.train_ratio)?
            }
        };
        debug!(
            strategy = self.name(),
            train = train.len(),
            test = test.len(),
            "split computed"
        );
        Ok((table.with_rows(train), table.with_rows(test)))
    }

    /// Subsample a table to roughly the row-limit-derived count.
    pub fn sample(&self, table: &TableData) -> CoreResult<TableData> {
        let config = self.config();
        let limit = config.row_limits.sample_count(table.len());
        let rows = match self {
            SplitStrategy::Basic(config) => basic::sample(table, limit, &mut config.rng()),
            SplitStrategy::Stratified(config) => {
                let category_col = config.grouping_col.unwrap_or(config.target_col);
                stratified::sample(table, category_col, limit, &mut config.rng())?
            }
            SplitStrategy::Temporal { time_col, .. } => temporal::sample(table, *time_col, limit)?,
        };
        Ok(table.with_rows(rows))
    }

    /// Deterministic hash over this strategy's configuration plus
    /// caller-supplied context, used as the split-output directory name.
    pub fn cache_key(&self, context: &str) -> CoreResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.name().as_bytes());
        hasher.update(serde_json::to_vec(self.config())?);
        if let SplitStrategy::Temporal { time_col, .. } = self {
            hasher.update(time_col.to_le_bytes());
        }
        hasher.update(context.as_bytes());
        let digest = hasher.finalize();

        let mut key = String::with_capacity(16);
        for byte in &digest[..8] {
            key.push_str(&format!("{:02x}", byte));
        }
        Ok(key)
    }
}

/// The two partition layouts produced by a split.
#[derive(Debug, Clone)]
pub struct SplitOutput {
    pub train: DatasetLayout,
    pub test: DatasetLayout,
    /// `true` when an existing split output was reused.
    pub reused: bool,
}

/// Split a table and write both partitions under a content-hashed
/// directory, skipping the work entirely when that directory already
/// holds both layouts.
pub fn run_split(
    strategy: &SplitStrategy,
    table: &TableData,
    base_dir: &Path,
    context: &str,
) -> CoreResult<SplitOutput> {
    let key = strategy.cache_key(context)?;
    let dir = base_dir.join(format!("split-{}", key));
    let train = DatasetLayout::new(dir.join("train"));
    let test = DatasetLayout::new(dir.join("test"));

    if train.exists() && test.exists() {
        info!(dir = %dir.display(), "reusing existing split output");
        return Ok(SplitOutput {
            train,
            test,
            reused: true,
        });
    }

    let (train_table, test_table) = strategy.split(table)?;
    train.write(&train_table)?;
    test.write(&test_table)?;
    info!(
        dir = %dir.display(),
        train = train_table.len(),
        test = test_table.len(),
        "split written"
    );

    Ok(SplitOutput {
        train,
        test,
        reused: false,
    })
}
