//! Batch orchestration over many work items.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::PipelineError;
use crate::discover::WorkItem;
use crate::pipeline::{PairOutcome, PipelineContext, run_item};
use crate::progress::ProgressCallback;

/// Outcome of every work item in a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// `(label, outcome)` per work item.
    pub outcomes: Vec<(String, PairOutcome)>,
}

impl BatchSummary {
    /// Number of items per [`PairOutcome::kind`].
    #[must_use]
    pub fn counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for (_, outcome) in &self.outcomes {
            *counts.entry(outcome.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Number of items that wrote outputs.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Completed { .. }))
    }

    /// Number of items skipped for missing or unusable inputs.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Skipped { .. }))
    }

    /// Number of items that failed unexpectedly.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PairOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&PairOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts = self.counts();
        if counts.is_empty() {
            return f.write_str("no work items");
        }
        let parts: Vec<_> = counts
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Runs every work item in order, writing outputs under `output_root`.
///
/// A failing item is recorded in the summary and the batch moves on.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] only if `output_root` cannot be created.
pub async fn run_batch(
    items: &[WorkItem],
    output_root: &Path,
    ctx: &PipelineContext<'_>,
    progress: Arc<dyn ProgressCallback>,
) -> Result<BatchSummary, PipelineError> {
    std::fs::create_dir_all(output_root)?;
    warn_duplicate_labels(items);

    log::info!(
        "Running {} work items into {}",
        items.len(),
        output_root.display()
    );
    progress.set_total(items.len() as u64);

    let mut summary = BatchSummary::default();
    for item in items {
        progress.set_message(item.label.clone());
        let outcome = run_item(item, output_root, ctx).await;
        summary.outcomes.push((item.label.clone(), outcome));
        progress.inc(1);
    }

    progress.finish(format!("Batch done: {summary}"));
    log::info!("Batch done: {summary}");

    Ok(summary)
}

fn warn_duplicate_labels(items: &[WorkItem]) {
    let mut seen = BTreeSet::new();
    for item in items {
        if !seen.insert(item.label.as_str()) {
            log::warn!(
                "Work item label {} appears more than once; later outputs replace earlier ones",
                item.label
            );
        }
    }
}
