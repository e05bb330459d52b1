use crate::inference::ScoredBatch;
use crate::utils::non_empty;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dashboard figures for a scored batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub total_clients: usize,
    pub unscored_clients: usize,
    /// `(prediction, count)`, most frequent first, ties by prediction.
    pub prediction_counts: Vec<(u8, usize)>,
    /// Mean prediction per governorate, keyed and ordered by name.
    /// Clients without a governorate are not counted here.
    pub churn_rate_by_governorate: BTreeMap<String, f64>,
}

impl ScoringSummary {
    pub fn from_batch(batch: &ScoredBatch) -> Self {
        let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
        let mut by_governorate: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for scored in &batch.clients {
            *counts.entry(scored.prediction).or_default() += 1;

            if let Some(name) = non_empty(scored.record.governorate.as_deref()) {
                let entry = by_governorate.entry(name.to_string()).or_default();
                entry.0 += usize::from(scored.prediction);
                entry.1 += 1;
            }
        }

        let mut prediction_counts: Vec<(u8, usize)> = counts.into_iter().collect();
        prediction_counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let churn_rate_by_governorate = by_governorate
            .into_iter()
            .map(|(name, (churned, total))| (name, churned as f64 / total as f64))
            .collect();

        Self {
            total_clients: batch.clients.len(),
            unscored_clients: batch.unscored.len(),
            prediction_counts,
            churn_rate_by_governorate,
        }
    }

    /// Share of scored clients predicted to churn, 0 for an empty batch.
    pub fn churn_rate(&self) -> f64 {
        if self.total_clients == 0 {
            return 0.0;
        }
        let churned = self
            .prediction_counts
            .iter()
            .find(|(p, _)| *p == 1)
            .map(|(_, c)| *c)
            .unwrap_or(0);
        churned as f64 / self.total_clients as f64
    }
}
