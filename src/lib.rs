//! # Churn Feature Pipeline
//!
//! Turns a batch of client profiles and their invoices into one feature row
//! per client, labels each row with business churn rules, and attaches the
//! predictions of a pre-trained classifier back onto the client records.
//!
//! ## Stages
//!
//! - **Temporal features**: `daysrc` (desired cancellation minus last
//!   connection, in days) and `type_abonnement` (contract length in years).
//! - **Governorate encoding**: an explicit [`GovernorateEncoding`], fitted on
//!   the training batch and reused unchanged when scoring.
//! - **Join & aggregation**: left join of clients to invoices, then
//!   `nb_facture`, `is_payed_on_time` and `is_paied` per client.
//! - **Motif**: whitelisted cancellation reasons map to 0, everything else to 1.
//! - **Label**: `resiliation` is the OR of three named rules in [`labeler`].
//! - **Scoring**: scaler + classifier over the unlabeled table, predictions
//!   re-joined to clients by id.
//!
//! ## Example
//!
//! ```rust,ignore
//! use churn_feature_pipeline::*;
//!
//! let config = PipelineConfig::default();
//! let clients = read_client_file("clients.csv", &config)?;
//! let invoices = read_invoice_file("factures.csv", &config)?;
//!
//! let pipeline = ChurnPipeline::new(config)?;
//! if let BatchOutcome::Ready(training) = pipeline.build_training_table(&clients, &invoices)? {
//!     training.encoding.save_json("governorates.json")?;
//!     println!("{}", training.table.to_csv()?);
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod governorate;
pub mod inference;
pub mod ingestion;
pub mod join;
pub mod labeler;
pub mod motif;
pub mod report;
pub mod schema;
pub mod utils;

pub use aggregate::{collapse_by_client, AggregationEngine, InvoiceSummary};
pub use config::PipelineConfig;
pub use engine::FeatureEngine;
pub use error::{ChurnPipelineError, Result};
pub use features::{ExtractedClient, TemporalFeatureExtractor};
pub use governorate::GovernorateEncoding;
pub use inference::{
    attach_predictions, ChurnClassifier, InferenceAdapter, KNearestNeighbors, KeyedPrediction,
    ScoredBatch, ScoredClient, ScoringArtifacts, StandardScaler,
};
pub use ingestion::{read_client_batch, read_client_file, read_invoice_batch, read_invoice_file};
pub use labeler::{churn_label, matching_rules, ChurnRule};
pub use motif::MotifClassifier;
pub use report::ScoringSummary;
pub use schema::*;

use log::{debug, info};

/// Output of a training-context run: the labeled table and the governorate
/// encoding it was built with. Persist the encoding alongside the model.
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    pub table: FeatureTable,
    pub encoding: GovernorateEncoding,
}

pub struct ChurnPipeline {
    config: PipelineConfig,
}

impl ChurnPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fits the governorate encoding on this batch (first occurrence order)
    /// and returns the labeled feature table with it.
    pub fn build_training_table(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
    ) -> Result<BatchOutcome<TrainingBatch>> {
        if Self::is_empty_batch(clients, invoices) {
            return Ok(BatchOutcome::NoData);
        }

        let encoding = GovernorateEncoding::fit(clients);
        info!(
            "Building training table: {} clients, {} invoices, {} governorates",
            clients.len(),
            invoices.len(),
            encoding.len()
        );

        let table = FeatureEngine::new(&self.config).build_labeled(clients, invoices, &encoding)?;
        Ok(BatchOutcome::Ready(TrainingBatch { table, encoding }))
    }

    /// Builds the labeled feature table with a previously fitted encoding.
    pub fn build_labeled_table(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
        encoding: &GovernorateEncoding,
    ) -> Result<BatchOutcome<FeatureTable>> {
        if Self::is_empty_batch(clients, invoices) {
            return Ok(BatchOutcome::NoData);
        }

        let table = FeatureEngine::new(&self.config).build_labeled(clients, invoices, encoding)?;
        Ok(BatchOutcome::Ready(table))
    }

    /// Builds the classifier input (no label) with a previously fitted encoding.
    pub fn build_features(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
        encoding: &GovernorateEncoding,
    ) -> Result<BatchOutcome<FeatureTable>> {
        if Self::is_empty_batch(clients, invoices) {
            return Ok(BatchOutcome::NoData);
        }

        let table = FeatureEngine::new(&self.config).build(clients, invoices, encoding)?;
        Ok(BatchOutcome::Ready(table))
    }

    /// Builds features, predicts, and attaches each prediction to its client.
    pub fn score<C: ChurnClassifier + ?Sized>(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
        encoding: &GovernorateEncoding,
        scaler: &StandardScaler,
        classifier: &C,
    ) -> Result<BatchOutcome<ScoredBatch>> {
        let table = match self.build_features(clients, invoices, encoding)? {
            BatchOutcome::Ready(table) => table,
            BatchOutcome::NoData => return Ok(BatchOutcome::NoData),
        };

        let predictions = InferenceAdapter::new(scaler, classifier).predict(&table)?;
        let scored = attach_predictions(clients, &predictions);

        info!(
            "Scored {} of {} clients",
            scored.clients.len(),
            clients.len()
        );

        Ok(BatchOutcome::Ready(scored))
    }

    pub fn score_with_artifacts(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
        artifacts: &ScoringArtifacts,
    ) -> Result<BatchOutcome<ScoredBatch>> {
        self.score(
            clients,
            invoices,
            &artifacts.governorate_encoding,
            &artifacts.scaler,
            &artifacts.classifier,
        )
    }

    fn is_empty_batch(clients: &[ClientRecord], invoices: &[InvoiceRecord]) -> bool {
        let empty = clients.is_empty() || invoices.is_empty();
        if empty {
            debug!(
                "No data: {} clients, {} invoices",
                clients.len(),
                invoices.len()
            );
        }
        empty
    }
}

/// Labeled feature table with a batch-fitted encoding and default settings.
pub fn build_feature_table(
    clients: &[ClientRecord],
    invoices: &[InvoiceRecord],
) -> Result<BatchOutcome<TrainingBatch>> {
    ChurnPipeline::new(PipelineConfig::default())?.build_training_table(clients, invoices)
}
