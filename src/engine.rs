use crate::aggregate::AggregationEngine;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::features::TemporalFeatureExtractor;
use crate::governorate::GovernorateEncoding;
use crate::join::{left_join, parse_invoices};
use crate::labeler::label_rows;
use crate::motif::MotifClassifier;
use crate::schema::{ClientRecord, FeatureTable, InvoiceRecord};
use log::debug;

/// Runs extraction, join, aggregation and motif classification over one batch.
pub struct FeatureEngine<'a> {
    config: &'a PipelineConfig,
    motif_classifier: MotifClassifier,
}

impl<'a> FeatureEngine<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            motif_classifier: MotifClassifier::new(config.motif_whitelist.iter().cloned()),
        }
    }

    /// Builds the unlabeled feature table. Rows follow the client input order,
    /// one per distinct client id.
    pub fn build(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
        encoding: &GovernorateEncoding,
    ) -> Result<FeatureTable> {
        let extracted = TemporalFeatureExtractor::new(self.config).extract_batch(clients, encoding)?;
        let events = parse_invoices(invoices, self.config)?;

        let joined = left_join(&extracted, &events);
        let rows = AggregationEngine::new(self.config.paid_threshold, &self.motif_classifier)
            .aggregate(&joined);

        debug!(
            "Built {} feature rows from {} clients and {} invoices",
            rows.len(),
            clients.len(),
            invoices.len()
        );

        Ok(FeatureTable::new(rows))
    }

    /// Builds the feature table and fills in `resiliation`.
    pub fn build_labeled(
        &self,
        clients: &[ClientRecord],
        invoices: &[InvoiceRecord],
        encoding: &GovernorateEncoding,
    ) -> Result<FeatureTable> {
        let mut table = self.build(clients, invoices, encoding)?;
        label_rows(&mut table.rows);
        Ok(table)
    }
}
