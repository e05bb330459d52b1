use crate::join::{InvoiceEvent, JoinedRow};
use crate::motif::MotifClassifier;
use crate::schema::FeatureRow;
use crate::utils::days_between;
use log::{debug, warn};
use std::collections::HashSet;

/// Per-client invoice statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceSummary {
    /// Invoices carrying an invoice number.
    pub nb_facture: u32,
    /// Every invoice due on or after its creation day. True with no invoices.
    pub is_payed_on_time: bool,
    /// Sum of remaining amounts; missing amounts count as zero.
    pub total_restepayer: f64,
}

impl Default for InvoiceSummary {
    fn default() -> Self {
        Self {
            nb_facture: 0,
            is_payed_on_time: true,
            total_restepayer: 0.0,
        }
    }
}

impl InvoiceSummary {
    fn absorb(&mut self, invoice: &InvoiceEvent) {
        if invoice.invoice_number.is_some() {
            self.nb_facture += 1;
        }
        self.is_payed_on_time &= is_invoice_on_time(invoice);
        self.total_restepayer += invoice.remaining_due.unwrap_or(0.0);
    }

    pub fn is_paied(&self, paid_threshold: f64) -> bool {
        self.total_restepayer <= paid_threshold
    }
}

/// Due date not before creation date, compared in whole days.
/// An invoice missing either date is not on time.
pub fn is_invoice_on_time(invoice: &InvoiceEvent) -> bool {
    match (invoice.created_on, invoice.due_date) {
        (Some(created), Some(due)) => days_between(created, due) >= 0,
        _ => false,
    }
}

pub struct AggregationEngine<'a> {
    paid_threshold: f64,
    motif_classifier: &'a MotifClassifier,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(paid_threshold: f64, motif_classifier: &'a MotifClassifier) -> Self {
        Self {
            paid_threshold,
            motif_classifier,
        }
    }

    /// Groups joined rows by client, in order of first appearance. A client
    /// whose only row is the no-invoice placeholder gets an empty summary.
    pub fn summarize<'j>(&self, joined: &[JoinedRow<'j>]) -> Vec<(JoinedRow<'j>, InvoiceSummary)> {
        let mut groups: Vec<(JoinedRow<'j>, InvoiceSummary)> = Vec::new();

        for row in joined {
            let same_group = groups
                .last()
                .is_some_and(|(first, _)| first.client_index == row.client_index);
            if !same_group {
                groups.push((*row, InvoiceSummary::default()));
            }

            if let (Some(invoice), Some((_, summary))) = (row.invoice, groups.last_mut()) {
                summary.absorb(invoice);
            }
        }

        groups
    }

    /// Collapses the joined table to one feature row per client id.
    pub fn aggregate(&self, joined: &[JoinedRow<'_>]) -> Vec<FeatureRow> {
        let rows: Vec<FeatureRow> = self
            .summarize(joined)
            .into_iter()
            .map(|(row, summary)| {
                let client = row.client;
                FeatureRow {
                    client_id: client.client_id.clone(),
                    governorat_mapped: client.governorat_mapped,
                    type_abonnement: client.type_abonnement,
                    nb_facture: summary.nb_facture,
                    is_payed_on_time: summary.is_payed_on_time,
                    is_paied: summary.is_paied(self.paid_threshold),
                    daysrc: client.daysrc,
                    motif: self.motif_classifier.classify(client.motif.as_deref()),
                    resiliation: None,
                }
            })
            .collect();

        let grouped = rows.len();
        let collapsed = collapse_by_client(rows);
        if collapsed.len() < grouped {
            warn!(
                "{} duplicate client rows collapsed to their first occurrence",
                grouped - collapsed.len()
            );
        }

        debug!(
            "Aggregated {} joined rows into {} client rows",
            joined.len(),
            collapsed.len()
        );

        collapsed
    }
}

/// Keeps the first row for each client id, preserving order. Idempotent.
pub fn collapse_by_client(rows: Vec<FeatureRow>) -> Vec<FeatureRow> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(row.client_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::ExtractedClient;
    use crate::join::left_join;
    use chrono::NaiveDate;

    fn client(id: &str, motif: &str) -> ExtractedClient {
        ExtractedClient {
            client_id: id.to_string(),
            last_connection: None,
            desired_cancellation: None,
            contract_start: None,
            contract_end: None,
            governorat_mapped: 1,
            type_abonnement: Some(1),
            daysrc: Some(-3),
            motif: Some(motif.to_string()),
        }
    }

    fn invoice(client_id: &str, created: (i32, u32, u32), due: (i32, u32, u32), rest: f64) -> InvoiceEvent {
        let date = |(y, m, d): (i32, u32, u32)| {
            NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        InvoiceEvent {
            client_id: client_id.to_string(),
            invoice_number: Some(format!("F-{client_id}-{rest}")),
            due_date: Some(date(due)),
            created_on: Some(date(created)),
            remaining_due: Some(rest),
        }
    }

    #[test]
    fn test_client_without_invoices_gets_vacuous_summary() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let clients = vec![client("C2", "Autres")];
        let joined = left_join(&clients, &[]);

        let rows = engine.aggregate(&joined);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].nb_facture, 0);
        assert!(rows[0].is_payed_on_time);
        assert!(rows[0].is_paied);
        assert_eq!(rows[0].motif, 0);
    }

    #[test]
    fn test_sums_and_threshold() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let clients = vec![client("C1", "Prix trop élevé")];
        let invoices = vec![
            invoice("C1", (2023, 1, 1), (2023, 1, 15), 15.0),
            invoice("C1", (2023, 2, 1), (2023, 2, 1), 10.0),
        ];
        let joined = left_join(&clients, &invoices);

        let groups = engine.summarize(&joined);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.total_restepayer, 25.0);

        let rows = engine.aggregate(&joined);
        assert_eq!(rows[0].nb_facture, 2);
        assert!(rows[0].is_payed_on_time);
        assert!(!rows[0].is_paied);
        assert_eq!(rows[0].motif, 1);
    }

    #[test]
    fn test_threshold_is_inclusive_and_negative_amounts_offset() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let clients = vec![client("A", "Autres"), client("B", "Autres")];
        let invoices = vec![
            invoice("A", (2023, 1, 1), (2023, 1, 2), 20.0),
            invoice("B", (2023, 1, 1), (2023, 1, 2), 50.0),
            invoice("B", (2023, 1, 1), (2023, 1, 2), -35.0),
        ];
        let joined = left_join(&clients, &invoices);

        let rows = engine.aggregate(&joined);
        assert!(rows[0].is_paied);
        assert!(rows[1].is_paied);
    }

    #[test]
    fn test_single_late_invoice_breaks_on_time() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let clients = vec![client("A", "Autres")];
        let mut missing_date = invoice("A", (2023, 1, 1), (2023, 1, 2), 0.0);
        missing_date.due_date = None;
        let invoices = vec![
            invoice("A", (2023, 1, 1), (2023, 1, 2), 0.0),
            invoice("A", (2023, 3, 5), (2023, 3, 4), 0.0),
        ];

        let rows = engine.aggregate(&left_join(&clients, &invoices));
        assert!(!rows[0].is_payed_on_time);
        assert!(!is_invoice_on_time(&missing_date));
    }

    #[test]
    fn test_unnumbered_invoices_not_counted() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let clients = vec![client("A", "Autres")];
        let mut unnumbered = invoice("A", (2023, 1, 1), (2023, 1, 2), 30.0);
        unnumbered.invoice_number = None;
        let invoices = vec![invoice("A", (2023, 1, 1), (2023, 1, 2), 1.0), unnumbered];

        let rows = engine.aggregate(&left_join(&clients, &invoices));
        assert_eq!(rows[0].nb_facture, 1);
        assert!(!rows[0].is_paied);
    }

    #[test]
    fn test_duplicate_client_rows_collapse_to_first() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let mut second = client("A", "Déménagement");
        second.daysrc = Some(40);
        let clients = vec![client("A", "Autres"), second, client("B", "Autres")];
        let invoices = vec![invoice("A", (2023, 1, 1), (2023, 1, 2), 5.0)];

        let rows = engine.aggregate(&left_join(&clients, &invoices));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].client_id, "A");
        assert_eq!(rows[0].daysrc, Some(-3));
        assert_eq!(rows[0].nb_facture, 1);
        assert_eq!(rows[1].client_id, "B");
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let motifs = MotifClassifier::default();
        let engine = AggregationEngine::new(20.0, &motifs);
        let clients = vec![client("A", "Autres"), client("B", "x"), client("A", "y")];
        let invoices = vec![
            invoice("A", (2023, 1, 1), (2023, 1, 2), 5.0),
            invoice("B", (2023, 1, 1), (2022, 12, 2), 5.0),
        ];

        let once = engine.aggregate(&left_join(&clients, &invoices));
        let twice = collapse_by_client(once.clone());
        assert_eq!(once, twice);
    }
}
