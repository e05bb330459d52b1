use crate::config::PipelineConfig;
use crate::error::{ChurnPipelineError, Result};
use crate::features::{parse_date_cell, ExtractedClient};
use crate::schema::InvoiceRecord;
use crate::utils::non_empty;
use chrono::NaiveDateTime;
use log::debug;
use std::collections::{HashMap, HashSet};

/// An invoice with its dates parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceEvent {
    pub client_id: String,
    pub invoice_number: Option<String>,
    pub due_date: Option<NaiveDateTime>,
    pub created_on: Option<NaiveDateTime>,
    pub remaining_due: Option<f64>,
}

/// One row of the client ⟕ invoice join. `invoice` is `None` for a client
/// without billing history.
#[derive(Debug, Clone, Copy)]
pub struct JoinedRow<'a> {
    /// Position of the client in the extracted batch.
    pub client_index: usize,
    pub client: &'a ExtractedClient,
    pub invoice: Option<&'a InvoiceEvent>,
}

pub fn parse_invoices(
    invoices: &[InvoiceRecord],
    config: &PipelineConfig,
) -> Result<Vec<InvoiceEvent>> {
    let columns = &config.invoice_columns;
    let formats = &config.extra_date_formats;

    invoices
        .iter()
        .map(|invoice| {
            let client_id = invoice.client_id.trim();
            if client_id.is_empty() {
                return Err(ChurnPipelineError::Processing(format!(
                    "invoice {} has an empty '{}'",
                    invoice.invoice_number.as_deref().unwrap_or("<unnumbered>"),
                    columns.client_id
                )));
            }

            Ok(InvoiceEvent {
                client_id: client_id.to_string(),
                invoice_number: non_empty(invoice.invoice_number.as_deref()).map(String::from),
                due_date: parse_date_cell(
                    client_id,
                    &columns.due_date,
                    invoice.due_date.as_deref(),
                    formats,
                )?,
                created_on: parse_date_cell(
                    client_id,
                    &columns.created_on,
                    invoice.created_on.as_deref(),
                    formats,
                )?,
                remaining_due: invoice.remaining_due.filter(|v| !v.is_nan()),
            })
        })
        .collect()
}

/// Left outer join of clients to invoices on client id.
///
/// Invoices are indexed by client id first, so the join is linear in the
/// size of both inputs. Output keeps client order, and each client's invoices
/// keep their input order. Invoices for unknown clients are dropped.
pub fn left_join<'a>(
    clients: &'a [ExtractedClient],
    invoices: &'a [InvoiceEvent],
) -> Vec<JoinedRow<'a>> {
    let mut index: HashMap<&str, Vec<&InvoiceEvent>> = HashMap::new();
    for invoice in invoices {
        index
            .entry(invoice.client_id.as_str())
            .or_default()
            .push(invoice);
    }

    let mut rows = Vec::with_capacity(clients.len().max(invoices.len()));
    let mut matched_invoices = 0usize;

    for (client_index, client) in clients.iter().enumerate() {
        match index.get(client.client_id.as_str()) {
            Some(matches) => {
                matched_invoices += matches.len();
                rows.extend(matches.iter().map(|invoice| JoinedRow {
                    client_index,
                    client,
                    invoice: Some(*invoice),
                }));
            }
            None => rows.push(JoinedRow {
                client_index,
                client,
                invoice: None,
            }),
        }
    }

    let known: HashSet<&str> = clients.iter().map(|c| c.client_id.as_str()).collect();
    let orphaned = invoices
        .iter()
        .filter(|invoice| !known.contains(invoice.client_id.as_str()))
        .count();
    if orphaned > 0 {
        debug!("{} invoices reference no client in this batch and were excluded", orphaned);
    }

    debug!(
        "Joined {} clients with {} invoices into {} rows",
        clients.len(),
        matched_invoices,
        rows.len()
    );

    rows
}
