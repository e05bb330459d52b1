use crate::config::{ClientColumns, InvoiceColumns, PipelineConfig};
use crate::error::{ChurnPipelineError, Result};
use crate::schema::{ClientRecord, InvoiceRecord};
use crate::utils::non_empty;
use csv::StringRecord;
use log::info;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub const CLIENT_BATCH: &str = "client";
pub const INVOICE_BATCH: &str = "invoice";

/// Column name → position, built from a CSV header.
struct HeaderIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let name = if idx == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name
                };
                name.trim().to_string()
            })
            .collect();

        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }

        Self { names, positions }
    }

    fn require(&self, batch: &str, column: &str) -> Result<usize> {
        self.positions
            .get(column)
            .copied()
            .ok_or_else(|| ChurnPipelineError::MissingColumn {
                batch: batch.to_string(),
                column: column.to_string(),
            })
    }
}

struct ClientLayout {
    client_id: usize,
    last_connection: usize,
    desired_cancellation: usize,
    contract_start: usize,
    contract_end: usize,
    governorate: usize,
    motif: usize,
}

impl ClientLayout {
    fn resolve(index: &HeaderIndex, columns: &ClientColumns) -> Result<Self> {
        Ok(Self {
            client_id: index.require(CLIENT_BATCH, &columns.client_id)?,
            last_connection: index.require(CLIENT_BATCH, &columns.last_connection)?,
            desired_cancellation: index.require(CLIENT_BATCH, &columns.desired_cancellation)?,
            contract_start: index.require(CLIENT_BATCH, &columns.contract_start)?,
            contract_end: index.require(CLIENT_BATCH, &columns.contract_end)?,
            governorate: index.require(CLIENT_BATCH, &columns.governorate)?,
            motif: index.require(CLIENT_BATCH, &columns.motif)?,
        })
    }

    fn positions(&self) -> [usize; 7] {
        [
            self.client_id,
            self.last_connection,
            self.desired_cancellation,
            self.contract_start,
            self.contract_end,
            self.governorate,
            self.motif,
        ]
    }
}

struct InvoiceLayout {
    client_id: usize,
    invoice_number: usize,
    due_date: usize,
    created_on: usize,
    remaining_due: usize,
}

impl InvoiceLayout {
    fn resolve(index: &HeaderIndex, columns: &InvoiceColumns) -> Result<Self> {
        Ok(Self {
            client_id: index.require(INVOICE_BATCH, &columns.client_id)?,
            invoice_number: index.require(INVOICE_BATCH, &columns.invoice_number)?,
            due_date: index.require(INVOICE_BATCH, &columns.due_date)?,
            created_on: index.require(INVOICE_BATCH, &columns.created_on)?,
            remaining_due: index.require(INVOICE_BATCH, &columns.remaining_due)?,
        })
    }
}

fn cell(record: &StringRecord, position: usize) -> Option<String> {
    non_empty(record.get(position)).map(String::from)
}

fn required_cell(
    record: &StringRecord,
    position: usize,
    batch: &str,
    column: &str,
    line: usize,
) -> Result<String> {
    cell(record, position).ok_or_else(|| {
        ChurnPipelineError::Processing(format!(
            "{} batch row {}: missing value for required column '{}'",
            batch, line, column
        ))
    })
}

fn parse_amount(raw: &str, column: &str, line: usize) -> Result<f64> {
    raw.parse::<f64>()
        .or_else(|_| raw.replace(',', ".").parse::<f64>())
        .map_err(|_| {
            ChurnPipelineError::Processing(format!(
                "{} batch row {}: '{}' in column '{}' is not a number",
                INVOICE_BATCH, line, raw, column
            ))
        })
}

/// Reads a client extract. The header is validated before any row is read.
pub fn read_client_batch<R: Read>(reader: R, config: &PipelineConfig) -> Result<Vec<ClientRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let index = HeaderIndex::new(rdr.headers()?);
    let columns = &config.client_columns;
    let layout = ClientLayout::resolve(&index, columns)?;
    let required = layout.positions();

    let mut clients = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let line = row + 1;

        let other_fields = index
            .names
            .iter()
            .enumerate()
            .filter(|(idx, _)| !required.contains(idx))
            .map(|(idx, name)| (name.clone(), record.get(idx).unwrap_or_default().to_string()))
            .collect();

        clients.push(ClientRecord {
            client_id: required_cell(&record, layout.client_id, CLIENT_BATCH, &columns.client_id, line)?,
            last_connection: cell(&record, layout.last_connection),
            desired_cancellation: cell(&record, layout.desired_cancellation),
            contract_start: cell(&record, layout.contract_start),
            contract_end: cell(&record, layout.contract_end),
            governorate: cell(&record, layout.governorate),
            motif: record
                .get(layout.motif)
                .filter(|m| !m.trim().is_empty())
                .map(String::from),
            other_fields,
        });
    }

    info!("Read {} client records", clients.len());
    Ok(clients)
}

/// Reads an invoice extract. The header is validated before any row is read.
pub fn read_invoice_batch<R: Read>(
    reader: R,
    config: &PipelineConfig,
) -> Result<Vec<InvoiceRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let index = HeaderIndex::new(rdr.headers()?);
    let columns = &config.invoice_columns;
    let layout = InvoiceLayout::resolve(&index, columns)?;

    let mut invoices = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        let line = row + 1;

        let remaining_due = match cell(&record, layout.remaining_due) {
            Some(raw) => Some(parse_amount(&raw, &columns.remaining_due, line)?),
            None => None,
        };

        invoices.push(InvoiceRecord {
            client_id: required_cell(
                &record,
                layout.client_id,
                INVOICE_BATCH,
                &columns.client_id,
                line,
            )?,
            invoice_number: cell(&record, layout.invoice_number),
            due_date: cell(&record, layout.due_date),
            created_on: cell(&record, layout.created_on),
            remaining_due,
        });
    }

    info!("Read {} invoice records", invoices.len());
    Ok(invoices)
}

pub fn read_client_file<P: AsRef<Path>>(path: P, config: &PipelineConfig) -> Result<Vec<ClientRecord>> {
    read_client_batch(File::open(path)?, config)
}

pub fn read_invoice_file<P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
) -> Result<Vec<InvoiceRecord>> {
    read_invoice_batch(File::open(path)?, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENTS: &str = "\u{feff}new_codeclient,gouvernorat,delegation,New_DateDerniereConnexion,new_dateresiliationsouhaite,New_Datedebutducontrat,New_DateFinducontrat,Motif resilliation\n\
C1,Tunis,Bab Bhar,2023-05-10,2023-05-07,2021-01-01,2023-01-01,Autres\n\
C2,,Menzah,2023-05-10,,2021-01-01,2023-01-01,\n";

    const INVOICES: &str = "unique_codesclient,new_numerofacture,Echeance,CreatedOn,New_restepayer\n\
C1,F1,2023-01-15,2023-01-01,15\n\
C1,F2,2023-02-15,2023-02-01,\"10,5\"\n\
C2,,2023-02-15,2023-02-01,\n";

    #[test]
    fn test_reads_clients_with_passthrough_columns() {
        let config = PipelineConfig::default();
        let clients = read_client_batch(CLIENTS.as_bytes(), &config).unwrap();

        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].client_id, "C1");
        assert_eq!(clients[0].governorate.as_deref(), Some("Tunis"));
        assert_eq!(clients[0].motif.as_deref(), Some("Autres"));
        assert_eq!(
            clients[0].other_fields,
            vec![("delegation".to_string(), "Bab Bhar".to_string())]
        );
        assert_eq!(clients[1].governorate, None);
        assert_eq!(clients[1].desired_cancellation, None);
        assert_eq!(clients[1].motif, None);
    }

    #[test]
    fn test_reads_invoices() {
        let config = PipelineConfig::default();
        let invoices = read_invoice_batch(INVOICES.as_bytes(), &config).unwrap();

        assert_eq!(invoices.len(), 3);
        assert_eq!(invoices[0].remaining_due, Some(15.0));
        assert_eq!(invoices[1].remaining_due, Some(10.5));
        assert_eq!(invoices[2].invoice_number, None);
        assert_eq!(invoices[2].remaining_due, None);
    }

    #[test]
    fn test_missing_column_is_reported_before_rows() {
        let config = PipelineConfig::default();
        let csv = "unique_codesclient,new_numerofacture,Echeance,New_restepayer\nC1,F1,not-even-read,1\n";

        let err = read_invoice_batch(csv.as_bytes(), &config).unwrap_err();
        match err {
            ChurnPipelineError::MissingColumn { batch, column } => {
                assert_eq!(batch, "invoice");
                assert_eq!(column, "CreatedOn");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_blank_client_id_is_processing_error() {
        let config = PipelineConfig::default();
        let csv = "new_codeclient,gouvernorat,New_DateDerniereConnexion,new_dateresiliationsouhaite,New_Datedebutducontrat,New_DateFinducontrat,Motif resilliation\n\
 ,Tunis,2023-05-10,2023-05-07,2021-01-01,2023-01-01,Autres\n";

        let err = read_client_batch(csv.as_bytes(), &config).unwrap_err();
        assert!(matches!(err, ChurnPipelineError::Processing(_)));
    }

    #[test]
    fn test_non_numeric_amount_is_processing_error() {
        let config = PipelineConfig::default();
        let csv = "unique_codesclient,new_numerofacture,Echeance,CreatedOn,New_restepayer\nC1,F1,2023-01-15,2023-01-01,abc\n";

        let err = read_invoice_batch(csv.as_bytes(), &config).unwrap_err();
        assert!(matches!(err, ChurnPipelineError::Processing(msg) if msg.contains("abc")));
    }

    #[test]
    fn test_header_only_file_yields_empty_batch() {
        let config = PipelineConfig::default();
        let csv = "unique_codesclient,new_numerofacture,Echeance,CreatedOn,New_restepayer\n";
        assert!(read_invoice_batch(csv.as_bytes(), &config).unwrap().is_empty());
    }
}
