use crate::config::PipelineConfig;
use crate::error::{ChurnPipelineError, Result};
use crate::governorate::GovernorateEncoding;
use crate::schema::ClientRecord;
use crate::utils::{days_between, non_empty, parse_datetime, round_years};
use chrono::NaiveDateTime;
use log::debug;

/// A client after date normalization and temporal feature derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedClient {
    pub client_id: String,
    pub last_connection: Option<NaiveDateTime>,
    pub desired_cancellation: Option<NaiveDateTime>,
    pub contract_start: Option<NaiveDateTime>,
    pub contract_end: Option<NaiveDateTime>,
    pub governorat_mapped: u32,
    /// Contract length in whole years, `None` if either bound is missing.
    pub type_abonnement: Option<i64>,
    /// Desired cancellation minus last connection, in days.
    pub daysrc: Option<i64>,
    pub motif: Option<String>,
}

pub struct TemporalFeatureExtractor<'a> {
    config: &'a PipelineConfig,
}

impl<'a> TemporalFeatureExtractor<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Extracts every client of the batch, stopping at the first malformed
    /// date or unknown governorate.
    pub fn extract_batch(
        &self,
        clients: &[ClientRecord],
        encoding: &GovernorateEncoding,
    ) -> Result<Vec<ExtractedClient>> {
        let extracted = clients
            .iter()
            .map(|client| self.extract(client, encoding))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Extracted temporal features for {} clients ({} governorates encoded)",
            extracted.len(),
            encoding.len()
        );

        Ok(extracted)
    }

    pub fn extract(
        &self,
        client: &ClientRecord,
        encoding: &GovernorateEncoding,
    ) -> Result<ExtractedClient> {
        let columns = &self.config.client_columns;

        let client_id = client.client_id.trim();
        if client_id.is_empty() {
            return Err(ChurnPipelineError::Processing(format!(
                "client record has an empty '{}'",
                columns.client_id
            )));
        }

        let last_connection = self.parse_field(
            client_id,
            &columns.last_connection,
            client.last_connection.as_deref(),
        )?;
        let desired_cancellation = self.parse_field(
            client_id,
            &columns.desired_cancellation,
            client.desired_cancellation.as_deref(),
        )?;
        let contract_start = self.parse_field(
            client_id,
            &columns.contract_start,
            client.contract_start.as_deref(),
        )?;
        let contract_end = self.parse_field(
            client_id,
            &columns.contract_end,
            client.contract_end.as_deref(),
        )?;

        let daysrc = match (last_connection, desired_cancellation) {
            (Some(last), Some(desired)) => Some(days_between(last, desired)),
            _ => None,
        };

        let type_abonnement = match (contract_start, contract_end) {
            (Some(start), Some(end)) => Some(round_years(
                days_between(start, end),
                self.config.days_per_year,
            )),
            _ => None,
        };

        Ok(ExtractedClient {
            client_id: client_id.to_string(),
            last_connection,
            desired_cancellation,
            contract_start,
            contract_end,
            governorat_mapped: encoding.encode(client.governorate.as_deref())?,
            type_abonnement,
            daysrc,
            motif: client.motif.clone(),
        })
    }

    fn parse_field(
        &self,
        client_id: &str,
        column: &str,
        value: Option<&str>,
    ) -> Result<Option<NaiveDateTime>> {
        parse_date_cell(client_id, column, value, &self.config.extra_date_formats)
    }
}

/// Parses one date cell. Blank is missing; anything else must parse.
pub fn parse_date_cell(
    client_id: &str,
    column: &str,
    value: Option<&str>,
    extra_formats: &[String],
) -> Result<Option<NaiveDateTime>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => parse_datetime(raw, extra_formats)
            .map(Some)
            .ok_or_else(|| ChurnPipelineError::MalformedDate {
                column: column.to_string(),
                client_id: client_id.to_string(),
                value: raw.to_string(),
            }),
    }
}
