use crate::error::{ChurnPipelineError, Result};
use crate::schema::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Cancellation reasons that do not count as a churn signal.
pub const DEFAULT_MOTIF_WHITELIST: [&str; 7] = [
    "Migration vers smart ADSL",
    "Migration vers RAPIDO",
    "Résilliation IP fixe avec réservation",
    "Migration vers GPON",
    "Résiliation suite SWAP GPON",
    "Autres",
    "Migration vers TTBox",
];

/// Outstanding balance at or below which a client counts as paid up.
pub const DEFAULT_PAID_THRESHOLD: f64 = 20.0;

pub const DEFAULT_DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClientColumns {
    pub client_id: String,
    pub last_connection: String,
    pub desired_cancellation: String,
    pub contract_start: String,
    pub contract_end: String,
    pub governorate: String,
    pub motif: String,
}

impl Default for ClientColumns {
    fn default() -> Self {
        Self {
            client_id: COL_CLIENT_ID.to_string(),
            last_connection: COL_LAST_CONNECTION.to_string(),
            desired_cancellation: COL_DESIRED_CANCELLATION.to_string(),
            contract_start: COL_CONTRACT_START.to_string(),
            contract_end: COL_CONTRACT_END.to_string(),
            governorate: COL_GOVERNORATE.to_string(),
            motif: COL_MOTIF.to_string(),
        }
    }
}

impl ClientColumns {
    pub fn required(&self) -> [&str; 7] {
        [
            self.client_id.as_str(),
            self.last_connection.as_str(),
            self.desired_cancellation.as_str(),
            self.contract_start.as_str(),
            self.contract_end.as_str(),
            self.governorate.as_str(),
            self.motif.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct InvoiceColumns {
    pub client_id: String,
    pub invoice_number: String,
    pub due_date: String,
    pub created_on: String,
    pub remaining_due: String,
}

impl Default for InvoiceColumns {
    fn default() -> Self {
        Self {
            client_id: COL_INVOICE_CLIENT_ID.to_string(),
            invoice_number: COL_INVOICE_NUMBER.to_string(),
            due_date: COL_DUE_DATE.to_string(),
            created_on: COL_CREATED_ON.to_string(),
            remaining_due: COL_REMAINING_DUE.to_string(),
        }
    }
}

impl InvoiceColumns {
    pub fn required(&self) -> [&str; 5] {
        [
            self.client_id.as_str(),
            self.invoice_number.as_str(),
            self.due_date.as_str(),
            self.created_on.as_str(),
            self.remaining_due.as_str(),
        ]
    }
}

/// Tunables for one pipeline run. Every field has a default matching the
/// production extracts, so an empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(description = "Column names of the client extract")]
    pub client_columns: ClientColumns,

    #[schemars(description = "Column names of the invoice extract")]
    pub invoice_columns: InvoiceColumns,

    #[schemars(
        description = "Total remaining amount due at or below which the client is considered paid up"
    )]
    pub paid_threshold: f64,

    #[schemars(description = "Days per contract year used to derive type_abonnement")]
    pub days_per_year: f64,

    #[schemars(
        description = "Cancellation reasons mapped to motif = 0. Exact, case-sensitive match."
    )]
    pub motif_whitelist: Vec<String>,

    #[schemars(
        description = "Additional chrono format strings tried before the built-in date shapes"
    )]
    pub extra_date_formats: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            client_columns: ClientColumns::default(),
            invoice_columns: InvoiceColumns::default(),
            paid_threshold: DEFAULT_PAID_THRESHOLD,
            days_per_year: DEFAULT_DAYS_PER_YEAR,
            motif_whitelist: DEFAULT_MOTIF_WHITELIST
                .iter()
                .map(|m| m.to_string())
                .collect(),
            extra_date_formats: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.paid_threshold.is_finite() {
            return Err(ChurnPipelineError::InvalidConfig(format!(
                "paid_threshold must be finite, got {}",
                self.paid_threshold
            )));
        }

        if !(self.days_per_year.is_finite() && self.days_per_year > 0.0) {
            return Err(ChurnPipelineError::InvalidConfig(format!(
                "days_per_year must be positive, got {}",
                self.days_per_year
            )));
        }

        let client_required = self.client_columns.required();
        for (idx, name) in client_required.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ChurnPipelineError::InvalidConfig(
                    "client column names must not be empty".to_string(),
                ));
            }
            if client_required[..idx].contains(name) {
                return Err(ChurnPipelineError::InvalidConfig(format!(
                    "client column '{}' is mapped to more than one field",
                    name
                )));
            }
        }

        let invoice_required = self.invoice_columns.required();
        for (idx, name) in invoice_required.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ChurnPipelineError::InvalidConfig(
                    "invoice column names must not be empty".to_string(),
                ));
            }
            if invoice_required[..idx].contains(name) {
                return Err(ChurnPipelineError::InvalidConfig(format!(
                    "invoice column '{}' is mapped to more than one field",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(PipelineConfig))
    }
}
