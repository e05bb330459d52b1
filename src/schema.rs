use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Client batch column names as they appear in the source extracts.
pub const COL_CLIENT_ID: &str = "new_codeclient";
pub const COL_LAST_CONNECTION: &str = "New_DateDerniereConnexion";
pub const COL_DESIRED_CANCELLATION: &str = "new_dateresiliationsouhaite";
pub const COL_CONTRACT_START: &str = "New_Datedebutducontrat";
pub const COL_CONTRACT_END: &str = "New_DateFinducontrat";
pub const COL_GOVERNORATE: &str = "gouvernorat";
pub const COL_MOTIF: &str = "Motif resilliation";

/// Invoice batch column names.
pub const COL_INVOICE_CLIENT_ID: &str = "unique_codesclient";
pub const COL_INVOICE_NUMBER: &str = "new_numerofacture";
pub const COL_DUE_DATE: &str = "Echeance";
pub const COL_CREATED_ON: &str = "CreatedOn";
pub const COL_REMAINING_DUE: &str = "New_restepayer";

pub const COL_LABEL: &str = "resiliation";

/// Number of model features per client.
pub const FEATURE_COUNT: usize = 7;

/// Feature columns in the exact order the classifier was trained on.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "governorat_mapped",
    "type_abonnement",
    "nb_facture",
    "is_payed_on_time",
    "is_paied",
    "daysrc",
    "motif",
];

pub type FeatureVector = [f64; FEATURE_COUNT];

/// One client profile as received from the client extract.
///
/// Date-like fields are kept as raw text; parsing happens in the temporal
/// feature extractor so a bad value surfaces as `MalformedDate` with context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClientRecord {
    pub client_id: String,
    pub last_connection: Option<String>,
    pub desired_cancellation: Option<String>,
    pub contract_start: Option<String>,
    pub contract_end: Option<String>,
    pub governorate: Option<String>,
    pub motif: Option<String>,
    /// Columns outside the required set, in input order.
    #[serde(default)]
    pub other_fields: Vec<(String, String)>,
}

/// One billing event from the invoice extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvoiceRecord {
    pub client_id: String,
    pub invoice_number: Option<String>,
    pub due_date: Option<String>,
    pub created_on: Option<String>,
    pub remaining_due: Option<f64>,
}

/// The per-client output unit of the pipeline.
///
/// `client_id` rides along so predictions can be re-joined by key; it is not
/// part of the model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureRow {
    #[serde(skip_serializing)]
    #[serde(default)]
    pub client_id: String,
    pub governorat_mapped: u32,
    pub type_abonnement: Option<i64>,
    pub nb_facture: u32,
    #[serde(with = "flag")]
    #[schemars(with = "u8")]
    pub is_payed_on_time: bool,
    #[serde(with = "flag")]
    #[schemars(with = "u8")]
    pub is_paied: bool,
    pub daysrc: Option<i64>,
    pub motif: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub resiliation: Option<u8>,
}

impl FeatureRow {
    /// The model input for this row, in `FEATURE_COLUMNS` order.
    ///
    /// Rows with a missing date-derived feature cannot be scored.
    pub fn feature_vector(&self) -> crate::Result<FeatureVector> {
        let type_abonnement = self.type_abonnement.ok_or_else(|| {
            crate::ChurnPipelineError::Processing(format!(
                "client {}: type_abonnement is missing, cannot build model input",
                self.client_id
            ))
        })?;
        let daysrc = self.daysrc.ok_or_else(|| {
            crate::ChurnPipelineError::Processing(format!(
                "client {}: daysrc is missing, cannot build model input",
                self.client_id
            ))
        })?;

        Ok([
            self.governorat_mapped as f64,
            type_abonnement as f64,
            self.nb_facture as f64,
            u8::from(self.is_payed_on_time) as f64,
            u8::from(self.is_paied) as f64,
            daysrc as f64,
            self.motif as f64,
        ])
    }

    /// The same row with the label column removed, as handed to a classifier.
    pub fn without_label(&self) -> Self {
        Self {
            resiliation: None,
            ..self.clone()
        }
    }
}

/// Feature table output, one row per distinct client, in client input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_labeled(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.resiliation.is_some())
    }

    pub fn get(&self, client_id: &str) -> Option<&FeatureRow> {
        self.rows.iter().find(|r| r.client_id == client_id)
    }

    /// Drops the label column, producing classifier input.
    pub fn without_labels(&self) -> Self {
        Self {
            rows: self.rows.iter().map(FeatureRow::without_label).collect(),
        }
    }

    /// Writes the table as CSV with the feature columns (and `resiliation`
    /// when every row is labeled). Missing values are written as empty cells.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> crate::Result<()> {
        let labeled = self.is_labeled();
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = FEATURE_COLUMNS.to_vec();
        if labeled {
            header.push(COL_LABEL);
        }
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![
                row.governorat_mapped.to_string(),
                row.type_abonnement.map(|v| v.to_string()).unwrap_or_default(),
                row.nb_facture.to_string(),
                u8::from(row.is_payed_on_time).to_string(),
                u8::from(row.is_paied).to_string(),
                row.daysrc.map(|v| v.to_string()).unwrap_or_default(),
                row.motif.to_string(),
            ];
            if labeled {
                record.push(row.resiliation.unwrap_or_default().to_string());
            }
            wtr.write_record(&record)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv(&self) -> crate::Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| crate::ChurnPipelineError::Processing(e.to_string()))
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FeatureTable)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Outcome of a batch run: empty inputs are reported as `NoData`, distinct
/// from a processing error.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome<T> {
    NoData,
    Ready(T),
}

impl<T> BatchOutcome<T> {
    pub fn is_no_data(&self) -> bool {
        matches!(self, BatchOutcome::NoData)
    }

    pub fn ready(self) -> Option<T> {
        match self {
            BatchOutcome::Ready(value) => Some(value),
            BatchOutcome::NoData => None,
        }
    }
}

/// Booleans travel as 0/1 in every tabular representation.
mod flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(u8::deserialize(deserializer)? != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> FeatureRow {
        FeatureRow {
            client_id: "C1".to_string(),
            governorat_mapped: 2,
            type_abonnement: Some(1),
            nb_facture: 3,
            is_payed_on_time: false,
            is_paied: true,
            daysrc: Some(-4),
            motif: 1,
            resiliation: Some(1),
        }
    }

    #[test]
    fn test_feature_vector_order() {
        let v = sample_row().feature_vector().unwrap();
        assert_eq!(v, [2.0, 1.0, 3.0, 0.0, 1.0, -4.0, 1.0]);
    }

    #[test]
    fn test_feature_vector_rejects_missing_daysrc() {
        let mut row = sample_row();
        row.daysrc = None;
        assert!(row.feature_vector().is_err());
    }

    #[test]
    fn test_json_uses_flags_and_hides_client_id() {
        let json = serde_json::to_value(sample_row()).unwrap();
        assert_eq!(json["is_payed_on_time"], 0);
        assert_eq!(json["is_paied"], 1);
        assert!(json.get("client_id").is_none());

        let unlabeled = serde_json::to_value(sample_row().without_label()).unwrap();
        assert!(unlabeled.get("resiliation").is_none());
    }

    #[test]
    fn test_csv_export_header_and_missing_cells() {
        let mut row = sample_row();
        row.type_abonnement = None;
        let table = FeatureTable::new(vec![row]);

        let csv = table.to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "governorat_mapped,type_abonnement,nb_facture,is_payed_on_time,is_paied,daysrc,motif,resiliation"
        );
        assert_eq!(lines.next().unwrap(), "2,,3,0,1,-4,1,1");

        let unlabeled = table.without_labels().to_csv().unwrap();
        assert!(!unlabeled.lines().next().unwrap().contains("resiliation"));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = FeatureTable::schema_as_json().unwrap();
        assert!(schema_json.contains("governorat_mapped"));
        assert!(schema_json.contains("is_payed_on_time"));
        assert!(schema_json.contains("resiliation"));
    }
}
