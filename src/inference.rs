//! Applying a fitted classifier to the feature table.
//!
//! The classifier itself is opaque: anything implementing [`ChurnClassifier`]
//! can score a batch. Predictions leave this module paired with the client id
//! of the row they were computed for, so callers merge them back by key.

use crate::error::{ChurnPipelineError, Result};
use crate::governorate::GovernorateEncoding;
use crate::schema::{ClientRecord, FeatureTable, FeatureVector, FEATURE_COUNT};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// `predict(features) -> labels`, one 0/1 label per input row, same order.
pub trait ChurnClassifier {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<u8>>;
}

impl<C: ChurnClassifier + ?Sized> ChurnClassifier for &C {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<u8>> {
        (**self).predict(features)
    }
}

impl<C: ChurnClassifier + ?Sized> ChurnClassifier for Box<C> {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<u8>> {
        (**self).predict(features)
    }
}

/// Per-feature standardization `(x - mean) / scale` with fitted parameters.
///
/// `mean` and `scale` are scikit-learn's `StandardScaler.mean_` and
/// `StandardScaler.scale_`, exported in feature column order. A zero scale
/// leaves the centered value unscaled, the same as scikit-learn does for
/// constant columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self { mean, scale };
        scaler.validate()?;
        Ok(scaler)
    }

    /// Leaves features unchanged.
    pub fn identity() -> Self {
        Self {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mean.len() != FEATURE_COUNT || self.scale.len() != FEATURE_COUNT {
            return Err(ChurnPipelineError::InvalidArtifact(format!(
                "scaler expects {} features, got mean={} scale={}",
                FEATURE_COUNT,
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self
            .mean
            .iter()
            .chain(self.scale.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ChurnPipelineError::InvalidArtifact(
                "scaler parameters must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transform(&self, features: &FeatureVector) -> FeatureVector {
        let mut out = *features;
        for (i, value) in out.iter_mut().enumerate() {
            // Constant training columns were stored with zero scale.
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            *value = (*value - self.mean[i]) / scale;
        }
        out
    }
}

/// Nearest-neighbour vote over a stored, already scaled reference set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    #[serde(default = "default_neighbors")]
    pub n_neighbors: usize,
    pub points: Vec<FeatureVector>,
    pub labels: Vec<u8>,
}

fn default_neighbors() -> usize {
    5
}

impl KNearestNeighbors {
    pub fn new(n_neighbors: usize, points: Vec<FeatureVector>, labels: Vec<u8>) -> Result<Self> {
        let model = Self {
            n_neighbors,
            points,
            labels,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(ChurnPipelineError::InvalidArtifact(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        if self.points.len() != self.labels.len() {
            return Err(ChurnPipelineError::InvalidArtifact(format!(
                "{} reference points but {} labels",
                self.points.len(),
                self.labels.len()
            )));
        }
        if self.points.len() < self.n_neighbors {
            return Err(ChurnPipelineError::InvalidArtifact(format!(
                "n_neighbors={} exceeds the {} stored reference points",
                self.n_neighbors,
                self.points.len()
            )));
        }
        if let Some(label) = self.labels.iter().find(|l| **l > 1) {
            return Err(ChurnPipelineError::InvalidArtifact(format!(
                "reference label {} is not binary",
                label
            )));
        }
        Ok(())
    }

    fn predict_one(&self, query: &FeatureVector) -> u8 {
        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(idx, point)| {
                let d: f64 = point
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d, idx)
            })
            .collect();

        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let positive = distances
            .iter()
            .take(self.n_neighbors)
            .filter(|(_, idx)| self.labels[*idx] == 1)
            .count();
        let negative = self.n_neighbors - positive;

        // Ties go to the smaller label.
        u8::from(positive > negative)
    }
}

impl ChurnClassifier for KNearestNeighbors {
    fn predict(&self, features: &[FeatureVector]) -> Result<Vec<u8>> {
        Ok(features.iter().map(|f| self.predict_one(f)).collect())
    }
}

/// Everything fixed at training time that scoring depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringArtifacts {
    pub governorate_encoding: GovernorateEncoding,
    pub scaler: StandardScaler,
    pub classifier: KNearestNeighbors,
}

impl ScoringArtifacts {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let artifacts: Self = serde_json::from_str(json)?;
        artifacts.scaler.validate()?;
        artifacts.classifier.validate()?;
        Ok(artifacts)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let artifacts = Self::from_json_str(&contents)?;
        info!(
            "Loaded scoring artifacts from {} ({} reference points, {} governorates)",
            path.as_ref().display(),
            artifacts.classifier.points.len(),
            artifacts.governorate_encoding.len()
        );
        Ok(artifacts)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedPrediction {
    pub client_id: String,
    pub prediction: u8,
}

/// Scales the feature table and runs the classifier over it.
pub struct InferenceAdapter<'a, C: ChurnClassifier + ?Sized> {
    scaler: &'a StandardScaler,
    classifier: &'a C,
}

impl<'a, C: ChurnClassifier + ?Sized> InferenceAdapter<'a, C> {
    pub fn new(scaler: &'a StandardScaler, classifier: &'a C) -> Self {
        Self { scaler, classifier }
    }

    /// Predicts every row of `table`, ignoring any label column.
    ///
    /// A classifier that returns fewer predictions than rows has the trailing
    /// rows dropped (with a warning); more predictions than rows is an error.
    pub fn predict(&self, table: &FeatureTable) -> Result<Vec<KeyedPrediction>> {
        self.scaler.validate()?;

        let inputs = table
            .rows
            .iter()
            .map(|row| row.feature_vector().map(|v| self.scaler.transform(&v)))
            .collect::<Result<Vec<_>>>()?;

        let predictions = self.classifier.predict(&inputs)?;

        if predictions.len() > table.len() {
            return Err(ChurnPipelineError::Processing(format!(
                "classifier returned {} predictions for {} rows",
                predictions.len(),
                table.len()
            )));
        }
        if predictions.len() < table.len() {
            warn!(
                "classifier returned {} predictions for {} rows; the last {} rows are dropped",
                predictions.len(),
                table.len(),
                table.len() - predictions.len()
            );
        }
        if let Some(bad) = predictions.iter().find(|p| **p > 1) {
            return Err(ChurnPipelineError::Processing(format!(
                "classifier returned non-binary prediction {}",
                bad
            )));
        }

        debug!("Predicted {} rows", predictions.len());

        Ok(table
            .rows
            .iter()
            .zip(predictions)
            .map(|(row, prediction)| KeyedPrediction {
                client_id: row.client_id.clone(),
                prediction,
            })
            .collect())
    }
}

/// A client record with its prediction attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredClient {
    pub record: ClientRecord,
    pub prediction: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoredBatch {
    pub clients: Vec<ScoredClient>,
    /// Ids of clients that received no prediction.
    pub unscored: Vec<String>,
}

/// Re-attaches predictions to client records by client id, keeping the
/// client order. Clients without a prediction are left out and listed in
/// `unscored`.
pub fn attach_predictions(clients: &[ClientRecord], predictions: &[KeyedPrediction]) -> ScoredBatch {
    let by_id: HashMap<&str, u8> = predictions
        .iter()
        .map(|p| (p.client_id.as_str(), p.prediction))
        .collect();

    let mut batch = ScoredBatch::default();
    for client in clients {
        match by_id.get(client.client_id.trim()) {
            Some(&prediction) => batch.clients.push(ScoredClient {
                record: client.clone(),
                prediction,
            }),
            None => batch.unscored.push(client.client_id.clone()),
        }
    }

    if !batch.unscored.is_empty() {
        warn!(
            "{} of {} clients have no prediction and are omitted from the scored batch",
            batch.unscored.len(),
            clients.len()
        );
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureRow;

    fn row(id: &str, daysrc: i64) -> FeatureRow {
        FeatureRow {
            client_id: id.to_string(),
            governorat_mapped: 1,
            type_abonnement: Some(1),
            nb_facture: 0,
            is_payed_on_time: true,
            is_paied: true,
            daysrc: Some(daysrc),
            motif: 0,
            resiliation: Some(1),
        }
    }

    fn client(id: &str) -> ClientRecord {
        ClientRecord {
            client_id: id.to_string(),
            last_connection: None,
            desired_cancellation: None,
            contract_start: None,
            contract_end: None,
            governorate: None,
            motif: None,
            other_fields: Vec::new(),
        }
    }

    /// Predicts 1 for negative daysrc (column 5), only for the first `limit` rows.
    struct SignClassifier {
        limit: usize,
    }

    impl ChurnClassifier for SignClassifier {
        fn predict(&self, features: &[FeatureVector]) -> Result<Vec<u8>> {
            Ok(features
                .iter()
                .take(self.limit)
                .map(|f| u8::from(f[5] < 0.0))
                .collect())
        }
    }

    #[test]
    fn test_scaler_transform_and_zero_scale() {
        let scaler = StandardScaler::new(
            vec![1.0, 0.0, 2.0, 0.0, 0.0, 10.0, 0.0],
            vec![2.0, 1.0, 0.0, 1.0, 1.0, 5.0, 1.0],
        )
        .unwrap();
        let out = scaler.transform(&[3.0, 4.0, 5.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(out, [1.0, 4.0, 3.0, 1.0, 0.0, -2.0, 1.0]);
    }

    #[test]
    fn test_scaler_rejects_wrong_width() {
        assert!(matches!(
            StandardScaler::new(vec![0.0; 3], vec![1.0; 3]),
            Err(ChurnPipelineError::InvalidArtifact(_))
        ));
    }

    #[test]
    fn test_knn_majority_vote() {
        let zero = [0.0; FEATURE_COUNT];
        let mut far = [0.0; FEATURE_COUNT];
        far[0] = 10.0;
        let model = KNearestNeighbors::new(
            3,
            vec![zero, zero, far, far, far],
            vec![1, 1, 0, 0, 0],
        )
        .unwrap();

        let mut near_far = [0.0; FEATURE_COUNT];
        near_far[0] = 9.0;
        assert_eq!(model.predict(&[zero, near_far]).unwrap(), vec![1, 0]);
    }

    #[test]
    fn test_knn_tie_goes_to_zero() {
        let a = [0.0; FEATURE_COUNT];
        let mut b = [0.0; FEATURE_COUNT];
        b[1] = 1.0;
        let model = KNearestNeighbors::new(2, vec![a, b], vec![1, 0]).unwrap();
        assert_eq!(model.predict(&[a]).unwrap(), vec![0]);
    }

    #[test]
    fn test_knn_validation() {
        let p = [0.0; FEATURE_COUNT];
        assert!(KNearestNeighbors::new(0, vec![p], vec![0]).is_err());
        assert!(KNearestNeighbors::new(2, vec![p], vec![0]).is_err());
        assert!(KNearestNeighbors::new(1, vec![p], vec![0, 1]).is_err());
        assert!(KNearestNeighbors::new(1, vec![p], vec![2]).is_err());
    }

    #[test]
    fn test_adapter_keys_predictions_by_client() {
        let table = FeatureTable::new(vec![row("A", -2), row("B", 3)]);
        let scaler = StandardScaler::identity();
        let classifier = SignClassifier { limit: usize::MAX };

        let predictions = InferenceAdapter::new(&scaler, &classifier)
            .predict(&table)
            .unwrap();
        assert_eq!(
            predictions,
            vec![
                KeyedPrediction {
                    client_id: "A".to_string(),
                    prediction: 1
                },
                KeyedPrediction {
                    client_id: "B".to_string(),
                    prediction: 0
                },
            ]
        );
    }

    #[test]
    fn test_adapter_truncates_short_prediction_list() {
        let table = FeatureTable::new(vec![row("A", -2), row("B", 3), row("C", -1)]);
        let scaler = StandardScaler::identity();
        let classifier = SignClassifier { limit: 2 };

        let predictions = InferenceAdapter::new(&scaler, &classifier)
            .predict(&table)
            .unwrap();
        assert_eq!(predictions.len(), 2);

        let clients = vec![client("A"), client("B"), client("C")];
        let scored = attach_predictions(&clients, &predictions);
        assert_eq!(scored.clients.len(), 2);
        assert_eq!(scored.unscored, vec!["C".to_string()]);
    }

    #[test]
    fn test_attach_predictions_by_key_not_position() {
        let predictions = vec![
            KeyedPrediction {
                client_id: "B".to_string(),
                prediction: 1,
            },
            KeyedPrediction {
                client_id: "A".to_string(),
                prediction: 0,
            },
        ];
        let clients = vec![client("A"), client("B")];

        let scored = attach_predictions(&clients, &predictions);
        assert_eq!(scored.clients[0].record.client_id, "A");
        assert_eq!(scored.clients[0].prediction, 0);
        assert_eq!(scored.clients[1].prediction, 1);
        assert!(scored.unscored.is_empty());
    }

    #[test]
    fn test_artifacts_from_json() {
        let json = r#"{
            "governorate_encoding": ["Tunis", "Sfax"],
            "scaler": { "mean": [0,0,0,0,0,0,0], "scale": [1,1,1,1,1,1,1] },
            "classifier": {
                "n_neighbors": 1,
                "points": [[0,0,0,0,0,0,0]],
                "labels": [1]
            }
        }"#;
        let artifacts = ScoringArtifacts::from_json_str(json).unwrap();
        assert_eq!(artifacts.governorate_encoding.code("Sfax"), Some(2));
        assert_eq!(artifacts.classifier.predict(&[[0.0; 7]]).unwrap(), vec![1]);
    }
}
