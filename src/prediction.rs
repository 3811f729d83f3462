use crate::classifier::{Classifier, LogisticClassifier};
use crate::features::FeatureRow;
use crate::model::{Label, Outcome, Student, StudentFeatures};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const MARKS_WEIGHT: f64 = 0.6;
pub const ATTENDANCE_WEIGHT: f64 = 0.3;
pub const STUDY_HOURS_WEIGHT: f64 = 0.1;
/// Weighted score at or above which the heuristic predicts a pass.
pub const PASS_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Classifier,
    Heuristic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub probability: f64,
    pub source: PredictionSource,
}

impl Prediction {
    pub fn outcome(&self) -> Outcome {
        Outcome {
            prediction: self.label,
            probability: self.probability,
        }
    }
}

/// Pass/fail predictor. Uses the injected classifier when there is one and
/// falls back to the weighted-score heuristic otherwise.
#[derive(Clone, Default)]
pub struct PredictionService {
    classifier: Option<Arc<dyn Classifier>>,
}

impl PredictionService {
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    pub fn heuristic_only() -> Self {
        Self { classifier: None }
    }

    /// Loads the classifier artifact at `path`. A missing or unreadable
    /// artifact only disables the classifier path.
    pub fn from_artifact_path(path: &Path) -> Self {
        match LogisticClassifier::load(path) {
            Ok(classifier) => {
                tracing::info!(path = %path.display(), "classifier artifact loaded");
                Self::new(Some(Arc::new(classifier)))
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "classifier unavailable, predictions will use the heuristic"
                );
                Self::heuristic_only()
            }
        }
    }

    pub fn has_classifier(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn classifier_name(&self) -> Option<&str> {
        self.classifier.as_deref().map(|c| c.name())
    }

    pub fn predict(&self, features: &StudentFeatures) -> Prediction {
        let row = FeatureRow::from_features(features);

        if let Some(classifier) = &self.classifier {
            match classifier.classify(&row) {
                Ok(score) => {
                    return Prediction {
                        label: Label::from_positive(score.positive),
                        probability: score.confidence.clamp(0.0, 1.0),
                        source: PredictionSource::Classifier,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        classifier = classifier.name(),
                        error = %err,
                        "classifier inference failed, using heuristic"
                    );
                }
            }
        }

        heuristic(&row)
    }

    /// Predicts every student independently, preserving input order.
    pub fn predict_all(&self, students: &[Student]) -> Vec<(i64, Prediction)> {
        students
            .iter()
            .map(|student| {
                let prediction = self.predict(&student.features);
                tracing::debug!(
                    student_id = student.id,
                    label = %prediction.label,
                    probability = prediction.probability,
                    source = ?prediction.source,
                    "student predicted"
                );
                (student.id, prediction)
            })
            .collect()
    }
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("classifier", &self.classifier_name())
            .finish()
    }
}

pub fn heuristic_score(row: &FeatureRow) -> f64 {
    row.previous_marks() * MARKS_WEIGHT
        + row.attendance_percent() * ATTENDANCE_WEIGHT
        + row.study_hours_per_week() * STUDY_HOURS_WEIGHT
}

pub fn heuristic(row: &FeatureRow) -> Prediction {
    let score = heuristic_score(row);
    let probability = (score / 100.0).clamp(0.0, 1.0);

    Prediction {
        label: Label::from_positive(score >= PASS_SCORE),
        probability,
        source: PredictionSource::Heuristic,
    }
}
