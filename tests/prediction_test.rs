use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::Array1;
use std::path::PathBuf;
use std::sync::Arc;
use student_tracker::classifier::{Classifier, ClassifierError, LogisticClassifier, ModelArtifact};
use student_tracker::features::{
    CategoryLevels, ColumnScale, FeatureRow, Preprocessor, CATEGORICAL_COLUMNS,
    FEATURE_SCHEMA_VERSION, NUMERIC_COLUMNS,
};
use student_tracker::model::{Label, StudentFeatures};
use student_tracker::prediction::{PredictionService, PredictionSource};

fn preprocessor() -> Preprocessor {
    let levels = [
        vec!["F", "M"],
        vec!["HighSchool", "Bachelor", "Master"],
        vec!["No", "Yes"],
        vec!["No", "Yes"],
    ];
    Preprocessor {
        numeric: NUMERIC_COLUMNS
            .iter()
            .map(|c| ColumnScale {
                column: c.to_string(),
                mean: if *c == "previous_marks" { 50.0 } else { 0.0 },
                scale: if *c == "previous_marks" { 20.0 } else { 0.0 },
            })
            .collect(),
        categorical: CATEGORICAL_COLUMNS
            .iter()
            .zip(levels)
            .map(|(c, levels)| CategoryLevels {
                column: c.to_string(),
                levels: levels.into_iter().map(String::from).collect(),
            })
            .collect(),
    }
}

fn marks(previous_marks: f64) -> StudentFeatures {
    StudentFeatures {
        previous_marks: Some(previous_marks),
        ..Default::default()
    }
}

/// Tiny model where a student passes iff previous marks are above 50.
fn train() -> ModelArtifact {
    let pre = preprocessor();
    let marks_seen: Vec<f64> = (0..20).map(|i| i as f64 * 5.0 + 2.5).collect();
    let rows: Vec<FeatureRow> = marks_seen
        .iter()
        .map(|m| FeatureRow::from_features(&marks(*m)))
        .collect();
    let records = pre.encode(&rows);
    let targets: Array1<bool> = marks_seen.iter().map(|m| *m > 50.0).collect();

    let model: FittedLogisticRegression<f64, bool> = LogisticRegression::default()
        .max_iterations(200)
        .fit(&Dataset::new(records, targets))
        .unwrap();
    ModelArtifact::new(pre, model)
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "student_tracker_{}_{}.json",
        std::process::id(),
        name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trained_artifact_round_trips_through_disk() {
        let path = temp_path("roundtrip");
        train().save(&path).unwrap();

        let service = PredictionService::from_artifact_path(&path);
        assert!(service.has_classifier());

        let strong = service.predict(&marks(95.0));
        assert_eq!(strong.source, PredictionSource::Classifier);
        assert_eq!(strong.label, Label::Pass);
        assert!((0.5..=1.0).contains(&strong.probability));

        let weak = service.predict(&marks(5.0));
        assert_eq!(weak.label, Label::Fail);
        assert!((0.5..=1.0).contains(&weak.probability));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_artifact_falls_back_to_heuristic() {
        let service = PredictionService::from_artifact_path(&temp_path("does_not_exist"));
        assert!(!service.has_classifier());

        let prediction = service.predict(&StudentFeatures {
            previous_marks: Some(70.0),
            attendance_percent: Some(40.0),
            study_hours_per_week: Some(10.0),
            ..Default::default()
        });
        // 42 + 12 + 1 = 55
        assert_eq!(prediction.source, PredictionSource::Heuristic);
        assert_eq!(prediction.label, Label::Pass);
        assert!((prediction.probability - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_wrong_schema_version_is_rejected() {
        let mut artifact = train();
        artifact.schema_version = FEATURE_SCHEMA_VERSION + 1;
        let raw = serde_json::to_string(&artifact).unwrap();

        match ModelArtifact::from_json(&raw) {
            Err(ClassifierError::SchemaVersion { expected, found }) => {
                assert_eq!(expected, FEATURE_SCHEMA_VERSION);
                assert_eq!(found, FEATURE_SCHEMA_VERSION + 1);
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_reordered_columns_are_rejected() {
        let mut artifact = train();
        artifact.columns.swap(0, 1);
        assert!(matches!(
            LogisticClassifier::from_artifact(artifact),
            Err(ClassifierError::Columns(_))
        ));
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let mut artifact = train();
        artifact.preprocessor.categorical[1]
            .levels
            .push("Doctorate".to_string());
        assert!(matches!(
            artifact.validate(),
            Err(ClassifierError::Width { .. })
        ));
    }

    #[test]
    fn test_garbage_artifact_is_ignored_at_startup() {
        let path = temp_path("garbage");
        std::fs::write(&path, "{ not json").unwrap();

        let service = PredictionService::from_artifact_path(&path);
        assert!(!service.has_classifier());
        assert_eq!(service.predict(&marks(500.0)).probability, 1.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_classifier_and_service_agree() {
        let classifier = LogisticClassifier::from_artifact(train()).unwrap();
        let row = FeatureRow::from_features(&marks(80.0));
        let score = classifier.classify(&row).unwrap();

        let service = PredictionService::new(Some(Arc::new(classifier)));
        let prediction = service.predict(&marks(80.0));
        assert_eq!(prediction.label, Label::from_positive(score.positive));
        assert_eq!(prediction.probability, score.confidence);
    }
}
