//! Feature contract between the offline training script and the prediction
//! service.
//!
//! The column order below is the order the classifier was trained with. Any
//! change to it (or to the encoding) must bump [`FEATURE_SCHEMA_VERSION`];
//! artifacts declaring another version are refused at load time.

use crate::model::StudentFeatures;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

pub const NUMERIC_COLUMNS: [&str; 6] = [
    "age",
    "previous_marks",
    "attendance_percent",
    "study_hours_per_week",
    "family_income",
    "assignment_score",
];

pub const CATEGORICAL_COLUMNS: [&str; 4] = [
    "gender",
    "parental_education",
    "internet_access",
    "extra_classes",
];

pub const COLUMNS: [&str; 10] = [
    "age",
    "previous_marks",
    "attendance_percent",
    "study_hours_per_week",
    "family_income",
    "assignment_score",
    "gender",
    "parental_education",
    "internet_access",
    "extra_classes",
];

// Sentinel levels used when a categorical field was never filled in.
pub const DEFAULT_GENDER: &str = "F";
pub const DEFAULT_PARENTAL_EDUCATION: &str = "HighSchool";
pub const DEFAULT_INTERNET_ACCESS: &str = "Yes";
pub const DEFAULT_EXTRA_CLASSES: &str = "No";

const PREVIOUS_MARKS: usize = 1;
const ATTENDANCE_PERCENT: usize = 2;
const STUDY_HOURS_PER_WEEK: usize = 3;

/// One fully-defaulted row in contract order. Never contains a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub numeric: [f64; 6],
    pub categorical: [String; 4],
}

impl FeatureRow {
    pub fn from_features(features: &StudentFeatures) -> Self {
        let numeric = [
            features.age.unwrap_or(0) as f64,
            features.previous_marks.unwrap_or(0.0),
            features.attendance_percent.unwrap_or(0.0),
            features.study_hours_per_week.unwrap_or(0.0),
            features.family_income.unwrap_or(0) as f64,
            features.assignment_score.unwrap_or(0.0),
        ];
        let categorical = [
            level_or(&features.gender, DEFAULT_GENDER),
            level_or(&features.parental_education, DEFAULT_PARENTAL_EDUCATION),
            level_or(&features.internet_access, DEFAULT_INTERNET_ACCESS),
            level_or(&features.extra_classes, DEFAULT_EXTRA_CLASSES),
        ];

        FeatureRow {
            numeric,
            categorical,
        }
    }

    pub fn previous_marks(&self) -> f64 {
        self.numeric[PREVIOUS_MARKS]
    }

    pub fn attendance_percent(&self) -> f64 {
        self.numeric[ATTENDANCE_PERCENT]
    }

    pub fn study_hours_per_week(&self) -> f64 {
        self.numeric[STUDY_HOURS_PER_WEEK]
    }

    /// Looks a value up by column name, rendered as text.
    pub fn value(&self, column: &str) -> Option<String> {
        if let Some(i) = NUMERIC_COLUMNS.iter().position(|c| *c == column) {
            return Some(self.numeric[i].to_string());
        }
        CATEGORICAL_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.categorical[i].clone())
    }
}

fn level_or(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub column: String,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLevels {
    pub column: String,
    pub levels: Vec<String>,
}

/// Encoding fitted alongside the classifier: standard scaling for numeric
/// columns, one-hot levels for categorical ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub numeric: Vec<ColumnScale>,
    pub categorical: Vec<CategoryLevels>,
}

impl Preprocessor {
    /// Number of encoded columns the model expects.
    pub fn width(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.levels.len()).sum::<usize>()
    }

    /// Checks that the preprocessor covers exactly the contract columns, in order.
    pub fn check_columns(&self) -> Result<(), String> {
        let numeric: Vec<&str> = self.numeric.iter().map(|c| c.column.as_str()).collect();
        if numeric != NUMERIC_COLUMNS {
            return Err(format!(
                "numeric columns {numeric:?} do not match {NUMERIC_COLUMNS:?}"
            ));
        }
        let categorical: Vec<&str> = self.categorical.iter().map(|c| c.column.as_str()).collect();
        if categorical != CATEGORICAL_COLUMNS {
            return Err(format!(
                "categorical columns {categorical:?} do not match {CATEGORICAL_COLUMNS:?}"
            ));
        }
        for scale in &self.numeric {
            if !scale.mean.is_finite() || !scale.scale.is_finite() {
                return Err(format!("non-finite scaling for {}", scale.column));
            }
        }
        Ok(())
    }

    pub fn encode(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let mut encoded = Array2::<f64>::zeros((rows.len(), self.width()));

        for (r, row) in rows.iter().enumerate() {
            for (c, scale) in self.numeric.iter().enumerate() {
                let divisor = if scale.scale == 0.0 { 1.0 } else { scale.scale };
                encoded[[r, c]] = (row.numeric[c] - scale.mean) / divisor;
            }

            let mut offset = self.numeric.len();
            for (c, category) in self.categorical.iter().enumerate() {
                // Unknown levels stay all-zero.
                if let Some(k) = category.levels.iter().position(|l| *l == row.categorical[c]) {
                    encoded[[r, offset + k]] = 1.0;
                }
                offset += category.levels.len();
            }
        }

        encoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor() -> Preprocessor {
        Preprocessor {
            numeric: NUMERIC_COLUMNS
                .iter()
                .map(|c| ColumnScale {
                    column: c.to_string(),
                    mean: 10.0,
                    scale: 2.0,
                })
                .collect(),
            categorical: vec![
                CategoryLevels {
                    column: "gender".into(),
                    levels: vec!["F".into(), "M".into()],
                },
                CategoryLevels {
                    column: "parental_education".into(),
                    levels: vec!["HighSchool".into(), "Bachelor".into()],
                },
                CategoryLevels {
                    column: "internet_access".into(),
                    levels: vec!["No".into(), "Yes".into()],
                },
                CategoryLevels {
                    column: "extra_classes".into(),
                    levels: vec!["No".into(), "Yes".into()],
                },
            ],
        }
    }

    #[test]
    fn columns_are_numeric_then_categorical() {
        let joined: Vec<&str> = NUMERIC_COLUMNS
            .iter()
            .chain(CATEGORICAL_COLUMNS.iter())
            .copied()
            .collect();
        assert_eq!(joined, COLUMNS);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let row = FeatureRow::from_features(&StudentFeatures::default());
        assert_eq!(row.numeric, [0.0; 6]);
        assert_eq!(
            row.categorical,
            [
                DEFAULT_GENDER.to_string(),
                DEFAULT_PARENTAL_EDUCATION.to_string(),
                DEFAULT_INTERNET_ACCESS.to_string(),
                DEFAULT_EXTRA_CLASSES.to_string(),
            ]
        );
    }

    #[test]
    fn blank_categorical_counts_as_missing() {
        let row = FeatureRow::from_features(&StudentFeatures {
            gender: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(row.value("gender").as_deref(), Some(DEFAULT_GENDER));
    }

    #[test]
    fn encode_scales_and_one_hots() {
        let row = FeatureRow::from_features(&StudentFeatures {
            age: Some(14),
            gender: Some("M".into()),
            parental_education: Some("Doctorate".into()),
            ..Default::default()
        });
        let pre = preprocessor();
        let x = pre.encode(&[row]);

        assert_eq!(x.dim(), (1, 14));
        assert_eq!(x[[0, 0]], 2.0);
        assert_eq!(x[[0, 1]], -5.0);
        // gender: F, M
        assert_eq!((x[[0, 6]], x[[0, 7]]), (0.0, 1.0));
        // unknown education level stays all-zero
        assert_eq!((x[[0, 8]], x[[0, 9]]), (0.0, 0.0));
        // internet default Yes, extra classes default No
        assert_eq!((x[[0, 10]], x[[0, 11]]), (0.0, 1.0));
        assert_eq!((x[[0, 12]], x[[0, 13]]), (1.0, 0.0));
    }

    #[test]
    fn zero_scale_is_treated_as_one() {
        let mut pre = preprocessor();
        pre.numeric[0].scale = 0.0;
        let row = FeatureRow::from_features(&StudentFeatures {
            age: Some(15),
            ..Default::default()
        });
        assert_eq!(pre.encode(&[row])[[0, 0]], 5.0);
    }

    #[test]
    fn reordered_columns_are_rejected() {
        let mut pre = preprocessor();
        pre.categorical.swap(0, 1);
        assert!(pre.check_columns().is_err());
        assert!(preprocessor().check_columns().is_ok());
    }
}
