use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Pass,
    Fail,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Pass => "Pass",
            Label::Fail => "Fail",
        }
    }

    pub fn from_positive(positive: bool) -> Self {
        if positive {
            Label::Pass
        } else {
            Label::Fail
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pass" => Ok(Label::Pass),
            "Fail" => Ok(Label::Fail),
            other => Err(format!("unknown prediction label {other:?}")),
        }
    }
}

/// The last persisted prediction of a student. Label and probability only
/// ever exist together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub prediction: Label,
    pub probability: f64,
}

/// Student feature snapshot. Every field is optional; `None` means the
/// teacher never supplied it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentFeatures {
    pub age: Option<i64>,
    pub previous_marks: Option<f64>,
    pub attendance_percent: Option<f64>,
    pub study_hours_per_week: Option<f64>,
    pub parental_education: Option<String>,
    pub family_income: Option<i64>,
    pub internet_access: Option<String>,
    pub extra_classes: Option<String>,
    pub assignment_score: Option<f64>,
    pub gender: Option<String>,
}

impl StudentFeatures {
    /// Overwrites the fields that are set in `patch` and leaves the rest alone.
    pub fn apply(&mut self, patch: &StudentFeatures) {
        fn merge<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        merge(&mut self.age, &patch.age);
        merge(&mut self.previous_marks, &patch.previous_marks);
        merge(&mut self.attendance_percent, &patch.attendance_percent);
        merge(&mut self.study_hours_per_week, &patch.study_hours_per_week);
        merge(&mut self.parental_education, &patch.parental_education);
        merge(&mut self.family_income, &patch.family_income);
        merge(&mut self.internet_access, &patch.internet_access);
        merge(&mut self.extra_classes, &patch.extra_classes);
        merge(&mut self.assignment_score, &patch.assignment_score);
        merge(&mut self.gender, &patch.gender);
    }

    pub fn is_empty(&self) -> bool {
        *self == StudentFeatures::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub teacher_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub features: StudentFeatures,
    pub outcome: Option<Outcome>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted by the add form.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub features: StudentFeatures,
}

/// Fields accepted by the edit form. `None` means "not submitted".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub features: StudentFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Teacher {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TeacherSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub student_count: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionStats {
    pub total: i64,
    pub passes: i64,
    pub fails: i64,
    pub avg_prob_pass: f64,
    pub avg_prob_fail: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trips_through_its_text_form() {
        assert_eq!("Pass".parse::<Label>().unwrap(), Label::Pass);
        assert_eq!(Label::Fail.to_string(), "Fail");
        assert!("pass".parse::<Label>().is_err());
    }

    #[test]
    fn apply_keeps_unsubmitted_fields() {
        let mut features = StudentFeatures {
            age: Some(17),
            previous_marks: Some(71.0),
            gender: Some("M".to_string()),
            ..Default::default()
        };
        let patch = StudentFeatures {
            previous_marks: Some(0.0),
            internet_access: Some("No".to_string()),
            ..Default::default()
        };

        features.apply(&patch);

        assert_eq!(features.age, Some(17));
        assert_eq!(features.previous_marks, Some(0.0));
        assert_eq!(features.gender.as_deref(), Some("M"));
        assert_eq!(features.internet_access.as_deref(), Some("No"));
    }
}
