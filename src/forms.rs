//! Form payloads and their validation.
//!
//! Browsers submit every input, filled or not, so an empty string means the
//! field was left alone. A literal `0` is a real value.

use crate::error::ValidationError;
use crate::model::{NewStudent, StudentFeatures, StudentPatch};
use serde::Deserialize;

const MAX_NAME_LEN: usize = 100;
const MAX_EDUCATION_LEN: usize = 32;

#[derive(Debug, Default, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminLoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentForm {
    pub name: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub previous_marks: Option<String>,
    pub attendance_percent: Option<String>,
    pub study_hours_per_week: Option<String>,
    pub parental_education: Option<String>,
    pub family_income: Option<String>,
    pub internet_access: Option<String>,
    pub extra_classes: Option<String>,
    pub assignment_score: Option<String>,
}

impl StudentForm {
    pub fn into_new_student(self) -> Result<NewStudent, ValidationError> {
        let name = parse_name(&self.name)?
            .ok_or_else(|| ValidationError::new("name", "Student name is required."))?;
        Ok(NewStudent {
            name,
            features: self.features()?,
        })
    }

    pub fn into_patch(self) -> Result<StudentPatch, ValidationError> {
        Ok(StudentPatch {
            name: parse_name(&self.name)?,
            features: self.features()?,
        })
    }

    fn features(&self) -> Result<StudentFeatures, ValidationError> {
        Ok(StudentFeatures {
            age: parse_count("age", "Age", &self.age)?,
            previous_marks: parse_number("previous_marks", "Previous marks", &self.previous_marks)?,
            attendance_percent: parse_number(
                "attendance_percent",
                "Attendance",
                &self.attendance_percent,
            )?,
            study_hours_per_week: parse_number(
                "study_hours_per_week",
                "Study hours per week",
                &self.study_hours_per_week,
            )?,
            parental_education: parse_education(&self.parental_education)?,
            family_income: parse_count("family_income", "Family income", &self.family_income)?,
            internet_access: parse_yes_no("internet_access", "Internet access", &self.internet_access)?,
            extra_classes: parse_yes_no("extra_classes", "Extra classes", &self.extra_classes)?,
            assignment_score: parse_number(
                "assignment_score",
                "Assignment score",
                &self.assignment_score,
            )?,
            gender: parse_gender(&self.gender)?,
        })
    }
}

fn submitted(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_name(value: &Option<String>) -> Result<Option<String>, ValidationError> {
    match submitted(value) {
        None => Ok(None),
        Some(name) if name.chars().count() > MAX_NAME_LEN => Err(ValidationError::new(
            "name",
            format!("Student name must be at most {MAX_NAME_LEN} characters."),
        )),
        Some(name) => Ok(Some(name.to_string())),
    }
}

fn parse_count(
    field: &'static str,
    label: &str,
    value: &Option<String>,
) -> Result<Option<i64>, ValidationError> {
    let Some(raw) = submitted(value) else {
        return Ok(None);
    };
    match raw.parse::<i64>() {
        Ok(n) if n >= 0 => Ok(Some(n)),
        _ => Err(ValidationError::new(
            field,
            format!("{label} must be a whole number of 0 or more."),
        )),
    }
}

fn parse_number(
    field: &'static str,
    label: &str,
    value: &Option<String>,
) -> Result<Option<f64>, ValidationError> {
    let Some(raw) = submitted(value) else {
        return Ok(None);
    };
    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() && n >= 0.0 => Ok(Some(n)),
        _ => Err(ValidationError::new(
            field,
            format!("{label} must be a number of 0 or more."),
        )),
    }
}

fn parse_gender(value: &Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = submitted(value) else {
        return Ok(None);
    };
    match raw.to_ascii_uppercase().as_str() {
        "M" | "F" => Ok(Some(raw.to_ascii_uppercase())),
        _ => Err(ValidationError::new("gender", "Gender must be M or F.")),
    }
}

fn parse_yes_no(
    field: &'static str,
    label: &str,
    value: &Option<String>,
) -> Result<Option<String>, ValidationError> {
    let Some(raw) = submitted(value) else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "yes" => Ok(Some("Yes".to_string())),
        "no" => Ok(Some("No".to_string())),
        _ => Err(ValidationError::new(field, format!("{label} must be Yes or No."))),
    }
}

fn parse_education(value: &Option<String>) -> Result<Option<String>, ValidationError> {
    match submitted(value) {
        None => Ok(None),
        Some(raw) if raw.chars().count() > MAX_EDUCATION_LEN => Err(ValidationError::new(
            "parental_education",
            format!("Parental education must be at most {MAX_EDUCATION_LEN} characters."),
        )),
        Some(raw) => Ok(Some(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> StudentForm {
        let fields: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(fields.into()).unwrap()
    }

    #[test]
    fn name_only_leaves_features_unset() {
        let student = form(&[("name", " Amina "), ("age", ""), ("gender", "")])
            .into_new_student()
            .unwrap();
        assert_eq!(student.name, "Amina");
        assert!(student.features.is_empty());
    }

    #[test]
    fn missing_name_is_rejected() {
        let err = form(&[("age", "15")]).into_new_student().unwrap_err();
        assert_eq!(err.field, "name");
        assert_eq!(err.message, "Student name is required.");
    }

    #[test]
    fn zero_is_a_real_value() {
        let patch = form(&[("previous_marks", "0"), ("family_income", "0")])
            .into_patch()
            .unwrap();
        assert_eq!(patch.features.previous_marks, Some(0.0));
        assert_eq!(patch.features.family_income, Some(0));
        assert_eq!(patch.features.age, None);
        assert_eq!(patch.name, None);
    }

    #[test]
    fn categorical_values_are_normalized() {
        let patch = form(&[
            ("gender", "m"),
            ("internet_access", "YES"),
            ("extra_classes", "no"),
        ])
        .into_patch()
        .unwrap();
        assert_eq!(patch.features.gender.as_deref(), Some("M"));
        assert_eq!(patch.features.internet_access.as_deref(), Some("Yes"));
        assert_eq!(patch.features.extra_classes.as_deref(), Some("No"));
    }

    #[test]
    fn bad_values_name_their_field() {
        for (field, value) in [
            ("age", "-1"),
            ("age", "12.5"),
            ("previous_marks", "abc"),
            ("attendance_percent", "NaN"),
            ("study_hours_per_week", "inf"),
            ("gender", "X"),
            ("internet_access", "maybe"),
        ] {
            let err = form(&[("name", "A"), (field, value)])
                .into_new_student()
                .unwrap_err();
            assert_eq!(err.field, field, "value {value:?}");
        }
    }

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(normalize_email("  Ada@School.ORG "), "ada@school.org");
    }
}
