use crate::model::{Label, Student};
use serde::Serialize;

const AT_RISK_LIMIT: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub marks: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub predicted: usize,
    pub passes: usize,
    pub fails: usize,
    pub pass_rate: f64,
    pub pass_rate_percent: String,
    pub avg_previous_marks: Option<f64>,
    pub avg_attendance: Option<f64>,
    /// Students predicted to fail, most confident first.
    pub at_risk: Vec<String>,
    pub chart: ChartData,
}

pub struct DashboardAnalyzer;

impl DashboardAnalyzer {
    pub fn new() -> Self {
        DashboardAnalyzer
    }

    pub fn summarize(&self, students: &[Student]) -> DashboardSummary {
        let total = students.len();
        let outcomes: Vec<_> = students.iter().filter_map(|s| s.outcome).collect();
        let predicted = outcomes.len();
        let passes = outcomes.iter().filter(|o| o.prediction == Label::Pass).count();
        let fails = predicted - passes;
        let pass_rate = if predicted > 0 {
            passes as f64 / predicted as f64
        } else {
            0.0
        };

        DashboardSummary {
            total,
            predicted,
            passes,
            fails,
            pass_rate,
            pass_rate_percent: format!("{:.1}%", pass_rate * 100.0),
            avg_previous_marks: mean(students.iter().filter_map(|s| s.features.previous_marks)),
            avg_attendance: mean(students.iter().filter_map(|s| s.features.attendance_percent)),
            at_risk: self.at_risk(students),
            chart: self.chart_data(students),
        }
    }

    fn at_risk(&self, students: &[Student]) -> Vec<String> {
        let mut failing: Vec<(&str, f64)> = students
            .iter()
            .filter_map(|s| match s.outcome {
                Some(o) if o.prediction == Label::Fail => Some((s.name.as_str(), o.probability)),
                _ => None,
            })
            .collect();
        failing.sort_by(|a, b| b.1.total_cmp(&a.1));
        failing
            .into_iter()
            .take(AT_RISK_LIMIT)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    fn chart_data(&self, students: &[Student]) -> ChartData {
        ChartData {
            labels: students.iter().map(|s| s.name.clone()).collect(),
            marks: students
                .iter()
                .map(|s| s.features.previous_marks.unwrap_or(0.0))
                .collect(),
        }
    }
}

impl Default for DashboardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, StudentFeatures};
    use chrono::Utc;

    fn student(id: i64, name: &str, marks: Option<f64>, outcome: Option<(Label, f64)>) -> Student {
        Student {
            id,
            teacher_id: 1,
            name: name.to_string(),
            features: StudentFeatures {
                previous_marks: marks,
                ..Default::default()
            },
            outcome: outcome.map(|(prediction, probability)| Outcome {
                prediction,
                probability,
            }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn summary_counts_only_predicted_students() {
        let students = vec![
            student(1, "Amina", Some(80.0), Some((Label::Pass, 0.9))),
            student(2, "Brian", Some(30.0), Some((Label::Fail, 0.7))),
            student(3, "Chen", None, None),
            student(4, "Dana", Some(40.0), Some((Label::Fail, 0.95))),
        ];
        let summary = DashboardAnalyzer::new().summarize(&students);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.predicted, 3);
        assert_eq!((summary.passes, summary.fails), (1, 2));
        assert_eq!(summary.pass_rate_percent, "33.3%");
        assert_eq!(summary.avg_previous_marks, Some(50.0));
        assert_eq!(summary.avg_attendance, None);
        assert_eq!(summary.at_risk, vec!["Dana".to_string(), "Brian".to_string()]);
        assert_eq!(summary.chart.marks, vec![80.0, 30.0, 0.0, 40.0]);
    }

    #[test]
    fn empty_class_has_zero_pass_rate() {
        let summary = DashboardAnalyzer::new().summarize(&[]);
        assert_eq!(summary.pass_rate, 0.0);
        assert!(summary.at_risk.is_empty());
        assert!(summary.chart.labels.is_empty());
    }
}
