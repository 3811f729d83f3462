//! HTML pages. Templates are plain `tinytemplate` text; values are HTML
//! escaped by the default formatter.

use crate::analytics::DashboardSummary;
use crate::auth::Flash;
use crate::error::AppResult;
use crate::model::{Student, Teacher, TeacherSummary};
use serde::Serialize;
use tinytemplate::TinyTemplate;

pub const STYLESHEET: &str = r#"
body { font-family: Arial, sans-serif; max-width: 960px; margin: 30px auto; padding: 0 20px; }
nav a { margin-right: 12px; }
.flash { padding: 10px; border-radius: 4px; margin: 8px 0; }
.flash.success { background: #d4edda; color: #155724; }
.flash.info { background: #d1ecf1; color: #0c5460; }
.flash.warning { background: #fff3cd; color: #856404; }
.flash.danger { background: #f8d7da; color: #721c24; }
table { width: 100%; border-collapse: collapse; margin: 15px 0; }
th, td { padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }
th { background: #f8f9fa; }
.pass { color: #28a745; font-weight: bold; }
.fail { color: #dc3545; font-weight: bold; }
form.inline { display: inline; }
.grid { display: grid; grid-template-columns: 1fr 1fr; gap: 8px 16px; }
label { display: block; font-weight: bold; }
input { width: 100%; padding: 6px; }
#marks-chart { margin: 15px 0; }
.bar-row { display: flex; align-items: center; margin: 2px 0; }
.bar-label { width: 160px; overflow: hidden; white-space: nowrap; }
.bar { background: #007bff; color: white; padding: 2px 4px; min-width: 24px; }
"#;

pub const SCRIPT: &str = r#"
async function predictStudent(id) {
    const response = await fetch('/students/' + id + '/predict', { method: 'POST' });
    if (!response.ok) {
        alert('Prediction failed (' + response.status + ')');
        return;
    }
    window.location.reload();
}

async function predictAll() {
    const response = await fetch('/students/predict-all', { method: 'POST' });
    if (!response.ok) {
        alert('Prediction failed (' + response.status + ')');
        return;
    }
    window.location.reload();
}

// Bar per student of previous marks, read from the dashboard's data-chart attribute.
function drawMarksChart() {
    const container = document.getElementById('marks-chart');
    if (!container || !container.dataset.chart) {
        return;
    }
    const chart = JSON.parse(container.dataset.chart);
    chart.labels.forEach(function (label, i) {
        const marks = chart.marks[i];
        const row = document.createElement('div');
        row.className = 'bar-row';
        const name = document.createElement('span');
        name.className = 'bar-label';
        name.textContent = label;
        const bar = document.createElement('span');
        bar.className = 'bar';
        bar.style.width = Math.max(0, Math.min(100, marks)) + '%';
        bar.textContent = marks;
        row.appendChild(name);
        row.appendChild(bar);
        container.appendChild(row);
    });
}

document.addEventListener('DOMContentLoaded', drawMarksChart);
"#;

const HEADER: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{title} - Student Tracker</title>
<link rel="stylesheet" href="/static/app.css">
<script src="/static/app.js"></script>
</head>
<body>
<nav>
<a href="/">Home</a>
{{ if teacher_name }}<a href="/dashboard">Dashboard</a> <a href="/logout">Logout ({teacher_name})</a>{{ endif }}
{{ if admin_name }}<a href="/admin/dashboard">Admin</a> <a href="/admin/logout">Logout ({admin_name})</a>{{ endif }}
</nav>
{{ for flash in flashes }}<div class="flash {flash.level}">{flash.message}</div>
{{ endfor }}"#;

const FOOTER: &str = "\n</body>\n</html>\n";

const HOME: &str = r#"{{ call header with page }}
<h1>Student Tracker</h1>
<p>Track your students and predict pass/fail outcomes.</p>
<p><a href="/login">Teacher login</a> | <a href="/signup">Teacher signup</a> | <a href="/admin">Admin login</a></p>
{{ call footer with page }}"#;

const SIGNUP: &str = r#"{{ call header with page }}
<h1>Teacher signup</h1>
<form method="post" action="/signup">
<label>Name <input name="name" required></label>
<label>Email <input name="email" type="email" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Sign up</button>
</form>
<p>Already registered? <a href="/login">Login</a></p>
{{ call footer with page }}"#;

const LOGIN: &str = r#"{{ call header with page }}
<h1>Teacher login</h1>
<form method="post" action="/login">
<label>Email <input name="email" type="email" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Login</button>
</form>
{{ call footer with page }}"#;

const ADMIN_LOGIN: &str = r#"{{ call header with page }}
<h1>Admin login</h1>
<form method="post" action="/admin">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Login</button>
</form>
{{ call footer with page }}"#;

const STUDENT_FIELDS: &str = r#"<div class="grid">
<label>Age <input name="age" inputmode="numeric" value="{age}"></label>
<label>Gender (M/F) <input name="gender" value="{gender}"></label>
<label>Previous marks <input name="previous_marks" inputmode="decimal" value="{previous_marks}"></label>
<label>Attendance % <input name="attendance_percent" inputmode="decimal" value="{attendance_percent}"></label>
<label>Study hours / week <input name="study_hours_per_week" inputmode="decimal" value="{study_hours_per_week}"></label>
<label>Assignment score <input name="assignment_score" inputmode="decimal" value="{assignment_score}"></label>
<label>Parental education <input name="parental_education" value="{parental_education}"></label>
<label>Family income <input name="family_income" inputmode="numeric" value="{family_income}"></label>
<label>Internet access (Yes/No) <input name="internet_access" value="{internet_access}"></label>
<label>Extra classes (Yes/No) <input name="extra_classes" value="{extra_classes}"></label>
</div>"#;

const STUDENT_TABLE: &str = r#"<table>
<thead><tr><th>Name</th><th>Age</th><th>Prev. marks</th><th>Attendance</th><th>Study h/w</th><th>Prediction</th><th>Probability</th>{{ if editable }}<th></th>{{ endif }}</tr></thead>
<tbody>
{{ for s in students }}<tr>
<td>{s.name}</td><td>{s.age}</td><td>{s.previous_marks}</td><td>{s.attendance_percent}</td><td>{s.study_hours_per_week}</td>
<td class="{s.prediction_class}">{s.prediction}</td><td>{s.probability_percent}</td>
{{ if s.editable }}<td>
<a href="/students/{s.id}/edit">Edit</a>
<button type="button" onclick="predictStudent({s.id})">Predict</button>
<form class="inline" method="post" action="/students/{s.id}/delete"><button type="submit">Delete</button></form>
</td>{{ endif }}
</tr>
{{ endfor }}</tbody>
</table>"#;

const DASHBOARD: &str = r#"{{ call header with page }}
<h1>Dashboard</h1>
<p>{summary.total} students, {summary.predicted} predicted, pass rate {summary.pass_rate_percent}.</p>
{{ if summary.at_risk }}<p>At risk: {{ for name in summary.at_risk }}{name} {{ endfor }}</p>{{ endif }}
<p><button type="button" onclick="predictAll()">Predict all</button> <a href="/students/export.csv">Export CSV</a></p>
<div id="marks-chart" data-chart="{chart_json}"></div>
{{ call student_table with table }}
<h2>Add student</h2>
<form method="post" action="/students/add">
<label>Name <input name="name" required></label>
{{ call student_fields with blank }}
<button type="submit">Add</button>
</form>
{{ call footer with page }}"#;

const EDIT_STUDENT: &str = r#"{{ call header with page }}
<h1>Edit {student.name}</h1>
<p>Leave a field empty to keep its current value.</p>
<form method="post" action="/students/{student.id}/edit">
<label>Name <input name="name" value="{student.name}"></label>
{{ call student_fields with student }}
<button type="submit">Save</button>
</form>
{{ call footer with page }}"#;

const ADMIN_DASHBOARD: &str = r#"{{ call header with page }}
<h1>Teachers</h1>
<table>
<thead><tr><th>Name</th><th>Email</th><th>Students</th><th></th></tr></thead>
<tbody>
{{ for t in teachers }}<tr><td>{t.name}</td><td>{t.email}</td><td>{t.student_count}</td><td><a href="/admin/teachers/{t.id}">View students</a></td></tr>
{{ endfor }}</tbody>
</table>
{{ call footer with page }}"#;

const ADMIN_STUDENTS: &str = r#"{{ call header with page }}
<h1>Students of {teacher.name}</h1>
<p>{teacher.email}</p>
{{ call student_table with table }}
<p><a href="/admin/dashboard">Back</a></p>
{{ call footer with page }}"#;

const ERROR_PAGE: &str = r#"{{ call header with page }}
<h1>{status}</h1>
<p>{message}</p>
{{ call footer with page }}"#;

/// Data every page header needs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Page {
    pub title: String,
    pub teacher_name: Option<String>,
    pub admin_name: Option<String>,
    pub flashes: Vec<Flash>,
}

impl Page {
    pub fn new(title: impl Into<String>, flashes: Vec<Flash>) -> Self {
        Self {
            title: title.into(),
            flashes,
            ..Default::default()
        }
    }

    pub fn for_teacher(mut self, name: &str) -> Self {
        self.teacher_name = Some(name.to_string());
        self
    }

    pub fn for_admin(mut self, username: &str) -> Self {
        self.admin_name = Some(username.to_string());
        self
    }
}

/// A student row as the templates print it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentView {
    pub id: i64,
    pub name: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub previous_marks: Option<f64>,
    pub attendance_percent: Option<f64>,
    pub study_hours_per_week: Option<f64>,
    pub assignment_score: Option<f64>,
    pub parental_education: Option<String>,
    pub family_income: Option<i64>,
    pub internet_access: Option<String>,
    pub extra_classes: Option<String>,
    pub prediction: Option<&'static str>,
    pub prediction_class: &'static str,
    pub probability_percent: Option<String>,
    pub editable: bool,
}

impl From<&Student> for StudentView {
    fn from(s: &Student) -> Self {
        let f = &s.features;
        StudentView {
            id: s.id,
            name: s.name.clone(),
            age: f.age,
            gender: f.gender.clone(),
            previous_marks: f.previous_marks,
            attendance_percent: f.attendance_percent,
            study_hours_per_week: f.study_hours_per_week,
            assignment_score: f.assignment_score,
            parental_education: f.parental_education.clone(),
            family_income: f.family_income,
            internet_access: f.internet_access.clone(),
            extra_classes: f.extra_classes.clone(),
            prediction: s.outcome.map(|o| o.prediction.as_str()),
            prediction_class: match s.outcome.map(|o| o.prediction) {
                Some(crate::model::Label::Pass) => "pass",
                Some(crate::model::Label::Fail) => "fail",
                None => "",
            },
            probability_percent: s
                .outcome
                .map(|o| format!("{:.1}%", o.probability * 100.0)),
            editable: false,
        }
    }
}

#[derive(Serialize)]
struct StudentTable {
    students: Vec<StudentView>,
    editable: bool,
}

impl StudentTable {
    fn new(students: &[Student], editable: bool) -> Self {
        Self {
            students: students
                .iter()
                .map(|s| StudentView {
                    editable,
                    ..StudentView::from(s)
                })
                .collect(),
            editable,
        }
    }
}

#[derive(Serialize)]
struct PageOnly<'a> {
    page: &'a Page,
}

#[derive(Serialize)]
struct DashboardContext<'a> {
    page: &'a Page,
    summary: &'a DashboardSummary,
    chart_json: String,
    table: StudentTable,
    blank: StudentView,
}

#[derive(Serialize)]
struct EditContext<'a> {
    page: &'a Page,
    student: StudentView,
}

#[derive(Serialize)]
struct AdminDashboardContext<'a> {
    page: &'a Page,
    teachers: &'a [TeacherSummary],
}

#[derive(Serialize)]
struct AdminStudentsContext<'a> {
    page: &'a Page,
    teacher: &'a Teacher,
    table: StudentTable,
}

#[derive(Serialize)]
struct ErrorContext<'a> {
    page: &'a Page,
    status: u16,
    message: &'a str,
}

fn render<C: Serialize>(name: &str, context: &C) -> AppResult<String> {
    // TinyTemplate is not Sync, so it is rebuilt per render; parsing these is cheap.
    let mut tt = TinyTemplate::new();
    tt.add_template("header", HEADER)?;
    tt.add_template("footer", FOOTER)?;
    tt.add_template("student_fields", STUDENT_FIELDS)?;
    tt.add_template("student_table", STUDENT_TABLE)?;
    tt.add_template("home", HOME)?;
    tt.add_template("signup", SIGNUP)?;
    tt.add_template("login", LOGIN)?;
    tt.add_template("admin_login", ADMIN_LOGIN)?;
    tt.add_template("dashboard", DASHBOARD)?;
    tt.add_template("edit_student", EDIT_STUDENT)?;
    tt.add_template("admin_dashboard", ADMIN_DASHBOARD)?;
    tt.add_template("admin_students", ADMIN_STUDENTS)?;
    tt.add_template("error", ERROR_PAGE)?;
    Ok(tt.render(name, context)?)
}

pub fn home(page: &Page) -> AppResult<String> {
    render("home", &PageOnly { page })
}

pub fn signup(page: &Page) -> AppResult<String> {
    render("signup", &PageOnly { page })
}

pub fn login(page: &Page) -> AppResult<String> {
    render("login", &PageOnly { page })
}

pub fn admin_login(page: &Page) -> AppResult<String> {
    render("admin_login", &PageOnly { page })
}

pub fn dashboard(page: &Page, students: &[Student], summary: &DashboardSummary) -> AppResult<String> {
    let chart_json = serde_json::to_string(&summary.chart)?;
    render(
        "dashboard",
        &DashboardContext {
            page,
            summary,
            chart_json,
            table: StudentTable::new(students, true),
            blank: StudentView::default(),
        },
    )
}

pub fn edit_student(page: &Page, student: &Student) -> AppResult<String> {
    render(
        "edit_student",
        &EditContext {
            page,
            student: StudentView::from(student),
        },
    )
}

pub fn admin_dashboard(page: &Page, teachers: &[TeacherSummary]) -> AppResult<String> {
    render("admin_dashboard", &AdminDashboardContext { page, teachers })
}

pub fn admin_students(page: &Page, teacher: &Teacher, students: &[Student]) -> AppResult<String> {
    render(
        "admin_students",
        &AdminStudentsContext {
            page,
            teacher,
            table: StudentTable::new(students, false),
        },
    )
}

pub fn error_page(page: &Page, status: u16, message: &str) -> AppResult<String> {
    render(
        "error",
        &ErrorContext {
            page,
            status,
            message,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::FlashLevel;

    #[test]
    fn values_are_html_escaped() {
        let page = Page::new(
            "Login",
            vec![Flash::new(FlashLevel::Danger, "<script>alert(1)</script>")],
        );
        let html = login(&page).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert(1)"));
        assert!(html.contains("flash danger"));
    }

    #[test]
    fn dashboard_embeds_chart_data_for_the_script() {
        use crate::analytics::DashboardAnalyzer;
        use crate::model::StudentFeatures;
        use chrono::Utc;

        let students = vec![Student {
            id: 1,
            teacher_id: 1,
            name: "Amina".to_string(),
            features: StudentFeatures {
                previous_marks: Some(72.5),
                ..Default::default()
            },
            outcome: None,
            created_at: Utc::now(),
        }];
        let summary = DashboardAnalyzer::new().summarize(&students);
        let html = dashboard(&Page::new("Dashboard", Vec::new()), &students, &summary).unwrap();

        let attr = html
            .split("data-chart=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert!(attr.contains("Amina"));
        assert!(attr.contains("72.5"));
        assert!(SCRIPT.contains("dataset.chart"));
        assert!(SCRIPT.contains("DOMContentLoaded"));
    }

    #[test]
    fn error_page_shows_status_and_message() {
        let page = Page::new("Forbidden", Vec::new()).for_teacher("Ada");
        let html = error_page(&page, 403, "Not authorized to edit this student.").unwrap();
        assert!(html.contains("<h1>403</h1>"));
        assert!(html.contains("Not authorized to edit this student."));
        assert!(html.contains("Logout (Ada)"));
    }
}
