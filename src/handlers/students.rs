use super::{html, redirect_on_session, take_flashes, PageResult};
use crate::analytics::DashboardAnalyzer;
use crate::auth::{FlashLevel, TeacherApi, TeacherSession};
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::forms::StudentForm;
use crate::model::{Label, Student};
use crate::prediction::Prediction;
use crate::views::{self, Page};
use crate::AppState;
use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct PredictResponse {
    id: i64,
    prediction: Label,
    probability: f64,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    id: i64,
    name: String,
    prediction: Label,
    /// Percent, one decimal.
    probability: f64,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    total: usize,
    results: Vec<BatchItem>,
}

fn page_for(state: &AppState, req: &HttpRequest, session: &TeacherSession, title: &str) -> Page {
    Page::new(title, take_flashes(state, req, Some(&session.token))).for_teacher(&session.name)
}

pub async fn dashboard(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: TeacherSession,
) -> PageResult {
    let students = state.db.students_for_teacher(session.teacher_id).await?;
    let summary = DashboardAnalyzer::new().summarize(&students);
    let page = page_for(&state, &req, &session, "Dashboard");
    Ok(html(&state, &req, views::dashboard(&page, &students, &summary)?))
}

pub async fn add(
    state: web::Data<AppState>,
    session: TeacherSession,
    form: web::Form<StudentForm>,
) -> PageResult {
    let new_student = match form.into_inner().into_new_student() {
        Ok(student) => student,
        Err(err) => {
            return Ok(redirect_on_session(
                &state,
                Some(&session.token),
                "/dashboard",
                FlashLevel::Danger,
                err.message,
            ))
        }
    };

    let student = state
        .db
        .insert_student(session.teacher_id, &new_student)
        .await?;
    tracing::info!(
        student_id = student.id,
        teacher_id = session.teacher_id,
        "student added"
    );
    Ok(redirect_on_session(
        &state,
        Some(&session.token),
        "/dashboard",
        FlashLevel::Success,
        format!("Student {} added.", student.name),
    ))
}

pub async fn edit_form(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: TeacherSession,
    path: web::Path<i64>,
) -> PageResult {
    let student = state
        .db
        .student_for_teacher(path.into_inner(), session.teacher_id)
        .await?;
    let page = page_for(&state, &req, &session, "Edit student");
    Ok(html(&state, &req, views::edit_student(&page, &student)?))
}

pub async fn edit(
    state: web::Data<AppState>,
    session: TeacherSession,
    path: web::Path<i64>,
    form: web::Form<StudentForm>,
) -> PageResult {
    let id = path.into_inner();
    let mut student = state.db.student_for_teacher(id, session.teacher_id).await?;

    let patch = match form.into_inner().into_patch() {
        Ok(patch) => patch,
        Err(err) => {
            return Ok(redirect_on_session(
                &state,
                Some(&session.token),
                &format!("/students/{id}/edit"),
                FlashLevel::Danger,
                err.message,
            ))
        }
    };

    if let Some(name) = patch.name {
        student.name = name;
    }
    student.features.apply(&patch.features);
    state.db.update_student(&student).await?;

    tracing::info!(student_id = id, teacher_id = session.teacher_id, "student updated");
    Ok(redirect_on_session(
        &state,
        Some(&session.token),
        "/dashboard",
        FlashLevel::Success,
        format!("Student {} updated.", student.name),
    ))
}

pub async fn delete(
    state: web::Data<AppState>,
    session: TeacherSession,
    path: web::Path<i64>,
) -> PageResult {
    let id = path.into_inner();
    let student = state.db.student_for_teacher(id, session.teacher_id).await?;
    state.db.delete_student(id, session.teacher_id).await?;

    tracing::info!(student_id = id, teacher_id = session.teacher_id, "student deleted");
    Ok(redirect_on_session(
        &state,
        Some(&session.token),
        "/dashboard",
        FlashLevel::Info,
        format!("Student {} deleted.", student.name),
    ))
}

pub async fn export_csv(state: web::Data<AppState>, session: TeacherSession) -> PageResult {
    let students = state.db.students_for_teacher(session.teacher_id).await?;
    let body = students_csv(&students)?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"students.csv\"",
        ))
        .body(body))
}

const CSV_HEADER: [&str; 14] = [
    "id",
    "name",
    "age",
    "gender",
    "previous_marks",
    "attendance_percent",
    "study_hours_per_week",
    "parental_education",
    "family_income",
    "internet_access",
    "extra_classes",
    "assignment_score",
    "prediction",
    "probability",
];

fn students_csv(students: &[Student]) -> AppResult<Vec<u8>> {
    fn cell<T: ToString>(value: &Option<T>) -> String {
        value.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for s in students {
        let f = &s.features;
        writer.write_record([
            s.id.to_string(),
            s.name.clone(),
            cell(&f.age),
            cell(&f.gender),
            cell(&f.previous_marks),
            cell(&f.attendance_percent),
            cell(&f.study_hours_per_week),
            cell(&f.parental_education),
            cell(&f.family_income),
            cell(&f.internet_access),
            cell(&f.extra_classes),
            cell(&f.assignment_score),
            cell(&s.outcome.map(|o| o.prediction)),
            cell(&s.outcome.map(|o| o.probability)),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|err| AppError::Csv(err.into_error().into()))
}

pub async fn predict(
    state: web::Data<AppState>,
    TeacherApi(session): TeacherApi,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = path.into_inner();
    let student = state.db.student_for_teacher(id, session.teacher_id).await?;

    let prediction = state.predictor.predict(&student.features);
    state
        .db
        .save_outcome(id, session.teacher_id, prediction.outcome())
        .await?;

    tracing::info!(
        student_id = id,
        label = %prediction.label,
        probability = prediction.probability,
        source = ?prediction.source,
        "prediction stored"
    );
    Ok(HttpResponse::Ok().json(PredictResponse {
        id,
        prediction: prediction.label,
        probability: prediction.probability,
    }))
}

pub async fn predict_all(
    state: web::Data<AppState>,
    TeacherApi(session): TeacherApi,
) -> AppResult<HttpResponse> {
    let students = state.db.students_for_teacher(session.teacher_id).await?;
    let predictor = state.predictor.clone();
    let (students, predictions) = tokio::task::spawn_blocking(move || {
        let predictions = predictor.predict_all(&students);
        (students, predictions)
    })
    .await?;

    let results = store_batch(&state.db, session.teacher_id, students, predictions).await?;

    tracing::info!(
        teacher_id = session.teacher_id,
        total = results.len(),
        "batch prediction stored"
    );
    Ok(HttpResponse::Ok().json(BatchResponse {
        total: results.len(),
        results,
    }))
}

/// Saves each outcome. A student deleted while the batch ran is skipped, so
/// the result lists only what was stored.
async fn store_batch(
    db: &Database,
    teacher_id: i64,
    students: Vec<Student>,
    predictions: Vec<(i64, Prediction)>,
) -> AppResult<Vec<BatchItem>> {
    let mut results = Vec::with_capacity(students.len());
    for (student, (id, prediction)) in students.into_iter().zip(predictions) {
        match db.save_outcome(id, teacher_id, prediction.outcome()).await {
            Ok(()) => {}
            Err(AppError::NotFound) => {
                tracing::warn!(student_id = id, teacher_id, "student vanished during batch prediction");
                continue;
            }
            Err(err) => return Err(err),
        }
        results.push(BatchItem {
            id,
            name: student.name,
            prediction: prediction.label,
            probability: (prediction.probability * 1000.0).round() / 10.0,
        });
    }
    Ok(results)
}

pub async fn stats(
    state: web::Data<AppState>,
    TeacherApi(session): TeacherApi,
) -> AppResult<HttpResponse> {
    let stats = state.db.prediction_stats(session.teacher_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}
