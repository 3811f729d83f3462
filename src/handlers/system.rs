use crate::features::{COLUMNS, FEATURE_SCHEMA_VERSION};
use crate::views::{SCRIPT, STYLESHEET};
use crate::AppState;
use actix_web::{web, HttpResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ModelInfo {
    classifier_loaded: bool,
    classifier: Option<String>,
    schema_version: u32,
    columns: &'static [&'static str],
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("Student tracker is running")
}

pub async fn model_info(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ModelInfo {
        classifier_loaded: state.predictor.has_classifier(),
        classifier: state.predictor.classifier_name().map(str::to_string),
        schema_version: FEATURE_SCHEMA_VERSION,
        columns: &COLUMNS,
    })
}

pub async fn stylesheet() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/css; charset=utf-8")
        .body(STYLESHEET)
}

pub async fn script() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(SCRIPT)
}
