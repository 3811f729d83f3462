//! HTTP routes. HTML pages answer errors with a rendered error page, JSON
//! routes with `AppError`'s JSON body.

mod admin;
mod students;
mod system;
mod teacher;

use crate::auth::{cookie_flash, session_token, Flash, FlashLevel, FLASH_COOKIE};
use crate::error::AppError;
use crate::views::{self, Page};
use crate::AppState;
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use thiserror::Error;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(teacher::home))
        .route("/signup", web::get().to(teacher::signup_form))
        .route("/signup", web::post().to(teacher::signup))
        .route("/login", web::get().to(teacher::login_form))
        .route("/login", web::post().to(teacher::login))
        .route("/logout", web::get().to(teacher::logout))
        .route("/dashboard", web::get().to(students::dashboard))
        .route("/students/add", web::post().to(students::add))
        .route("/students/export.csv", web::get().to(students::export_csv))
        .route("/students/predict-all", web::post().to(students::predict_all))
        .route("/students/{id}/edit", web::get().to(students::edit_form))
        .route("/students/{id}/edit", web::post().to(students::edit))
        .route("/students/{id}/delete", web::post().to(students::delete))
        .route("/students/{id}/predict", web::post().to(students::predict))
        .route("/api/stats", web::get().to(students::stats))
        .route("/admin", web::get().to(admin::login_form))
        .route("/admin", web::post().to(admin::login))
        .route("/admin/logout", web::get().to(admin::logout))
        .route("/admin/dashboard", web::get().to(admin::dashboard))
        .route("/admin/teachers/{id}", web::get().to(admin::teacher_students))
        .route("/health", web::get().to(system::health))
        .route("/model/info", web::get().to(system::model_info))
        .route("/static/app.css", web::get().to(system::stylesheet))
        .route("/static/app.js", web::get().to(system::script));
}

/// An `AppError` raised while serving an HTML page.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct HtmlError(#[from] AppError);

impl ResponseError for HtmlError {
    fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match &self.0 {
            AppError::NotFound => "The requested record does not exist.".to_string(),
            AppError::Forbidden => "You are not allowed to access this record.".to_string(),
            AppError::Unauthorized => "Please log in first.".to_string(),
            other if status.is_server_error() => {
                tracing::error!(error = %other, "page request failed");
                "Something went wrong.".to_string()
            }
            other => other.to_string(),
        };

        let page = Page::new(status.canonical_reason().unwrap_or("Error"), Vec::new());
        match views::error_page(&page, status.as_u16(), &message) {
            Ok(body) => HttpResponse::build(status)
                .content_type("text/html; charset=utf-8")
                .body(body),
            Err(err) => {
                tracing::error!(error = %err, "error page could not be rendered");
                HttpResponse::build(status).body(message)
            }
        }
    }
}

pub type PageResult = Result<HttpResponse, HtmlError>;

/// A rendered page. Clears the `flash` cookie once its message has been shown.
fn html(state: &AppState, req: &HttpRequest, body: String) -> HttpResponse {
    let mut response = HttpResponse::Ok();
    response.content_type("text/html; charset=utf-8");
    if req.cookie(FLASH_COOKIE).is_some() {
        response.cookie(state.sessions.flash_removal_cookie());
    }
    response.body(body)
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Queues a flash for the caller and redirects to `location`.
fn redirect_with_flash(
    state: &AppState,
    req: &HttpRequest,
    location: &str,
    level: FlashLevel,
    message: impl Into<String>,
) -> HttpResponse {
    let token = session_token(req);
    redirect_on_session(state, token.as_deref(), location, level, message)
}

/// Logged-in callers get the flash on their session; everyone else gets it
/// in the `flash` cookie so no server-side state is created for them.
fn redirect_on_session(
    state: &AppState,
    token: Option<&str>,
    location: &str,
    level: FlashLevel,
    message: impl Into<String>,
) -> HttpResponse {
    let flash = Flash::new(level, message);
    let mut response = HttpResponse::SeeOther();
    response.insert_header((header::LOCATION, location));
    match token {
        Some(token) if state.sessions.flash(token, flash.clone()) => {
            response.cookie(state.sessions.cookie(token));
        }
        _ => {
            response.cookie(state.sessions.flash_cookie(&flash));
        }
    }
    response.finish()
}

fn take_flashes(state: &AppState, req: &HttpRequest, token: Option<&str>) -> Vec<Flash> {
    let mut flashes: Vec<Flash> = cookie_flash(req).into_iter().collect();
    if let Some(token) = token {
        flashes.extend(state.sessions.take_flashes(token));
    }
    flashes
}
