use super::teacher::end_session;
use super::{html, redirect_on_session, redirect_with_flash, see_other, take_flashes, PageResult};
use crate::auth::{session_token, AdminSession, FlashLevel, Identity};
use crate::error::AppError;
use crate::forms::AdminLoginForm;
use crate::views::{self, Page};
use crate::AppState;
use actix_web::{web, HttpRequest, HttpResponse};

pub async fn login_form(state: web::Data<AppState>, req: HttpRequest) -> PageResult {
    let token = session_token(&req);
    if let Some(Identity::Admin { .. }) = token.as_deref().and_then(|t| state.sessions.identity(t)) {
        return Ok(see_other("/admin/dashboard"));
    }
    let page = Page::new("Admin login", take_flashes(&state, &req, token.as_deref()));
    Ok(html(&state, &req, views::admin_login(&page)?))
}

pub async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<AdminLoginForm>,
) -> PageResult {
    let username = form.username.trim();
    let admin = state.db.find_admin_by_username(username).await?;
    let verified = match &admin {
        Some(a) => state.hasher.verify(&form.password, &a.password_hash).await,
        None => false,
    };

    let admin = match admin {
        Some(a) if verified => a,
        _ => {
            tracing::warn!("admin login failed");
            return Ok(redirect_with_flash(
                &state,
                &req,
                "/admin",
                FlashLevel::Danger,
                "Invalid admin credentials.",
            ));
        }
    };

    let previous = session_token(&req);
    let token = state.sessions.login(
        previous.as_deref(),
        Identity::Admin {
            username: admin.username.clone(),
        },
    );
    tracing::info!(admin = %admin.username, "admin logged in");
    Ok(redirect_on_session(
        &state,
        Some(&token),
        "/admin/dashboard",
        FlashLevel::Success,
        "Logged in as admin.",
    ))
}

pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    end_session(&state, &req)
}

pub async fn dashboard(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: AdminSession,
) -> PageResult {
    let teachers = state.db.list_teachers().await?;
    let page = Page::new("Admin", take_flashes(&state, &req, Some(&session.token)))
        .for_admin(&session.username);
    Ok(html(&state, &req, views::admin_dashboard(&page, &teachers)?))
}

pub async fn teacher_students(
    state: web::Data<AppState>,
    req: HttpRequest,
    session: AdminSession,
    path: web::Path<i64>,
) -> PageResult {
    let teacher_id = path.into_inner();
    let teacher = state
        .db
        .get_teacher(teacher_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let students = state.db.students_for_teacher(teacher_id).await?;

    let page = Page::new(
        format!("Students of {}", teacher.name),
        take_flashes(&state, &req, Some(&session.token)),
    )
    .for_admin(&session.username);
    Ok(html(&state, &req, views::admin_students(&page, &teacher, &students)?))
}
