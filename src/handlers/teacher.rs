use super::{html, redirect_on_session, redirect_with_flash, take_flashes, PageResult};
use crate::auth::{session_token, FlashLevel, Identity};
use crate::error::AppError;
use crate::forms::{normalize_email, LoginForm, SignupForm};
use crate::views::{self, Page};
use crate::AppState;
use actix_web::{web, HttpRequest, HttpResponse};

pub async fn home(state: web::Data<AppState>, req: HttpRequest) -> PageResult {
    let token = session_token(&req);
    let mut page = Page::new("Home", take_flashes(&state, &req, token.as_deref()));
    match token.as_deref().and_then(|t| state.sessions.identity(t)) {
        Some(Identity::Teacher { name, .. }) => page = page.for_teacher(&name),
        Some(Identity::Admin { username }) => page = page.for_admin(&username),
        None => {}
    }
    Ok(html(&state, &req, views::home(&page)?))
}

pub async fn signup_form(state: web::Data<AppState>, req: HttpRequest) -> PageResult {
    let token = session_token(&req);
    let page = Page::new("Sign up", take_flashes(&state, &req, token.as_deref()));
    Ok(html(&state, &req, views::signup(&page)?))
}

pub async fn signup(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<SignupForm>,
) -> PageResult {
    let form = form.into_inner();
    let name = form.name.trim();
    let email = normalize_email(&form.email);

    if name.is_empty() || email.is_empty() || form.password.is_empty() {
        return Ok(redirect_with_flash(
            &state,
            &req,
            "/signup",
            FlashLevel::Danger,
            "Name, email and password are required.",
        ));
    }

    let hash = state.hasher.hash(&form.password).await?;
    match state.db.create_teacher(name, &email, &hash).await {
        Ok(teacher) => {
            tracing::info!(teacher_id = teacher.id, "teacher registered");
            Ok(redirect_with_flash(
                &state,
                &req,
                "/login",
                FlashLevel::Success,
                "Account created. Please log in.",
            ))
        }
        Err(AppError::Conflict(message)) => Ok(redirect_with_flash(
            &state,
            &req,
            "/signup",
            FlashLevel::Danger,
            message,
        )),
        Err(err) => Err(err.into()),
    }
}

pub async fn login_form(state: web::Data<AppState>, req: HttpRequest) -> PageResult {
    let token = session_token(&req);
    let page = Page::new("Login", take_flashes(&state, &req, token.as_deref()));
    Ok(html(&state, &req, views::login(&page)?))
}

pub async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    form: web::Form<LoginForm>,
) -> PageResult {
    let email = normalize_email(&form.email);
    let teacher = state.db.find_teacher_by_email(&email).await?;

    let verified = match &teacher {
        Some(t) => state.hasher.verify(&form.password, &t.password_hash).await,
        None => false,
    };
    let teacher = match teacher {
        Some(t) if verified => t,
        _ => {
            tracing::warn!("teacher login failed");
            return Ok(redirect_with_flash(
                &state,
                &req,
                "/login",
                FlashLevel::Danger,
                "Invalid email or password.",
            ));
        }
    };

    let previous = session_token(&req);
    let token = state.sessions.login(
        previous.as_deref(),
        Identity::Teacher {
            id: teacher.id,
            name: teacher.name.clone(),
        },
    );
    tracing::info!(teacher_id = teacher.id, "teacher logged in");
    Ok(redirect_on_session(
        &state,
        Some(&token),
        "/dashboard",
        FlashLevel::Success,
        format!("Welcome, {}!", teacher.name),
    ))
}

pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    end_session(&state, &req)
}

/// Destroys whatever session the caller has and clears its cookie.
pub(super) fn end_session(state: &AppState, req: &HttpRequest) -> HttpResponse {
    if let Some(token) = session_token(req) {
        state.sessions.logout(&token);
    }
    let mut response =
        redirect_on_session(state, None, "/", FlashLevel::Info, "You have been logged out.");
    if let Err(err) = response.add_cookie(&state.sessions.removal_cookie()) {
        tracing::warn!(error = %err, "could not clear the session cookie");
    }
    response
}
