use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, CookieJar};

use cirrus_core::auth::{NewCredentials, PasswordRotation, SignupRequest};
use cirrus_types::api::{
    ApiResponse, LoginInitRequest, LoginInitResponse, LoginRequest, LoginResponse,
    PasswordUpdateRequest, RegisterRequest, ResendVerificationRequest, SessionCheckResponse,
    VerifyEmailRequest, VerifyPasswordResponse,
};

use crate::AppState;
use crate::error::ApiError;
use crate::middleware::{SESSION_COOKIE, client_ip, user_agent};

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_http_only(true);
    cookie.set_secure(secure);
    cookie.set_path("/");
    cookie
}

fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

fn token_from(jar: &CookieJar) -> String {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default()
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, &addr);
    state
        .auth
        .signup(SignupRequest {
            name: req.name,
            surname: req.surname,
            username: req.username,
            email: req.email,
            signup_ip: Some(ip),
            credentials: NewCredentials {
                password_salt: req.password_salt,
                auth_salt: req.auth_salt,
                enc_salt: req.enc_salt,
                master_key_salt: req.master_key_salt,
                auth_hash: req.auth_hash,
                wrapped_master_key: req.wrapped_master_key,
                master_key_iv: req.master_key_iv,
                public_key: req.public_key,
                wrapped_private_key: req.wrapped_private_key,
                private_key_iv: req.private_key_iv,
                private_key_salt: req.private_key_salt,
            },
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::<()>::ok_message(
            "Registration successful. Check your email to verify the account.",
        )),
    ))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.auth.verify_email_for(&req.email, &req.code)?;
    Ok(Json(ApiResponse::ok_message("Email verified")))
}

/// Target of the emailed verification link.
pub async fn confirm(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<&'static str, ApiError> {
    state.auth.verify_email(&code)?;
    Ok("Email verified. You can close this tab and log in.")
}

pub async fn resend(
    State(state): State<AppState>,
    Json(req): Json<ResendVerificationRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.auth.resend_verification(&req.email).await?;
    Ok(Json(ApiResponse::ok_message("Verification email sent")))
}

pub async fn init(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginInitRequest>,
) -> Result<Json<ApiResponse<LoginInitResponse>>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let init = state.auth.initialize_login(&req.email, &ip)?;
    Ok(Json(ApiResponse::ok(LoginInitResponse {
        password_salt: init.password_salt,
        auth_salt: init.auth_salt,
    })))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, &addr);
    let success = state
        .auth
        .authenticate(&req.email, &req.auth_hash, &ip, user_agent(&headers))?;

    let material = success.material;
    let jar = jar.add(session_cookie(success.session_token, state.cookie_secure));

    Ok((
        jar,
        Json(ApiResponse::ok(LoginResponse {
            wrapped_master_key: material.wrapped_master_key,
            master_key_iv: material.master_key_iv,
            master_key_salt: material.master_key_salt,
            enc_salt: material.enc_salt,
            wrapped_private_key: material.wrapped_private_key,
            private_key_iv: material.private_key_iv,
            private_key_salt: material.private_key_salt,
        })),
    ))
}

pub async fn verify_session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SessionCheckResponse>, ApiError> {
    let valid = state.auth.verify_session(&token_from(&jar))?;
    Ok(Json(SessionCheckResponse { valid }))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.logout(&token_from(&jar))?;
    let jar = jar.remove(removal_cookie());
    Ok((jar, Json(ApiResponse::<()>::ok_message("Logged out"))))
}

pub async fn verify_password(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<VerifyPasswordResponse>>, ApiError> {
    let ip = client_ip(&headers, &addr);
    let material = state
        .auth
        .verify_password(&req.email, &req.auth_hash, &ip)?;
    Ok(Json(ApiResponse::ok(VerifyPasswordResponse {
        wrapped_master_key: material.wrapped_master_key,
        master_key_iv: material.master_key_iv,
        master_key_salt: material.master_key_salt,
        enc_salt: material.enc_salt,
    })))
}

pub async fn update_password(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<PasswordUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers, &addr);
    state.auth.update_password(
        PasswordRotation {
            email: req.email,
            current_auth_hash: req.current_auth_hash,
            password_salt: req.password_salt,
            auth_salt: req.auth_salt,
            enc_salt: req.enc_salt,
            master_key_salt: req.master_key_salt,
            auth_hash: req.auth_hash,
            wrapped_master_key: req.wrapped_master_key,
            master_key_iv: req.master_key_iv,
        },
        &token_from(&jar),
        &ip,
    )?;

    // The presenting session is gone; drop its cookie too.
    let jar = jar.remove(removal_cookie());
    Ok((
        jar,
        Json(ApiResponse::<()>::ok_message(
            "Password updated. Please log in again.",
        )),
    ))
}
