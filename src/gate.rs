use std::fmt;

use actix_web::{
    dev::Payload,
    http::{header, StatusCode},
    web, FromRequest, HttpRequest, HttpResponse, ResponseError,
};
use futures::future::LocalBoxFuture;

use crate::auth::{bearer_token, AuthState};
use crate::routes::AppState;

pub const DEMO_FLAG_COOKIE: &str = "testUser";
pub const DEMO_SESSION_COOKIE: &str = "demoSession";
pub const LOGIN_PATH: &str = "/login";
pub const DEMO_LOGIN_PATH: &str = "/login/demo";

/// Who may see the protected views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Authenticated {
        user_id: String,
        token: String,
        expires_at: i64,
    },
    Demo { session: String },
}

impl Access {
    pub fn session_key(&self) -> String {
        match self {
            Access::Authenticated { token, .. } => user_session_key(token),
            Access::Demo { session } => demo_session_key(session),
        }
    }

    /// Unix timestamp after which the access no longer holds, if it has one.
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Access::Authenticated { expires_at, .. } => Some(*expires_at),
            Access::Demo { .. } => None,
        }
    }
}

pub fn user_session_key(token: &str) -> String {
    format!("user:{token}")
}

pub fn demo_session_key(session: &str) -> String {
    format!("demo:{session}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Loading,
    Permit(Access),
    /// Demo flag without a session of its own; one has to be started first.
    StartDemo,
    RedirectToLogin,
}

/// Decides access once the auth check has resolved. Nothing is decided while
/// it is still pending.
pub fn decide(auth: AuthState, demo_flag: bool, demo_session: Option<String>) -> GateDecision {
    match auth {
        AuthState::Pending => GateDecision::Loading,
        _ if demo_flag => match demo_session {
            Some(session) if !session.is_empty() => GateDecision::Permit(Access::Demo { session }),
            _ => GateDecision::StartDemo,
        },
        AuthState::SignedIn(session) => GateDecision::Permit(Access::Authenticated {
            user_id: session.user_id,
            token: session.token,
            expires_at: session.expires_at,
        }),
        AuthState::SignedOut => GateDecision::RedirectToLogin,
    }
}

pub fn demo_flag(request: &HttpRequest) -> bool {
    request
        .cookie(DEMO_FLAG_COOKIE)
        .map_or(false, |cookie| cookie.value() == "true")
}

pub fn demo_session(request: &HttpRequest) -> Option<String> {
    request
        .cookie(DEMO_SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

#[derive(Debug, PartialEq)]
pub enum Rejection {
    Loading,
    StartDemo,
    RedirectToLogin,
    Misconfigured,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Loading => write!(f, "Loading..."),
            Rejection::StartDemo => write!(f, "redirecting to {DEMO_LOGIN_PATH}"),
            Rejection::RedirectToLogin => write!(f, "redirecting to {LOGIN_PATH}"),
            Rejection::Misconfigured => write!(f, "application state missing"),
        }
    }
}

impl ResponseError for Rejection {
    fn status_code(&self) -> StatusCode {
        match self {
            Rejection::Loading => StatusCode::SERVICE_UNAVAILABLE,
            Rejection::StartDemo | Rejection::RedirectToLogin => StatusCode::SEE_OTHER,
            Rejection::Misconfigured => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Rejection::Loading => HttpResponse::ServiceUnavailable()
                .insert_header((header::RETRY_AFTER, "1"))
                .body(self.to_string()),
            Rejection::StartDemo => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, DEMO_LOGIN_PATH))
                .finish(),
            Rejection::RedirectToLogin => HttpResponse::SeeOther()
                .insert_header((header::LOCATION, LOGIN_PATH))
                .finish(),
            Rejection::Misconfigured => HttpResponse::InternalServerError().body(self.to_string()),
        }
    }
}

impl FromRequest for Access {
    type Error = Rejection;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let state = request.app_data::<web::Data<AppState>>().cloned();
        let token = bearer_token(request).map(str::to_owned);
        let flag = demo_flag(request);
        let session = demo_session(request);

        Box::pin(async move {
            let state = state.ok_or(Rejection::Misconfigured)?;
            let auth = state.auth.current_session(token.as_deref()).await;
            match decide(auth, flag, session) {
                GateDecision::Permit(access) => Ok(access),
                GateDecision::Loading => Err(Rejection::Loading),
                GateDecision::StartDemo => Err(Rejection::StartDemo),
                GateDecision::RedirectToLogin => Err(Rejection::RedirectToLogin),
            }
        })
    }
}
