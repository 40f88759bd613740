use std::sync::Arc;

use actix_web::{
    cookie::Cookie,
    delete, get,
    http::header::{self, ContentType},
    patch, post, route, web, HttpRequest, HttpResponse,
};
use bson::oid::ObjectId;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::auth::{bearer_token, AuthProvider};
use crate::error::ApiError;
use crate::gate::{
    demo_flag, demo_session, demo_session_key, user_session_key, Access, DEMO_FLAG_COOKIE,
    DEMO_LOGIN_PATH, DEMO_SESSION_COOKIE, LOGIN_PATH,
};
use crate::memory_source::{MemoryDataSource, DEMO_OWNER};
use crate::presentation::{
    balance_views, expense_rows, DashboardView, Notice, SplitterView, SummaryView, WriteResult,
    LOGIN_PAGE,
};
use crate::schemas::{Category, Expense, ExpensePatch, NewExpense, SplitExpense};
use crate::session::{Session, Sessions};
use crate::store::{DataSource, ExpenseStore};

pub struct AppState {
    pub auth: Arc<dyn AuthProvider>,
    pub remote: Arc<dyn DataSource>,
    pub categories: Vec<Category>,
    pub sessions: Sessions,
}

impl AppState {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        remote: Arc<dyn DataSource>,
        categories: Vec<Category>,
        sessions: Sessions,
    ) -> Self {
        Self {
            auth,
            remote,
            categories,
            sessions,
        }
    }

    /// The caller's session. Its data source is picked here, once, from the
    /// kind of access that started it.
    async fn session(&self, access: &Access) -> Arc<Mutex<Session>> {
        self.sessions
            .open(access.session_key(), access.expires_at(), || {
                let (source, owner): (Arc<dyn DataSource>, String) = match access {
                    Access::Authenticated { user_id, .. } => (self.remote.clone(), user_id.clone()),
                    Access::Demo { .. } => (Arc::new(MemoryDataSource::demo()), DEMO_OWNER.to_owned()),
                };
                Session::new(ExpenseStore::new(source, owner, self.categories.clone()))
            })
            .await
    }
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "").path("/").finish();
    cookie.make_removal();
    cookie
}

#[get("/login")]
async fn login_page() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(LOGIN_PAGE)
}

#[route("/login/demo", method = "GET", method = "POST")]
async fn start_demo() -> HttpResponse {
    let session = ObjectId::new().to_hex();
    tracing::info!(%session, "demo session requested");
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, "/"))
        .cookie(Cookie::build(DEMO_FLAG_COOKIE, "true").path("/").finish())
        .cookie(
            Cookie::build(DEMO_SESSION_COOKIE, session)
                .path("/")
                .http_only(true)
                .finish(),
        )
        .finish()
}

#[post("/logout")]
async fn logout(state: web::Data<AppState>, request: HttpRequest) -> HttpResponse {
    if let Some(token) = bearer_token(&request) {
        if state.auth.sign_out(token).await {
            state.sessions.close(&user_session_key(token)).await;
        }
    }
    if let (true, Some(session)) = (demo_flag(&request), demo_session(&request)) {
        state.sessions.close(&demo_session_key(&session)).await;
    }
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, LOGIN_PATH))
        .cookie(removal_cookie(DEMO_FLAG_COOKIE))
        .cookie(removal_cookie(DEMO_SESSION_COOKIE))
        .finish()
}

#[get("/")]
async fn dashboard(state: web::Data<AppState>, access: Access) -> Result<HttpResponse, ApiError> {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    session
        .store
        .list()
        .await
        .map_err(ApiError::failed("Error loading expenses"))?;

    let expenses = session.store.expenses();
    let categories = session.store.categories();
    Ok(HttpResponse::Ok().json(DashboardView {
        summary: SummaryView::of(expenses, categories),
        categories: categories.to_vec(),
        expenses: expense_rows(expenses),
        splitter: SplitterView::of(&session.ledger),
    }))
}

#[get("/categories")]
async fn list_categories(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(&state.categories)
}

#[get("/expenses")]
async fn list_expenses(state: web::Data<AppState>, access: Access) -> Result<HttpResponse, ApiError> {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    let expenses = session
        .store
        .list()
        .await
        .map_err(ApiError::failed("Error loading expenses"))?;
    Ok(HttpResponse::Ok().json(expense_rows(expenses)))
}

#[post("/expenses")]
async fn add_expense(
    state: web::Data<AppState>,
    access: Access,
    expense: web::Json<NewExpense>,
) -> Result<HttpResponse, ApiError> {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    let added = session
        .store
        .add(expense.into_inner())
        .await
        .map_err(ApiError::failed("Error adding expense"))?;
    Ok(HttpResponse::Created().json(WriteResult {
        record: Some(added),
        expenses: expense_rows(session.store.expenses()),
        notice: Notice::success("Expense added successfully"),
    }))
}

#[patch("/expenses/{id}")]
async fn edit_expense(
    state: web::Data<AppState>,
    access: Access,
    id: web::Path<String>,
    patch: web::Json<ExpensePatch>,
) -> Result<HttpResponse, ApiError> {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    session
        .store
        .update(&id, patch.into_inner())
        .await
        .map_err(ApiError::failed("Error updating expense"))?;
    Ok(HttpResponse::Ok().json(WriteResult::<Expense> {
        record: None,
        expenses: expense_rows(session.store.expenses()),
        notice: Notice::success("Expense updated successfully"),
    }))
}

#[delete("/expenses/{id}")]
async fn delete_expense(
    state: web::Data<AppState>,
    access: Access,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    session
        .store
        .remove(&id)
        .await
        .map_err(ApiError::failed("Error deleting expense"))?;
    Ok(HttpResponse::Ok().json(WriteResult::<Expense> {
        record: None,
        expenses: expense_rows(session.store.expenses()),
        notice: Notice::success("Expense deleted successfully"),
    }))
}

#[get("/summary")]
async fn get_summary(state: web::Data<AppState>, access: Access) -> Result<HttpResponse, ApiError> {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    session
        .store
        .list()
        .await
        .map_err(ApiError::failed("Error loading expenses"))?;
    Ok(HttpResponse::Ok().json(SummaryView::of(
        session.store.expenses(),
        session.store.categories(),
    )))
}

#[get("/splitter")]
async fn get_splitter(state: web::Data<AppState>, access: Access) -> HttpResponse {
    let session = state.session(&access).await;
    let session = session.lock().await;
    HttpResponse::Ok().json(SplitterView::of(&session.ledger))
}

#[derive(Deserialize)]
struct ParticipantJson {
    #[serde(default)]
    name: String,
}

#[post("/splitter/participants")]
async fn add_participant(
    state: web::Data<AppState>,
    access: Access,
    json: web::Json<ParticipantJson>,
) -> HttpResponse {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    session.ledger.add_participant(&json.name);
    HttpResponse::Ok().json(SplitterView::of(&session.ledger))
}

#[post("/splitter/expenses")]
async fn add_split_expense(
    state: web::Data<AppState>,
    access: Access,
    expense: web::Json<SplitExpense>,
) -> HttpResponse {
    let session = state.session(&access).await;
    let mut session = session.lock().await;
    session.ledger.add_split_expense(expense.into_inner());
    HttpResponse::Ok().json(SplitterView::of(&session.ledger))
}

#[get("/splitter/balances")]
async fn get_balances(state: web::Data<AppState>, access: Access) -> HttpResponse {
    let session = state.session(&access).await;
    let session = session.lock().await;
    HttpResponse::Ok().json(balance_views(&session.ledger.compute_balances()))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(login_page)
        .service(start_demo)
        .service(logout)
        .service(dashboard)
        .service(list_categories)
        .service(list_expenses)
        .service(add_expense)
        .service(edit_expense)
        .service(delete_expense)
        .service(get_summary)
        .service(get_splitter)
        .service(add_participant)
        .service(add_split_expense)
        .service(get_balances);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuth;
    use crate::schemas::default_categories;
    use crate::store::tests::FailingSource;
    use actix_web::{
        body::MessageBody,
        dev::ServiceResponse,
        http::StatusCode,
        test, App,
    };
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};

    const SECRET: &str = "test-secret";

    macro_rules! call {
        ($app:expr, $request:expr) => {
            test::call_service(&$app, $request.to_request()).await
        };
    }

    fn state() -> web::Data<AppState> {
        state_with(Arc::new(MemoryDataSource::default()))
    }

    fn state_with(remote: Arc<dyn DataSource>) -> web::Data<AppState> {
        web::Data::new(AppState::new(
            Arc::new(TokenAuth::new(SECRET)),
            remote,
            default_categories(),
            Sessions::default(),
        ))
    }

    fn token_for(user_id: &str) -> String {
        TokenAuth::new(SECRET).issue(user_id, Utc::now() + Duration::hours(1))
    }

    fn bearer(token: &str) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {token}"))
    }

    fn demo(request: test::TestRequest) -> test::TestRequest {
        request
            .cookie(Cookie::new(DEMO_FLAG_COOKIE, "true"))
            .cookie(Cookie::new(DEMO_SESSION_COOKIE, "s1"))
    }

    async fn body<B: MessageBody>(response: ServiceResponse<B>) -> Value {
        test::read_body_json(response).await
    }

    #[actix_web::test]
    async fn anonymous_visitors_are_redirected_to_login() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        for path in ["/", "/expenses", "/splitter"] {
            let response = call!(app, test::TestRequest::get().uri(path));
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(response.headers().get(header::LOCATION).unwrap(), LOGIN_PATH);
        }

        let login = call!(app, test::TestRequest::get().uri(LOGIN_PATH));
        assert_eq!(login.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn demo_login_sets_the_flag() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let response = call!(app, test::TestRequest::post().uri("/login/demo"));

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let flag = response
            .response()
            .cookies()
            .find(|cookie| cookie.name() == DEMO_FLAG_COOKIE)
            .unwrap();
        assert_eq!(flag.value(), "true");
    }

    #[actix_web::test]
    async fn demo_dashboard_shows_sample_data() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let response = call!(app, demo(test::TestRequest::get().uri("/")));
        assert_eq!(response.status(), StatusCode::OK);

        let view = body(response).await;
        assert_eq!(view["summary"]["total"], 100.0);
        assert_eq!(view["summary"]["displayTotal"], "€100.00");
        assert_eq!(view["summary"]["chart"]["labels"][1], "Shopping");
        assert_eq!(view["summary"]["chart"]["datasets"][0]["data"][1], 50.0);
        assert_eq!(view["expenses"].as_array().unwrap().len(), 3);
        assert_eq!(view["categories"].as_array().unwrap().len(), 5);
    }

    #[actix_web::test]
    async fn signed_in_users_manage_their_expenses() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let token = token_for("uid-1");

        let created = call!(
            app,
            test::TestRequest::post()
                .uri("/expenses")
                .insert_header(bearer(&token))
                .set_json(json!({
                    "date": "2024-02-10",
                    "category": "Bills and Utilities",
                    "amount": "80.25",
                    "note": "Electricity",
                }))
        );
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = body(created).await;
        assert_eq!(created["record"]["amount"], 80.25);
        assert_eq!(created["record"]["ownerId"], "uid-1");
        assert_eq!(created["notice"]["message"], "Expense added successfully");
        let id = created["record"]["id"].as_str().unwrap().to_owned();

        let edited = call!(
            app,
            test::TestRequest::patch()
                .uri(&format!("/expenses/{id}"))
                .insert_header(bearer(&token))
                .set_json(json!({ "amount": 82.0 }))
        );
        assert_eq!(edited.status(), StatusCode::OK);
        assert_eq!(body(edited).await["expenses"][0]["amount"], 82.0);

        let summary = call!(
            app,
            test::TestRequest::get()
                .uri("/summary")
                .insert_header(bearer(&token))
        );
        assert_eq!(body(summary).await["total"], 82.0);

        let deleted = call!(
            app,
            test::TestRequest::delete()
                .uri(&format!("/expenses/{id}"))
                .insert_header(bearer(&token))
        );
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(body(deleted).await["expenses"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn users_do_not_see_each_others_expenses() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let created = call!(
            app,
            test::TestRequest::post()
                .uri("/expenses")
                .insert_header(bearer(&token_for("uid-1")))
                .set_json(json!({"date": "2024-02-10", "category": "Shopping", "amount": 5}))
        );
        assert_eq!(created.status(), StatusCode::CREATED);

        let listing = call!(
            app,
            test::TestRequest::get()
                .uri("/expenses")
                .insert_header(bearer(&token_for("uid-2")))
        );
        assert!(body(listing).await.as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn failures_carry_an_error_notice() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        let missing = call!(app, demo(test::TestRequest::delete().uri("/expenses/unknown")));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let missing = body(missing).await;
        assert_eq!(missing["notice"]["kind"], "error");
        assert_eq!(missing["notice"]["message"], "Error deleting expense");

        let invalid = call!(
            app,
            demo(test::TestRequest::post().uri("/expenses")).set_json(json!({
                "date": "2024-02-10",
                "category": "Rent",
                "amount": 900,
            }))
        );
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert!(body(invalid).await["notice"].is_null());
    }

    #[actix_web::test]
    async fn splitter_computes_balances_per_session() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;

        for name in ["A", "B", "A", ""] {
            let response = call!(
                app,
                demo(test::TestRequest::post().uri("/splitter/participants"))
                    .set_json(json!({ "name": name }))
            );
            assert_eq!(response.status(), StatusCode::OK);
        }
        let ignored = call!(
            app,
            demo(test::TestRequest::post().uri("/splitter/expenses")).set_json(json!({
                "description": "Nothing",
                "amount": 10,
                "paidBy": "A",
                "splitBetween": [],
            }))
        );
        assert_eq!(ignored.status(), StatusCode::OK);
        let ignored = body(ignored).await;
        assert_eq!(ignored["participants"], json!(["A", "B"]));
        assert!(ignored["expenses"].as_array().unwrap().is_empty());

        let dinner = call!(
            app,
            demo(test::TestRequest::post().uri("/splitter/expenses")).set_json(json!({
                "description": "Dinner",
                "amount": 100,
                "paidBy": "A",
                "splitBetween": ["A", "B"],
            }))
        );
        assert_eq!(dinner.status(), StatusCode::OK);

        let balances = call!(app, demo(test::TestRequest::get().uri("/splitter/balances")));
        assert_eq!(
            body(balances).await,
            json!([
                {"name": "A", "balance": 50.0, "status": "to_receive", "display": "A: €50.00 (to receive)"},
                {"name": "B", "balance": -50.0, "status": "to_pay", "display": "B: €-50.00 (to pay)"},
            ])
        );

        // Another demo session starts with an empty ledger.
        let other = call!(
            app,
            test::TestRequest::get()
                .uri("/splitter")
                .cookie(Cookie::new(DEMO_FLAG_COOKIE, "true"))
                .cookie(Cookie::new(DEMO_SESSION_COOKIE, "s2"))
        );
        assert!(body(other).await["participants"].as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn logout_ends_the_session() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let token = token_for("uid-1");

        let before = call!(app, test::TestRequest::get().uri("/").insert_header(bearer(&token)));
        assert_eq!(before.status(), StatusCode::OK);

        let response = call!(
            app,
            test::TestRequest::post()
                .uri("/logout")
                .insert_header(bearer(&token))
        );
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), LOGIN_PATH);

        let after = call!(app, test::TestRequest::get().uri("/").insert_header(bearer(&token)));
        assert_eq!(after.status(), StatusCode::SEE_OTHER);
    }

    #[actix_web::test]
    async fn demo_flag_without_a_session_starts_a_demo() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let response = call!(
            app,
            test::TestRequest::get()
                .uri("/splitter")
                .cookie(Cookie::new(DEMO_FLAG_COOKIE, "true"))
        );
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), DEMO_LOGIN_PATH);

        let started = call!(app, test::TestRequest::get().uri(DEMO_LOGIN_PATH));
        assert_eq!(started.status(), StatusCode::SEE_OTHER);
        assert!(started
            .response()
            .cookies()
            .any(|cookie| cookie.name() == DEMO_SESSION_COOKIE && !cookie.value().is_empty()));
    }

    #[actix_web::test]
    async fn logout_with_a_foreign_token_revokes_nothing() {
        let app = test::init_service(App::new().app_data(state()).configure(configure)).await;
        let token = token_for("uid-1");
        let forged = TokenAuth::new("another secret").issue("uid-1", Utc::now() + Duration::hours(1));

        let response = call!(
            app,
            test::TestRequest::post()
                .uri("/logout")
                .insert_header(bearer(&forged))
        );
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let after = call!(app, test::TestRequest::get().uri("/").insert_header(bearer(&token)));
        assert_eq!(after.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn unavailable_store_reports_a_loading_error() {
        let app = test::init_service(
            App::new()
                .app_data(state_with(Arc::new(FailingSource::new(true))))
                .configure(configure),
        )
        .await;
        let token = token_for("uid-1");

        let response = call!(
            app,
            test::TestRequest::get()
                .uri("/expenses")
                .insert_header(bearer(&token))
        );
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let failure = body(response).await;
        assert_eq!(failure["notice"]["kind"], "error");
        assert_eq!(failure["notice"]["message"], "Error loading expenses");

        // The write lands even though the listing cannot be refreshed.
        let created = call!(
            app,
            test::TestRequest::post()
                .uri("/expenses")
                .insert_header(bearer(&token))
                .set_json(json!({"date": "2024-02-10", "category": "Shopping", "amount": 5}))
        );
        assert_eq!(created.status(), StatusCode::CREATED);
        let created = body(created).await;
        assert_eq!(created["notice"]["message"], "Expense added successfully");
        assert!(created["expenses"].as_array().unwrap().is_empty());
    }
}
