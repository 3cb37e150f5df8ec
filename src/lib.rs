use std::sync::Arc;

pub mod api_models;
pub mod audit;
pub mod auth;
pub mod config;
pub mod models;
pub mod queries;
pub mod routes;
pub mod store;
pub mod views;
pub mod voting;

use crate::audit::AuditLog;
use crate::auth::IdentityProvider;
use crate::store::PollStore;
use crate::views::Views;
use crate::voting::VotingService;

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
    pub voting: VotingService,
    pub audit: Arc<dyn AuditLog>,
    pub identities: Arc<dyn IdentityProvider>,
    pub views: Arc<Views>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PollStore>,
        audit: Arc<dyn AuditLog>,
        identities: Arc<dyn IdentityProvider>,
        admin_token: Option<String>,
    ) -> Result<Self, handlebars::TemplateError> {
        Ok(Self {
            voting: VotingService::new(store.clone(), audit.clone()),
            store,
            audit,
            identities,
            views: Arc::new(Views::new()?),
            admin_token,
        })
    }
}

/**
 * Build the tide server with its middleware and every route mounted
 *
 * `session_secret` must be at least 32 bytes long.
 */
pub fn server(state: AppState, session_secret: &[u8]) -> tide::Server<AppState> {
    let mut app = tide::with_state(state);
    app.with(driftwood::ApacheCombinedLogger);
    app.with(
        tide::sessions::SessionMiddleware::new(tide::sessions::MemoryStore::new(), session_secret)
            .with_cookie_name("polls.sid"),
    );

    app.at("/").get(routes::index);
    app.at("/polls").get(routes::polls::index);
    app.at("/polls/:id").get(routes::polls::detail);
    app.at("/polls/:id/results").get(routes::polls::results);
    app.at("/polls/:id/vote").post(routes::polls::vote);
    app.at("/accounts/login")
        .get(routes::accounts::login_form)
        .post(routes::accounts::login);
    app.at("/accounts/logout")
        .get(routes::accounts::logout)
        .post(routes::accounts::logout);
    app.at("/api/v1/questions")
        .get(routes::api::index)
        .put(routes::api::create);
    app.at("/api/v1/questions/:id/results").get(routes::api::results);
    app
}
