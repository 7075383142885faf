use allowgate_application::GrantAdmissionService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admission_service: GrantAdmissionService,
    pub ledger_pool: Option<sqlx::PgPool>,
    pub redis_client: Option<redis::Client>,
}
