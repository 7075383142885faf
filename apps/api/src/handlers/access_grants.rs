use allowgate_application::{AccessRequest, denial_message};
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use crate::dto::{AccessGrantResponse, CreateAccessGrantRequest};
use crate::state::AppState;


pub async fn create_access_grant_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccessGrantRequest>, JsonRejection>,
) -> (StatusCode, Json<AccessGrantResponse>) {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("invalid request body: {}", rejection.body_text()),
            );
        }
    };

    let request = match access_request_from(payload) {
        Ok(request) => request,
        Err(message) => return respond(StatusCode::INTERNAL_SERVER_ERROR, message),
    };

    match state.admission_service.admit(request).await {
        Ok(outcome) if outcome.is_granted() => respond(StatusCode::OK, outcome.message()),
        Ok(outcome) => respond(StatusCode::INTERNAL_SERVER_ERROR, outcome.message()),
        Err(error) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            denial_message(error.to_string().as_str()),
        ),
    }
}

fn access_request_from(payload: CreateAccessGrantRequest) -> Result<AccessRequest, String> {
    Ok(AccessRequest {
        address: required_parameter(payload.ip, "ip")?,
        principal: required_parameter(payload.username, "username")?,
        duration: required_parameter(payload.duration, "duration")?,
    })
}

fn required_parameter(value: Option<String>, key: &str) -> Result<String, String> {
    value.ok_or_else(|| format!("{key} parameter is required"))
}

fn respond(status: StatusCode, body: String) -> (StatusCode, Json<AccessGrantResponse>) {
    (
        status,
        Json(AccessGrantResponse {
            status_code: status.as_u16(),
            body,
        }),
    )
}
