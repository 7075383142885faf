use serde::{Deserialize, Deserializer, Serialize};

/// Incoming access request. Fields stay optional so missing ones can be named.
#[derive(Debug, Default, Deserialize)]
pub struct CreateAccessGrantRequest {
    pub ip: Option<String>,
    pub username: Option<String>,
    /// Hours, sent either as a JSON string or a JSON number.
    #[serde(default, deserialize_with = "string_or_number")]
    pub duration: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<StringOrNumber>::deserialize(deserializer)?.map(|value| match value {
            StringOrNumber::String(value) => value,
            StringOrNumber::Number(value) => value.to_string(),
        }),
    )
}

/// Admission result, mirrored in the HTTP status.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AccessGrantResponse {
    pub status_code: u16,
    pub body: String,
}

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ledger: HealthDependencyStatus,
    pub redis: HealthDependencyStatus,
}

/// Health state for one dependency.
#[derive(Debug, Serialize)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    pub detail: Option<String>,
}
