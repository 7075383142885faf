pub mod access_grants;
pub mod health;
