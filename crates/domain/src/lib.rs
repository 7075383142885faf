//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod address;
mod allow_list;
mod grant;
mod validation;

pub use address::{HostAddress, is_valid_ipv4};
pub use allow_list::AllowListRules;
pub use grant::{GrantRecord, GrantState, SECONDS_PER_HOUR};
pub use validation::{
    AddressFormatCheck, CheckOutcome, DurationCheck, PrincipalPresentCheck, RequestCheck,
    RequestParameters, ValidationChain,
};
