//! Ordered checks applied to inbound access requests before admission.
//!
//! Every check runs, failures are collected, and the chain fails if any check
//! failed. New checks implement [`RequestCheck`] and are appended with
//! [`ValidationChain::with_check`]; existing checks stay untouched.

use allowgate_core::AppError;

use crate::address::is_valid_ipv4;

/// Raw request parameters as seen by the validation chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParameters {
    /// Requested source address in dotted-quad form.
    pub address: Option<String>,
    /// Requesting principal name.
    pub principal: Option<String>,
    /// Requested grant length in whole hours, as received.
    pub duration: Option<String>,
}

/// Verdict of one check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Whether the parameters passed the check.
    pub valid: bool,
    /// Human-readable failure reasons.
    pub messages: Vec<String>,
}

impl CheckOutcome {
    /// Passing outcome with no messages.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            valid: true,
            messages: Vec::new(),
        }
    }

    /// Failing outcome carrying one reason.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            messages: vec![message.into()],
        }
    }
}

/// One independent gate in the validation chain.
pub trait RequestCheck: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluates the parameters.
    fn accept(&self, parameters: &RequestParameters) -> CheckOutcome;
}

/// Address must be four dot-separated octets in `[0, 255]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressFormatCheck;

impl RequestCheck for AddressFormatCheck {
    fn name(&self) -> &'static str {
        "address_format"
    }

    fn accept(&self, parameters: &RequestParameters) -> CheckOutcome {
        match parameters.address.as_deref() {
            Some(address) if is_valid_ipv4(address) => CheckOutcome::accepted(),
            _ => CheckOutcome::rejected("IP is invalid"),
        }
    }
}

/// Principal name must be present and not blank.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalPresentCheck;

impl RequestCheck for PrincipalPresentCheck {
    fn name(&self) -> &'static str {
        "principal_present"
    }

    fn accept(&self, parameters: &RequestParameters) -> CheckOutcome {
        match parameters.principal.as_deref() {
            Some(principal) if !principal.trim().is_empty() => CheckOutcome::accepted(),
            _ => CheckOutcome::rejected("username is invalid"),
        }
    }
}

/// Duration must be a positive whole number of hours.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationCheck;

impl DurationCheck {
    /// Parses a raw duration into hours, rejecting zero and non-numeric input.
    #[must_use]
    pub fn parse_hours(value: &str) -> Option<u32> {
        value.trim().parse::<u32>().ok().filter(|hours| *hours > 0)
    }
}

impl RequestCheck for DurationCheck {
    fn name(&self) -> &'static str {
        "duration"
    }

    fn accept(&self, parameters: &RequestParameters) -> CheckOutcome {
        match parameters.duration.as_deref().and_then(Self::parse_hours) {
            Some(_) => CheckOutcome::accepted(),
            None => CheckOutcome::rejected("duration is invalid"),
        }
    }
}

/// Ordered list of request checks.
pub struct ValidationChain {
    checks: Vec<Box<dyn RequestCheck>>,
}

impl ValidationChain {
    /// Creates a chain with no checks; it accepts everything.
    #[must_use]
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// Address format, principal presence and duration checks, in that order.
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with_check(AddressFormatCheck)
            .with_check(PrincipalPresentCheck)
            .with_check(DurationCheck)
    }

    /// Appends a check to the end of the chain.
    #[must_use]
    pub fn with_check(mut self, check: impl RequestCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    /// Returns the names of the configured checks in evaluation order.
    #[must_use]
    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Runs every check and aggregates failure messages.
    pub fn evaluate(&self, parameters: &RequestParameters) -> Result<(), Vec<String>> {
        let mut messages = Vec::new();
        let mut valid = true;

        for check in &self.checks {
            let outcome = check.accept(parameters);
            if !outcome.valid {
                valid = false;
                messages.extend(outcome.messages);
            }
        }

        if valid { Ok(()) } else { Err(messages) }
    }

    /// Same as [`ValidationChain::evaluate`] with messages folded into one error.
    pub fn require_valid(&self, parameters: &RequestParameters) -> Result<(), AppError> {
        self.evaluate(parameters)
            .map_err(|messages| AppError::Validation(messages.join("\n")))
    }
}

impl Default for ValidationChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Debug for ValidationChain {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ValidationChain")
            .field("checks", &self.check_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckOutcome, DurationCheck, RequestCheck, RequestParameters, ValidationChain};

    fn parameters(address: Option<&str>, principal: Option<&str>) -> RequestParameters {
        RequestParameters {
            address: address.map(ToOwned::to_owned),
            principal: principal.map(ToOwned::to_owned),
            duration: Some("1".to_owned()),
        }
    }

    struct AlwaysFails(&'static str);

    impl RequestCheck for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        fn accept(&self, _parameters: &RequestParameters) -> CheckOutcome {
            CheckOutcome::rejected(self.0)
        }
    }

    #[test]
    fn standard_chain_accepts_valid_request() {
        let chain = ValidationChain::standard();
        assert!(
            chain
                .evaluate(&parameters(Some("10.0.0.1"), Some("alice")))
                .is_ok()
        );
    }

    #[test]
    fn invalid_address_is_reported() {
        let chain = ValidationChain::standard();
        let result = chain.evaluate(&parameters(Some("999.1.1.1"), Some("alice")));
        assert_eq!(result, Err(vec!["IP is invalid".to_owned()]));
    }

    #[test]
    fn missing_address_is_invalid() {
        let chain = ValidationChain::standard();
        let result = chain.evaluate(&parameters(None, Some("alice")));
        assert_eq!(result, Err(vec!["IP is invalid".to_owned()]));
    }

    #[test]
    fn every_check_runs_and_messages_aggregate() {
        let chain = ValidationChain::standard().with_check(AlwaysFails("blocked by policy"));
        let result = chain.evaluate(&parameters(Some("1.2.3"), Some("  ")));

        assert_eq!(
            result,
            Err(vec![
                "IP is invalid".to_owned(),
                "username is invalid".to_owned(),
                "blocked by policy".to_owned(),
            ])
        );
    }

    #[test]
    fn later_failure_still_fails_chain_when_earlier_checks_pass() {
        let chain = ValidationChain::standard().with_check(AlwaysFails("nope"));
        let result = chain.evaluate(&parameters(Some("10.0.0.1"), Some("alice")));
        assert_eq!(result, Err(vec!["nope".to_owned()]));
    }

    #[test]
    fn duration_must_be_positive_hours() {
        assert_eq!(DurationCheck::parse_hours("24"), Some(24));
        assert_eq!(DurationCheck::parse_hours(" 3 "), Some(3));
        assert_eq!(DurationCheck::parse_hours("0"), None);
        assert_eq!(DurationCheck::parse_hours("-1"), None);
        assert_eq!(DurationCheck::parse_hours("1.5"), None);
        assert_eq!(DurationCheck::parse_hours("soon"), None);

        let chain = ValidationChain::standard();
        let mut request = parameters(Some("10.0.0.1"), Some("alice"));
        request.duration = Some("0".to_owned());
        assert_eq!(
            chain.evaluate(&request),
            Err(vec!["duration is invalid".to_owned()])
        );
    }

    #[test]
    fn empty_chain_accepts_anything() {
        assert!(
            ValidationChain::empty()
                .evaluate(&RequestParameters::default())
                .is_ok()
        );
    }

    #[test]
    fn require_valid_joins_messages_with_newlines() {
        let chain = ValidationChain::standard();
        let result = chain.require_valid(&parameters(Some("x"), None));
        assert!(matches!(
            result,
            Err(allowgate_core::AppError::Validation(message))
                if message == "IP is invalid\nusername is invalid"
        ));
    }

    #[test]
    fn check_names_follow_insertion_order() {
        let chain = ValidationChain::standard();
        assert_eq!(
            chain.check_names(),
            vec!["address_format", "principal_present", "duration"]
        );
    }
}
