//! Network addresses admitted to the allow-list.

use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

use allowgate_core::{AppError, AppResult};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

/// Single-host IPv4 address kept in canonical `A.B.C.D/32` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostAddress(Ipv4Net);

impl HostAddress {
    /// Parses a bare dotted-quad address such as `10.0.0.1`.
    ///
    /// Each of the four octets must be one to three decimal digits in `[0, 255]`.
    pub fn parse_dotted_quad(value: &str) -> AppResult<Self> {
        let octets = parse_octets(value).ok_or_else(|| {
            AppError::Validation(format!("'{value}' is not a valid IPv4 address"))
        })?;

        Ok(Self(Ipv4Net::from(Ipv4Addr::from(octets))))
    }

    /// Parses a stored single-host CIDR such as `10.0.0.1/32`.
    pub fn parse_cidr(value: &str) -> AppResult<Self> {
        let network = Ipv4Net::from_str(value)
            .map_err(|error| AppError::Validation(format!("invalid CIDR '{value}': {error}")))?;

        if network.prefix_len() != 32 {
            return Err(AppError::Validation(format!(
                "CIDR '{value}' must describe a single host (/32)"
            )));
        }

        Ok(Self(network))
    }

    /// Returns the canonical CIDR notation used by the ledger and the allow-list.
    #[must_use]
    pub fn as_cidr(&self) -> String {
        self.0.to_string()
    }
}

/// Returns whether `value` is four dot-separated decimal octets in `[0, 255]`.
#[must_use]
pub fn is_valid_ipv4(value: &str) -> bool {
    parse_octets(value).is_some()
}

fn parse_octets(value: &str) -> Option<[u8; 4]> {
    let mut octets = [0_u8; 4];
    let mut parts = value.split('.');

    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        *octet = u8::try_from(part.parse::<u16>().ok()?).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }

    Some(octets)
}

impl FromStr for HostAddress {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.contains('/') {
            Self::parse_cidr(value)
        } else {
            Self::parse_dotted_quad(value)
        }
    }
}

impl TryFrom<String> for HostAddress {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<HostAddress> for String {
    fn from(value: HostAddress) -> Self {
        value.as_cidr()
    }
}

impl Display for HostAddress {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
