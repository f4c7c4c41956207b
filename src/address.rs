//! Recipient address validation
//!
//! Every address that reaches the composer or the SMTP envelope is an
//! [`Address`], so an invalid recipient is caught before any
//! connection is opened.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

const MAX_LOCAL_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

/// A syntactically valid `local-part@domain` address.
///
/// The domain is lowercased; the local part is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    local: String,
    domain: String,
}

impl Address {
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub(crate) fn to_lettre(&self) -> Result<lettre::Address> {
        lettre::Address::new(&self.local, &self.domain)
            .map_err(|e| invalid(&self.to_string(), &e.to_string()))
    }
}

/// Validate and normalize a raw address string.
///
/// Rejects empty input, a missing or repeated `@`, malformed local
/// parts, and domains without at least two `.`-separated labels.
pub fn validate(raw: &str) -> Result<Address> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid(raw, "address is empty"));
    }

    let mut parts = trimmed.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        let reason = if trimmed.contains('@') {
            "more than one '@'"
        } else {
            "missing '@'"
        };
        return Err(invalid(raw, reason));
    };

    check_local(raw, local)?;
    let domain = domain.to_lowercase();
    check_domain(raw, &domain)?;

    let address = Address {
        local: local.to_string(),
        domain,
    };
    // lettre has the final say: anything it refuses could not be put
    // on an SMTP envelope anyway.
    address.to_lettre()?;
    Ok(address)
}

/// Validate a list of addresses, failing on the first bad one.
///
/// Duplicates are dropped; first-seen order is kept.
pub fn validate_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Address>> {
    let mut out: Vec<Address> = Vec::with_capacity(raw.len());
    for item in raw {
        let address = validate(item.as_ref())?;
        if !out.contains(&address) {
            out.push(address);
        }
    }
    Ok(out)
}

fn check_local(raw: &str, local: &str) -> Result<()> {
    if local.is_empty() {
        return Err(invalid(raw, "local part is empty"));
    }
    if local.len() > MAX_LOCAL_LEN {
        return Err(invalid(raw, "local part is longer than 64 characters"));
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(invalid(raw, "misplaced '.' in local part"));
    }
    if let Some(c) = local.chars().find(|c| !is_atext(*c) && *c != '.') {
        return Err(invalid(raw, &format!("character {c:?} not allowed in local part")));
    }
    Ok(())
}

fn check_domain(raw: &str, domain: &str) -> Result<()> {
    if domain.is_empty() {
        return Err(invalid(raw, "domain is empty"));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(invalid(raw, "domain is longer than 255 characters"));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid(raw, "domain needs at least two labels"));
    }
    for label in labels {
        if label.is_empty() {
            return Err(invalid(raw, "empty domain label"));
        }
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(invalid(raw, "domain label is longer than 63 characters"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid(raw, "domain label starts or ends with '-'"));
        }
        if let Some(c) = label.chars().find(|c| !c.is_alphanumeric() && *c != '-') {
            return Err(invalid(raw, &format!("character {c:?} not allowed in domain")));
        }
    }
    Ok(())
}

/// RFC 5322 `atext`, plus any non-ASCII alphanumeric (RFC 6531).
fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_'
                | '`' | '{' | '|' | '}' | '~'
        )
        || (!c.is_ascii() && c.is_alphanumeric())
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::InvalidAddress {
        address: raw.to_string(),
        reason: reason.to_string(),
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        validate(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
