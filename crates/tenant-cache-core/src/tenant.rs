//! Tenant identity and cache namespaces.
//!
//! Both types validate on construction so that a value which could collide
//! with the key separator or a glob metacharacter never reaches the key scheme.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeySchemeError;
use crate::key::SEPARATOR;

/// Longest tenant id accepted by [`TenantId::new`].
pub const MAX_TENANT_ID_LEN: usize = 128;

/// Identifier of an isolated customer or organization.
///
/// Allowed characters are ASCII alphanumerics, `_`, `-` and `.`. The key
/// separator and every Redis glob metacharacter are therefore excluded, which
/// keeps tenant prefixes collision-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a tenant id.
    pub fn new(value: impl Into<String>) -> Result<Self, KeySchemeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(KeySchemeError::tenant(&value, "must not be empty"));
        }
        if value.len() > MAX_TENANT_ID_LEN {
            return Err(KeySchemeError::tenant(&value, "exceeds 128 characters"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(KeySchemeError::tenant(
                &value,
                "only ASCII letters, digits, '_', '-' and '.' are allowed",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantId {
    type Err = KeySchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = KeySchemeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Logical tag for one cached entity or collection type.
///
/// A namespace is one or more segments joined by the key separator, e.g.
/// `users` or `locations:zones`. Each segment starts with a lowercase ASCII
/// letter or digit and continues with lowercase letters, digits, `_` or `-`.
///
/// Nested namespaces share their parent's wildcard prefix, so evicting
/// `locations` also evicts everything under `locations:zones`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Namespace(Cow<'static, str>);

impl Namespace {
    /// Validate and wrap a namespace name.
    pub fn parse(value: impl Into<Cow<'static, str>>) -> Result<Self, KeySchemeError> {
        let value = value.into();
        if value.is_empty() {
            return Err(KeySchemeError::namespace(&value, "must not be empty"));
        }
        for segment in value.split(SEPARATOR) {
            validate_segment(&value, segment)?;
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `:`-separated segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Whether `self` equals `parent` or is nested below it.
    pub fn is_within(&self, parent: &Namespace) -> bool {
        let mut own = self.segments();
        parent.segments().all(|p| own.next() == Some(p))
    }
}

fn validate_segment(full: &str, segment: &str) -> Result<(), KeySchemeError> {
    let mut chars = segment.chars();
    match chars.next() {
        None => Err(KeySchemeError::namespace(full, "contains an empty segment")),
        Some(first) if !(first.is_ascii_lowercase() || first.is_ascii_digit()) => Err(
            KeySchemeError::namespace(full, "segments must start with a lowercase letter or digit"),
        ),
        Some(_) => {
            if chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
            {
                Ok(())
            } else {
                Err(KeySchemeError::namespace(
                    full,
                    "only lowercase letters, digits, '_' and '-' are allowed",
                ))
            }
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Namespace {
    type Err = KeySchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.to_string())
    }
}

impl TryFrom<String> for Namespace {
    type Error = KeySchemeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Namespace> for String {
    fn from(value: Namespace) -> Self {
        value.0.into_owned()
    }
}
