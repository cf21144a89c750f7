//! Page-size limits, injected at engine construction.

use std::env;

use anyhow::{Context, Result};

/// Limits applied when resolving the effective page size of a list query.
///
/// Constructed explicitly by the host and handed to the engine; `from_env`
/// exists for hosts that configure through the environment.
#[derive(Debug, Clone, Default)]
pub struct PageLimits {
    /// Page size used when the request carries no usable `_limit`.
    pub default_limit: Option<u64>,

    /// Hard ceiling on any requested page size.
    pub max_limit: Option<u64>,

    /// Whether `_unlimited=true` is honored. When false the parameter is
    /// ignored and normal limit resolution applies.
    pub allow_unlimited: bool,
}

impl PageLimits {
    /// Load limits from `LIMIT_DEFAULT`, `LIMIT_MAX` and `CAN_GET_UNLIMITED`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            default_limit: positive_int_from_env("LIMIT_DEFAULT")?,
            max_limit: positive_int_from_env("LIMIT_MAX")?,
            allow_unlimited: env::var("CAN_GET_UNLIMITED").as_deref() == Ok("true"),
        })
    }

    /// Resolve the effective limit for a request.
    ///
    /// Returns `None` when the query is unlimited: an honored `_unlimited`,
    /// or no usable `_limit` and no configured default. An unparseable or
    /// zero `_limit` falls back to the default rather than lifting the cap.
    pub fn resolve(&self, limit: Option<&str>, unlimited: Option<&str>) -> Option<u64> {
        if self.allow_unlimited && unlimited == Some("true") {
            return None;
        }

        let requested = limit
            .filter(|value| !value.is_empty())
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0);

        let resolved = requested.or(self.default_limit)?;
        match self.max_limit {
            Some(max) if resolved > max => Some(max),
            _ => Some(resolved),
        }
    }
}

fn positive_int_from_env(name: &str) -> Result<Option<u64>> {
    let Ok(value) = env::var(name) else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }
    let parsed: u64 = value
        .parse()
        .with_context(|| format!("{name} must be a positive integer"))?;
    Ok((parsed > 0).then_some(parsed))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn requested_limit_wins_over_default() {
        let limits = PageLimits {
            default_limit: Some(25),
            max_limit: Some(100),
            allow_unlimited: false,
        };
        assert_eq!(limits.resolve(Some("10"), None), Some(10));
    }

    #[test]
    fn requested_limit_capped_at_max() {
        let limits = PageLimits {
            default_limit: Some(25),
            max_limit: Some(100),
            allow_unlimited: false,
        };
        assert_eq!(limits.resolve(Some("5000"), None), Some(100));
    }

    #[test]
    fn invalid_limit_falls_back_to_default() {
        let limits = PageLimits {
            default_limit: Some(25),
            max_limit: None,
            allow_unlimited: false,
        };
        assert_eq!(limits.resolve(Some("abc"), None), Some(25));
        assert_eq!(limits.resolve(Some("0"), None), Some(25));
        assert_eq!(limits.resolve(Some(""), None), Some(25));
    }

    #[test]
    fn no_limit_and_no_default_is_unlimited() {
        let limits = PageLimits::default();
        assert_eq!(limits.resolve(None, None), None);
    }

    #[test]
    fn unlimited_honored_only_when_allowed() {
        let open = PageLimits {
            default_limit: Some(25),
            max_limit: None,
            allow_unlimited: true,
        };
        assert_eq!(open.resolve(Some("10"), Some("true")), None);

        let closed = PageLimits {
            allow_unlimited: false,
            ..open
        };
        assert_eq!(closed.resolve(Some("10"), Some("true")), Some(10));
    }
}
