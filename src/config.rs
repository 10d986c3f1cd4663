//! Session policy: cookie name and lifetimes.

use std::env;

use time::Duration;

pub const DEFAULT_COOKIE_NAME: &str = "auth_sid";
pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(12);
pub const DEFAULT_REMEMBER_TTL: Duration = Duration::days(30);
/// Longest lifetime accepted from the environment. Browsers cap cookie
/// `Max-Age` at 400 days.
pub const MAX_TTL: Duration = Duration::days(400);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable `{var}` has invalid value `{value}`: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("`{0}` is not a valid cookie name")]
    InvalidCookieName(String),
}

/// Cookie and lifetime settings shared by the manager and the identity layer.
///
/// ```
/// use time::Duration;
/// use tower_identity_sessions::SessionConfig;
///
/// let config = SessionConfig::default()
///     .with_cookie_name("app_session")?
///     .with_remember_ttl(Duration::days(14));
/// assert_eq!(config.ttl_for(true), Duration::days(14));
/// # Ok::<(), tower_identity_sessions::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    cookie_name: String,
    session_ttl: Duration,
    remember_ttl: Duration,
    trust_forwarded_proto: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_owned(),
            session_ttl: DEFAULT_SESSION_TTL,
            remember_ttl: DEFAULT_REMEMBER_TTL,
            trust_forwarded_proto: false,
        }
    }
}

impl SessionConfig {
    /// Reads `SESSION_COOKIE_NAME`, `SESSION_TTL_SECS`,
    /// `SESSION_REMEMBER_TTL_SECS` and `SESSION_TRUST_FORWARDED_PROTO`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = lookup("SESSION_COOKIE_NAME") {
            if !is_cookie_name(&name) {
                return Err(ConfigError::Invalid {
                    var: "SESSION_COOKIE_NAME",
                    value: name,
                    reason: "not a valid cookie name",
                });
            }
            config.cookie_name = name;
        }
        if let Some(value) = lookup("SESSION_TTL_SECS") {
            config.session_ttl = parse_ttl("SESSION_TTL_SECS", value)?;
        }
        if let Some(value) = lookup("SESSION_REMEMBER_TTL_SECS") {
            config.remember_ttl = parse_ttl("SESSION_REMEMBER_TTL_SECS", value)?;
        }
        if let Some(value) = lookup("SESSION_TRUST_FORWARDED_PROTO") {
            config.trust_forwarded_proto = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SESSION_TRUST_FORWARDED_PROTO",
                        value,
                        reason: "expected true or false",
                    })
                }
            };
        }

        Ok(config)
    }

    /// Rejects names that are not an RFC 6265 token, as `from_env` does.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        if !is_cookie_name(&name) {
            return Err(ConfigError::InvalidCookieName(name));
        }
        self.cookie_name = name;
        Ok(self)
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_remember_ttl(mut self, ttl: Duration) -> Self {
        self.remember_ttl = ttl;
        self
    }

    /// Honor `X-Forwarded-Proto` when deciding whether a request arrived
    /// over TLS. Only enable behind a proxy that overwrites the header.
    pub fn with_trust_forwarded_proto(mut self, trust: bool) -> Self {
        self.trust_forwarded_proto = trust;
        self
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn trust_forwarded_proto(&self) -> bool {
        self.trust_forwarded_proto
    }

    /// The policy lifetime for a plain or a remembered session.
    pub fn ttl_for(&self, remember: bool) -> Duration {
        if remember {
            self.remember_ttl
        } else {
            self.session_ttl
        }
    }
}

fn parse_ttl(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    match value.trim().parse::<i64>() {
        Ok(secs) if secs > 0 && Duration::seconds(secs) <= MAX_TTL => Ok(Duration::seconds(secs)),
        Ok(secs) if secs > 0 => Err(ConfigError::Invalid {
            var,
            value,
            reason: "longer than the 400 day maximum",
        }),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected a positive number of seconds",
        }),
    }
}

// RFC 6265 token characters
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<SessionConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SessionConfig::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.cookie_name(), "auth_sid");
        assert_eq!(config.ttl_for(false), Duration::hours(12));
        assert_eq!(config.ttl_for(true), Duration::days(30));
    }

    #[test]
    fn variables_override_defaults() {
        let config = from_vars(&[
            ("SESSION_COOKIE_NAME", "sid"),
            ("SESSION_TTL_SECS", "3600"),
            ("SESSION_REMEMBER_TTL_SECS", "86400"),
            ("SESSION_TRUST_FORWARDED_PROTO", "true"),
        ])
        .unwrap();

        assert_eq!(config.cookie_name(), "sid");
        assert_eq!(config.ttl_for(false), Duration::hours(1));
        assert_eq!(config.ttl_for(true), Duration::days(1));
        assert!(config.trust_forwarded_proto());
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(from_vars(&[("SESSION_TTL_SECS", "0")]).is_err());
        assert!(from_vars(&[("SESSION_TTL_SECS", "soon")]).is_err());
        assert!(from_vars(&[("SESSION_COOKIE_NAME", "bad name")]).is_err());
        assert!(from_vars(&[("SESSION_TRUST_FORWARDED_PROTO", "maybe")]).is_err());
    }

    #[test]
    fn lifetimes_beyond_the_cap_are_rejected() {
        let err = from_vars(&[("SESSION_TTL_SECS", "9223372036854775807")]).unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { var: "SESSION_TTL_SECS", .. }),
            "got {err:?}"
        );

        let at_cap = MAX_TTL.whole_seconds().to_string();
        let config = from_vars(&[("SESSION_REMEMBER_TTL_SECS", at_cap.as_str())]).unwrap();
        assert_eq!(config.ttl_for(true), MAX_TTL);

        let over_cap = (MAX_TTL.whole_seconds() + 1).to_string();
        assert!(from_vars(&[("SESSION_REMEMBER_TTL_SECS", over_cap.as_str())]).is_err());
    }

    #[test]
    fn builder_validates_cookie_names() {
        let config = SessionConfig::default().with_cookie_name("app_session").unwrap();
        assert_eq!(config.cookie_name(), "app_session");

        for name in ["", "bad name", "semi;colon", "quo\"te"] {
            let err = SessionConfig::default().with_cookie_name(name).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidCookieName(_)), "name {name:?}");
        }
    }
}
