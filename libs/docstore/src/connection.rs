//! Connection resolution: turning caller hints into a connection string, or
//! into an explicit decision to use the local defaults.
//!
//! Connection strings are `Key=Value` pairs separated by `;`, for example
//! `Url=http://ravendb:8080;Database=orders;User=svc;Password=${DB_PASSWORD}`.
//! `${VAR}` references are expanded from the environment before parsing.

use crate::conventions::PersistenceSettings;
use crate::error::{PersistenceError, Result};
use hostkit::ConfigProvider;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Connection string name checked when the caller supplies no source.
pub const DEFAULT_CONNECTION_STRING_NAME: &str = "NServiceBus.Persistence";

/// Store URL used when no connection string can be found.
pub const DEFAULT_URL: &str = "http://localhost:8080";

/// Callback producing a connection string on demand.
pub type ConnectionStringCallback = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Where the connection string comes from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// Use this string verbatim.
    Explicit(String),
    /// Look the string up by name in the host configuration.
    Named(String),
    /// Ask the callback, exactly once.
    Callback(ConnectionStringCallback),
    /// Try [`DEFAULT_CONNECTION_STRING_NAME`], then fall back to [`DEFAULT_URL`].
    Default,
}

impl ConnectionSource {
    #[must_use]
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        ConnectionSource::Callback(Arc::new(f))
    }
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSource::Explicit(s) => f
                .debug_tuple("Explicit")
                .field(&redact_connection_string(s))
                .finish(),
            ConnectionSource::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ConnectionSource::Callback(_) => f.write_str("Callback"),
            ConnectionSource::Default => f.write_str("Default"),
        }
    }
}

/// Outcome of connection resolution.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedConnection {
    ConnectionString(String),
    Defaults { url: String, database: String },
}

impl fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedConnection::ConnectionString(s) => f
                .debug_tuple("ConnectionString")
                .field(&redact_connection_string(s))
                .finish(),
            ResolvedConnection::Defaults { url, database } => f
                .debug_struct("Defaults")
                .field("url", url)
                .field("database", database)
                .finish(),
        }
    }
}

/// Resolve `source` to a connection string or to the defaults.
///
/// # Errors
/// Returns `PersistenceError::Configuration` if a named connection string is
/// missing or the callback yields nothing.
pub fn resolve(
    source: &ConnectionSource,
    config: &dyn ConfigProvider,
    settings: &PersistenceSettings,
) -> Result<ResolvedConnection> {
    let resolved = match source {
        ConnectionSource::Explicit(s) => ResolvedConnection::ConnectionString(s.clone()),
        ConnectionSource::Named(name) => {
            let s = config.connection_string(name).ok_or_else(|| {
                PersistenceError::config(format!(
                    "connection string named '{name}' was not found in the host configuration"
                ))
            })?;
            ResolvedConnection::ConnectionString(s.to_owned())
        }
        ConnectionSource::Callback(cb) => match cb() {
            Some(s) if !s.trim().is_empty() => ResolvedConnection::ConnectionString(s),
            _ => {
                return Err(PersistenceError::config(
                    "connection string callback returned no value",
                ));
            }
        },
        ConnectionSource::Default => match config.connection_string(DEFAULT_CONNECTION_STRING_NAME)
        {
            Some(s) => ResolvedConnection::ConnectionString(s.to_owned()),
            None => ResolvedConnection::Defaults {
                url: DEFAULT_URL.to_owned(),
                database: settings.database_name(),
            },
        },
    };

    tracing::debug!(?source, ?resolved, "resolved persistence connection");
    Ok(resolved)
}

/// Optional basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Structured form of a connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStringOptions {
    pub url: String,
    pub database: Option<String>,
    pub resource_manager_id: Option<Uuid>,
    pub credentials: Option<Credentials>,
}

impl ConnectionStringOptions {
    /// Options pointing at `url` with nothing else set.
    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: None,
            resource_manager_id: None,
            credentials: None,
        }
    }
}

/// Parse a `Key=Value;...` connection string.
///
/// Keys are case-insensitive. Recognised keys: `Url`, `Database`,
/// `DefaultDatabase`, `ResourceManagerId`, `User`, `Password`.
///
/// # Errors
/// Returns `PersistenceError::Configuration` for malformed pairs, unknown keys,
/// a missing or invalid `Url`, an invalid `ResourceManagerId`, a `Password`
/// without a `User`, or an undefined `${VAR}` reference.
pub fn parse_connection_string(input: &str) -> Result<ConnectionStringOptions> {
    let expanded = expand_env_vars(input)?;

    let mut url = None;
    let mut database = None;
    let mut resource_manager_id = None;
    let mut user = None;
    let mut password = None;

    for pair in expanded.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            PersistenceError::config(format!(
                "connection string segment '{}' is not a Key=Value pair",
                redact_connection_string(pair)
            ))
        })?;
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "url" => url = Some(validate_url(value)?),
            "database" | "defaultdatabase" => {
                database = Some(value.to_owned()).filter(|d| !d.is_empty());
            }
            "resourcemanagerid" => {
                let id = Uuid::parse_str(value).map_err(|e| {
                    PersistenceError::config(format!(
                        "ResourceManagerId '{value}' is not a valid GUID: {e}"
                    ))
                })?;
                resource_manager_id = Some(id);
            }
            "user" => user = Some(value.to_owned()),
            "password" => password = Some(value.to_owned()),
            other => {
                return Err(PersistenceError::config(format!(
                    "unknown connection string option '{other}'"
                )));
            }
        }
    }

    let url = url.ok_or_else(|| PersistenceError::config("connection string has no 'Url'"))?;

    let credentials = match (user, password) {
        (Some(user), password) => Some(Credentials {
            user,
            password: password.unwrap_or_default(),
        }),
        (None, Some(_)) => {
            return Err(PersistenceError::config(
                "connection string sets 'Password' without 'User'",
            ));
        }
        (None, None) => None,
    };

    Ok(ConnectionStringOptions {
        url,
        database,
        resource_manager_id,
        credentials,
    })
}

fn validate_url(value: &str) -> Result<String> {
    let parsed = url::Url::parse(value)
        .map_err(|e| PersistenceError::config(format!("invalid Url '{value}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PersistenceError::config(format!(
            "Url '{value}' must use http or https"
        )));
    }
    Ok(value.trim_end_matches('/').to_owned())
}

/// Expand `${VAR}` references from the environment.
///
/// # Errors
/// Returns `PersistenceError::Configuration` if a referenced variable is not set.
pub fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| PersistenceError::config(e.to_string()))?;
    let mut result = input.to_owned();

    for caps in re.captures_iter(input) {
        let full_match = &caps[0];
        let var_name = &caps[1];
        let value = std::env::var(var_name).map_err(|e| {
            PersistenceError::config(format!(
                "environment variable '{var_name}' referenced by connection string: {e}"
            ))
        })?;
        result = result.replace(full_match, &value);
    }

    Ok(result)
}

/// Replace the value of any `Password=` pair with `***`, for logging.
#[must_use]
pub fn redact_connection_string(input: &str) -> String {
    input
        .split(';')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.trim().eq_ignore_ascii_case("password") => {
                format!("{key}=***")
            }
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parses_all_known_keys_case_insensitively() {
        let opts = parse_connection_string(
            "url=http://db:8080/; DATABASE=orders;ResourceManagerId=2f2c3321-f251-4975-802d-11fc9d9e5e37;User=svc;Password=pw;",
        )
        .unwrap();

        assert_eq!(opts.url, "http://db:8080");
        assert_eq!(opts.database.as_deref(), Some("orders"));
        assert_eq!(
            opts.resource_manager_id,
            Some(Uuid::parse_str("2f2c3321-f251-4975-802d-11fc9d9e5e37").unwrap())
        );
        assert_eq!(
            opts.credentials,
            Some(Credentials {
                user: "svc".to_owned(),
                password: "pw".to_owned()
            })
        );
    }

    #[test]
    fn default_database_alias() {
        let opts = parse_connection_string("Url=http://db;DefaultDatabase=sales").unwrap();
        assert_eq!(opts.database.as_deref(), Some("sales"));
    }

    #[test]
    fn url_is_required() {
        let err = parse_connection_string("Database=orders").unwrap_err();
        assert!(err.to_string().contains("no 'Url'"));
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in [
            "Url=http://db;Colour=blue",
            "Url=http://db;ResourceManagerId=not-a-guid",
            "Url=not a url",
            "Url=ftp://db",
            "Url=http://db;justtext",
            "Url=http://db;Password=secret",
        ] {
            let err = parse_connection_string(bad).unwrap_err();
            assert!(
                matches!(err, PersistenceError::Configuration(_)),
                "'{bad}' should be a configuration error"
            );
        }
    }

    #[test]
    fn malformed_segment_error_does_not_leak_password() {
        let err = parse_connection_string("Url=http://db;Password=hunter2;oops").unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }

    #[test]
    fn env_vars_are_expanded() {
        temp_env::with_var("DOCSTORE_TEST_HOST", Some("ravendb.internal"), || {
            let opts = parse_connection_string("Url=http://${DOCSTORE_TEST_HOST}:8080").unwrap();
            assert_eq!(opts.url, "http://ravendb.internal:8080");
        });
    }

    #[test]
    fn missing_env_var_is_configuration_error() {
        temp_env::with_var_unset("DOCSTORE_TEST_MISSING", || {
            let err = expand_env_vars("Url=${DOCSTORE_TEST_MISSING}").unwrap_err();
            assert!(err.to_string().contains("DOCSTORE_TEST_MISSING"));
        });
    }

    #[test]
    fn redaction_hides_password_only() {
        assert_eq!(
            redact_connection_string("Url=http://db;User=svc;password=secret"),
            "Url=http://db;User=svc;password=***"
        );
        assert_eq!(redact_connection_string("Url=http://db"), "Url=http://db");
        assert!(!format!("{:?}", ConnectionSource::Explicit("Password=x1".to_owned())).contains("x1"));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let c = Credentials {
            user: "svc".to_owned(),
            password: "secret".to_owned(),
        };
        let dbg = format!("{c:?}");
        assert!(dbg.contains("svc"));
        assert!(!dbg.contains("secret"));
    }
}
