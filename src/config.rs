//! Property-bag translation.
//!
//! This module turns a flat string-keyed configuration map into a structured
//! [`ConnectionDescriptor`]. Recognized structural keys are extracted and
//! removed from the working map; whatever remains becomes the residual
//! property set, forwarded verbatim to typed setter application later in the
//! pipeline.

use std::collections::HashMap;
use std::fmt;

use crate::error::{SourceError, SourceResult};

/// Flat string-keyed configuration map, the source of truth for construction.
/// Consumed by value; never reused after translation.
pub type ConfigMap = HashMap<String, String>;

/// Recognized structural configuration keys.
pub mod keys {
    pub const URL: &str = "url";
    pub const DATABASE_NAME: &str = "databaseName";
    pub const SERVER_NAME: &str = "serverName";
    pub const PORT_NUMBER: &str = "portNumber";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";
    /// Value `"create"` enables create-if-missing semantics.
    pub const CREATE_DATABASE: &str = "createDatabase";
}

/// Structured connection descriptor produced by [`translate`].
///
/// When `url` is set, `database_name`/`server_name`/`port` are derived from it
/// and any discrete structural keys supplied alongside are silently ignored.
/// The URL's `;attr=val` suffix is retained as one opaque attribute string and
/// is never expanded into `residual`.
#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub url: Option<String>,
    pub database_name: Option<String>,
    pub server_name: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub create_on_missing: bool,
    /// Opaque `;`-separated attribute suffix carried over from the URL.
    pub attributes: Option<String>,
    /// Every input key not recognized as a structural field.
    pub residual: ConfigMap,
}

impl ConnectionDescriptor {
    /// Iterate the URL attribute string as `(key, value)` pairs.
    ///
    /// Attributes without an `=` yield an empty value. The raw string stays
    /// untouched on the descriptor so it re-serializes exactly as supplied.
    pub fn attribute_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .as_deref()
            .unwrap_or("")
            .split(';')
            .filter(|s| !s.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            })
    }

    /// Look up a single URL attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attribute_pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("url", &self.url)
            .field("database_name", &self.database_name)
            .field("server_name", &self.server_name)
            .field("port", &self.port)
            .field("user", &self.user)
            // Never expose credentials through Debug output
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("create_on_missing", &self.create_on_missing)
            .field("attributes", &self.attributes)
            .field("residual", &self.residual)
            .finish()
    }
}

/// Parsed pieces of a driver URL.
#[derive(Debug, PartialEq, Eq)]
struct UrlParts {
    server: Option<String>,
    port: Option<u16>,
    database: String,
    attributes: Option<String>,
}

impl UrlParts {
    /// Parse a driver URL of the form
    /// `scheme:[subscheme:]//host[:port]/database[;attr=val...]` or
    /// `scheme:[subscheme:]database[;attr=val...]`.
    ///
    /// The scheme section is scheme-agnostic: any run of `token:` segments is
    /// stripped, so `jdbc:derby:target/test` and `sqlite:data/app.db` parse
    /// the same way.
    fn parse(url: &str) -> SourceResult<Self> {
        let (body, attributes) = match url.split_once(';') {
            Some((body, attrs)) => (body, Some(attrs.to_string())),
            None => (url, None),
        };

        let rest = strip_schemes(body);

        if let Some(network) = rest.strip_prefix("//") {
            let (authority, database) = network.split_once('/').ok_or_else(|| {
                SourceError::configuration(format!("URL '{url}' contains no database name"))
            })?;
            let (host, port) = match authority.split_once(':') {
                Some((host, port_str)) => {
                    let port = port_str.parse::<u16>().map_err(|_| {
                        SourceError::configuration(format!(
                            "Invalid port number '{port_str}' in URL '{url}'"
                        ))
                    })?;
                    (host, Some(port))
                }
                None => (authority, None),
            };
            if host.is_empty() || database.is_empty() {
                return Err(SourceError::configuration(format!(
                    "URL '{url}' is missing a host or database name"
                )));
            }
            Ok(UrlParts {
                server: Some(host.to_string()),
                port,
                database: database.to_string(),
                attributes,
            })
        } else {
            if rest.is_empty() {
                return Err(SourceError::configuration(format!(
                    "URL '{url}' contains no database name"
                )));
            }
            Ok(UrlParts {
                server: None,
                port: None,
                database: rest.to_string(),
                attributes,
            })
        }
    }
}

/// Strip leading `token:` scheme segments from a URL body.
///
/// A segment qualifies only when it contains no path characters, so the
/// stripping stops at `//host:port` authorities and at bare database paths.
fn strip_schemes(mut body: &str) -> &str {
    while let Some(pos) = body.find(':') {
        let token = &body[..pos];
        if token.is_empty()
            || !token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        {
            break;
        }
        body = &body[pos + 1..];
    }
    body
}

/// Translate a configuration map into a [`ConnectionDescriptor`].
///
/// Structural keys are removed from the map as they are consumed; the
/// leftovers become the descriptor's residual properties. URL presence always
/// wins over discrete structural fields, even when both are supplied - the
/// discrete fields are dropped without error. This precedence is deliberate
/// and observable; do not tighten it into conflict rejection.
///
/// # Errors
///
/// Returns `SourceError::Configuration` when neither `url` nor `databaseName`
/// is present, or when a URL or discrete port number is malformed.
pub fn translate(mut config: ConfigMap) -> SourceResult<ConnectionDescriptor> {
    let url = config.remove(keys::URL);
    let discrete_database = config.remove(keys::DATABASE_NAME);
    let discrete_server = config.remove(keys::SERVER_NAME);
    let discrete_port = config.remove(keys::PORT_NUMBER);
    let user = config.remove(keys::USER);
    let password = config.remove(keys::PASSWORD);
    let create_on_missing = config
        .remove(keys::CREATE_DATABASE)
        .is_some_and(|v| v.eq_ignore_ascii_case("create"));

    let (database_name, server_name, port, attributes) = match &url {
        Some(u) => {
            let parts = UrlParts::parse(u)?;
            (
                Some(parts.database),
                parts.server,
                parts.port,
                parts.attributes,
            )
        }
        None => {
            let database = discrete_database.ok_or_else(|| {
                SourceError::configuration(format!(
                    "Either '{}' or '{}' must be set",
                    keys::URL,
                    keys::DATABASE_NAME
                ))
            })?;
            let port = match discrete_port {
                Some(p) => Some(p.parse::<u16>().map_err(|_| {
                    SourceError::configuration(format!("Invalid port number '{p}'"))
                })?),
                None => None,
            };
            (Some(database), discrete_server, port, None)
        }
    };

    Ok(ConnectionDescriptor {
        url,
        database_name,
        server_name,
        port,
        user,
        password,
        create_on_missing,
        attributes,
        residual: config,
    })
}
