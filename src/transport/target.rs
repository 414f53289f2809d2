use percent_encoding::percent_decode_str;
use url::Url;

use super::TransportError;

/// The remote address a transport stream connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    /// Empty when the URL carries no user info.
    pub user: String,
    /// Repository path without the URL's leading `/`.
    pub path: String,
    /// Only set when it differs from the scheme's default port.
    pub port: Option<u16>,
}

impl ConnectionTarget {
    /// Decompose a `scheme://[user@]host[:port]/path` URL.
    pub fn parse(url: &str) -> Result<Self, TransportError> {
        let invalid = |reason: String| TransportError::Configuration {
            url: url.to_string(),
            reason,
        };

        let parsed = Url::parse(url).map_err(|err| invalid(err.to_string()))?;
        let host = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing host".to_string()))?
            .to_string();
        let port = parsed
            .port()
            .filter(|port| Some(*port) != default_port(parsed.scheme()));
        let path = parsed.path();
        let path = path.strip_prefix('/').unwrap_or(path);

        Ok(Self {
            host,
            user: decode(parsed.username()).map_err(|err| invalid(format!("user: {err}")))?,
            path: decode(path).map_err(|err| invalid(format!("path: {err}")))?,
            port,
        })
    }
}

/// Undo the URL's percent-encoding.
fn decode(component: &str) -> Result<String, std::str::Utf8Error> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
}

/// `url` already hides the defaults of the special schemes, but not ssh's.
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "ssh" | "ssh+exe" | "git+ssh" | "ssh+git" => Some(22),
        _ => None,
    }
}
