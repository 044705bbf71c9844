use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ws,
    Wss,
}

impl Scheme {
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Scheme::Ws => 80,
            Scheme::Wss => 443,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }
}

/// A parsed `ws://` or `wss://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl {
    pub scheme: Scheme,
    /// Host without IPv6 brackets.
    pub host: String,
    pub port: u16,
    /// Always starts with `/`.
    pub path_and_query: String,
}

#[derive(thiserror::Error, Debug)]
pub enum UrlError {
    #[error("URL must start with ws:// or wss://")]
    Scheme,
    #[error("missing host")]
    Host,
    #[error("invalid port")]
    Port,
}

impl WsUrl {
    /// Value for the `Host` header; the port is omitted when it is the
    /// scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let host = self.bracketed_host();
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// `http(s)://host[:port]` origin for the handshake.
    #[must_use]
    pub fn origin(&self) -> String {
        let scheme = match self.scheme {
            Scheme::Ws => "http",
            Scheme::Wss => "https",
        };
        format!("{scheme}://{}", self.host_header())
    }

    fn bracketed_host(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for WsUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}{}",
            self.scheme.as_str(),
            self.host_header(),
            self.path_and_query
        )
    }
}

impl std::str::FromStr for WsUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_ws_or_wss(s)
    }
}

pub fn parse_ws_or_wss(input: &str) -> Result<WsUrl, UrlError> {
    let (scheme, rest) = if let Some(s) = input.strip_prefix("wss://") {
        (Scheme::Wss, s)
    } else if let Some(s) = input.strip_prefix("ws://") {
        (Scheme::Ws, s)
    } else {
        return Err(UrlError::Scheme);
    };

    let (authority, path_and_query) = match rest.find(['/', '?']) {
        Some(i) if rest.as_bytes()[i] == b'?' => (&rest[..i], format!("/{}", &rest[i..])),
        Some(i) => (&rest[..i], rest[i..].to_owned()),
        None => (rest, "/".to_owned()),
    };
    // Fragments are never sent.
    let path_and_query = match path_and_query.split_once('#') {
        Some((before, _)) => before.to_owned(),
        None => path_and_query,
    };

    let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
        let (host, after) = v6.split_once(']').ok_or(UrlError::Host)?;
        let port = match after.strip_prefix(':') {
            Some(p) => p.parse().map_err(|_| UrlError::Port)?,
            None if after.is_empty() => scheme.default_port(),
            None => return Err(UrlError::Port),
        };
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((h, p)) => (h, p.parse().map_err(|_| UrlError::Port)?),
            None => (authority, scheme.default_port()),
        }
    };
    if host.is_empty() {
        return Err(UrlError::Host);
    }

    Ok(WsUrl {
        scheme,
        host: host.to_owned(),
        port,
        path_and_query,
    })
}
