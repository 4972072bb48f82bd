//! Join URLs: `scheme://host:port[?code=NNNNNN|?token=...]`.
//!
//! A host renders one of these as a QR code; the joining device parses it
//! back to learn where to connect and which handshake to run:
//!
//! - `?code=NNNNNN` runs the standard `pair` flow.  The code must be exactly six
//!   ASCII digits.
//! - `?token=...` runs the `preauth` fast path and skips code entry entirely.
//! - No query just opens the socket; the device must obtain a code some
//!   other way.

use std::fmt;

use thiserror::Error;
use url::Url;

use crate::domain::types::SessionToken;

/// Errors returned when building or parsing a join URL.
#[derive(Debug, Error, PartialEq)]
pub enum UrlError {
    /// The text is not a URL at all.
    #[error("invalid URL: {0}")]
    Invalid(String),

    /// Only `ws` and `wss` are accepted.
    #[error("unsupported scheme '{0}': expected ws or wss")]
    UnsupportedScheme(String),

    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,

    /// A `code` parameter is present but is not six ASCII digits.
    #[error("pairing code must be exactly 6 digits")]
    InvalidCode,
}

/// How a joining device proves it belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinCredential {
    /// A six-digit pairing code, redeemed with `pair`.
    Code(String),
    /// A pre-issued bearer token, presented with `preauth`.
    Token(SessionToken),
}

/// A parsed or to-be-rendered join URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectUrl {
    /// `true` selects `wss`.
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub credential: Option<JoinCredential>,
}

/// Returns `true` if `code` is exactly six ASCII digits.
pub fn is_valid_pairing_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

impl ConnectUrl {
    /// A URL that carries no credential.
    pub fn new(secure: bool, host: impl Into<String>, port: u16) -> Self {
        Self {
            secure,
            host: host.into(),
            port,
            credential: None,
        }
    }

    /// Attaches a pairing code.
    ///
    /// # Errors
    ///
    /// Returns [`UrlError::InvalidCode`] unless `code` is six ASCII digits.
    pub fn with_code(mut self, code: &str) -> Result<Self, UrlError> {
        if !is_valid_pairing_code(code) {
            return Err(UrlError::InvalidCode);
        }
        self.credential = Some(JoinCredential::Code(code.to_string()));
        Ok(self)
    }

    /// Attaches a pre-issued token.
    pub fn with_token(mut self, token: SessionToken) -> Self {
        self.credential = Some(JoinCredential::Token(token));
        self
    }

    /// Parses a join URL.
    ///
    /// A missing port falls back to the scheme default (80 for `ws`, 443 for
    /// `wss`).  If both `code` and `token` are present the code wins.
    pub fn parse(text: &str) -> Result<Self, UrlError> {
        let url = Url::parse(text).map_err(|e| UrlError::Invalid(e.to_string()))?;

        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            other => return Err(UrlError::UnsupportedScheme(other.to_string())),
        };
        let host = url.host_str().ok_or(UrlError::MissingHost)?.to_string();
        let port = url
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let mut code = None;
        let mut token = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "token" => token = Some(value.into_owned()),
                _ => {}
            }
        }

        let credential = match (code, token) {
            (Some(code), _) => {
                if !is_valid_pairing_code(&code) {
                    return Err(UrlError::InvalidCode);
                }
                Some(JoinCredential::Code(code))
            }
            (None, Some(token)) if !token.is_empty() => {
                Some(JoinCredential::Token(SessionToken::from(token)))
            }
            _ => None,
        };

        Ok(Self {
            secure,
            host,
            port,
            credential,
        })
    }

    /// The bare socket address to dial, without any credential.
    pub fn socket_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.bracketed_host(), self.port)
    }

    fn scheme(&self) -> &'static str {
        if self.secure {
            "wss"
        } else {
            "ws"
        }
    }

    // IPv6 literals need brackets in the authority.
    fn bracketed_host(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

impl fmt::Display for ConnectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_url())?;
        match &self.credential {
            Some(JoinCredential::Code(code)) => write!(f, "?code={code}"),
            Some(JoinCredential::Token(token)) => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(token.as_str().as_bytes()).collect();
                write!(f, "?token={encoded}")
            }
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
