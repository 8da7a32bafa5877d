use thiserror::Error;

/// Why a single data tier could not produce a value.
///
/// These never escape the resolver as hard errors; they are logged and carried
/// in the resolution result so callers can tell "not logged in" from "server down".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transport-level failure (connection refused, timeout, TLS, ...).
    #[error("network failure: {0}")]
    Network(String),

    /// Non-2xx response status.
    #[error("http status {status}")]
    Http { status: u16 },

    /// 2xx response whose envelope reported `success: false`, or that lacked
    /// the expected field.
    #[error("application failure: {0}")]
    Application(String),

    /// Body or document was not valid JSON for the expected shape.
    #[error("decode failure: {0}")]
    Decode(String),

    /// Local fixture could not be read.
    #[error("io failure: {0}")]
    Io(String),

    /// Builtin default slot was configured without a value.
    #[error("no data available")]
    Missing,
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Short label used in logs and the tier column of reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Http { .. } => "http",
            FetchError::Application(_) => "application",
            FetchError::Decode(_) => "decode",
            FetchError::Io(_) => "io",
            FetchError::Missing => "missing",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            FetchError::Http {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        FetchError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NarrationError {
    /// Narration requested while the suggestion list is empty.
    #[error("no health suggestions to narrate")]
    EmptyContent,

    /// The engine failed for a reason other than an intentional stop.
    #[error("narration failed: {0}")]
    Engine(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid base url {0:?}")]
    BaseUrl(String),

    #[error("unknown timezone {0:?}")]
    Timezone(String),

    #[error("{field} = {value} is out of range ({range})")]
    OutOfRange {
        field: &'static str,
        value: String,
        range: String,
    },
}
