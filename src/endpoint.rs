use std::str::FromStr;
use std::time::Duration;

use url::Url;

/// Default Modbus TCP port
pub const DEFAULT_PORT: u16 = 502;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
const DEFAULT_SIZE: usize = 4096;

/// Where a client connects to or a server listens, plus the protocol settings
/// that ride along in the connection string
///
/// Parsed from `scheme://host[:port][?key=value&...]` where the scheme is
/// `modbus` or `modbus-tcp`. Recognized parameters: `res_timeout_ms` /
/// `req_timeout_ms` (client response / server request timeout in
/// milliseconds) and `size` (server register capacity).
///
/// Immutable once a client or server has been constructed from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    timeout: Duration,
    size: usize,
}

impl Endpoint {
    /// Create an endpoint for the given host and port with default settings
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout: DEFAULT_TIMEOUT,
            size: DEFAULT_SIZE,
        }
    }

    /// Replace the request/response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the register capacity used when constructing a server
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request/response timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register capacity used when constructing a server
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Errors that occur while parsing an endpoint string
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndpointError {
    /// The string is not a valid URL
    Syntax,
    /// The scheme is not a supported protocol
    UnknownScheme(String),
    /// The URL does not contain a host
    MissingHost,
    /// A recognized parameter has an unparsable value
    InvalidParameter(String),
    /// The query contains a parameter that is not recognized
    UnknownParameter(String),
}

impl std::error::Error for EndpointError {}

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            EndpointError::Syntax => f.write_str("endpoint is not a valid URL"),
            EndpointError::UnknownScheme(scheme) => {
                write!(f, "unsupported scheme: {scheme}")
            }
            EndpointError::MissingHost => f.write_str("endpoint does not contain a host"),
            EndpointError::InvalidParameter(key) => {
                write!(f, "parameter {key} has an unparsable value")
            }
            EndpointError::UnknownParameter(key) => write!(f, "unknown parameter: {key}"),
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|_| EndpointError::Syntax)?;

        match url.scheme() {
            "modbus" | "modbus-tcp" => {}
            other => return Err(EndpointError::UnknownScheme(other.to_string())),
        }

        let host = url
            .host_str()
            .ok_or(EndpointError::MissingHost)?
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_PORT);

        let mut timeout = DEFAULT_TIMEOUT;
        let mut size = DEFAULT_SIZE;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "res_timeout_ms" | "req_timeout_ms" => {
                    let ms: u64 = value
                        .parse()
                        .map_err(|_| EndpointError::InvalidParameter(key.to_string()))?;
                    timeout = Duration::from_millis(ms);
                }
                "size" => {
                    size = value
                        .parse()
                        .map_err(|_| EndpointError::InvalidParameter(key.to_string()))?;
                }
                _ => return Err(EndpointError::UnknownParameter(key.to_string())),
            }
        }

        Ok(Endpoint {
            host,
            port,
            timeout,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_with_defaults() {
        let endpoint: Endpoint = "modbus-tcp://10.0.0.5:1502".parse().unwrap();
        assert_eq!(endpoint.host(), "10.0.0.5");
        assert_eq!(endpoint.port(), 1502);
        assert_eq!(endpoint.timeout(), Duration::from_millis(1000));
        assert_eq!(endpoint.size(), 4096);
    }

    #[test]
    fn missing_port_defaults_to_502() {
        let endpoint: Endpoint = "modbus://device.local".parse().unwrap();
        assert_eq!(endpoint.port(), DEFAULT_PORT);
    }

    #[test]
    fn parses_timeout_and_size_parameters() {
        let endpoint: Endpoint = "modbus-tcp://10.0.0.5?res_timeout_ms=200&size=16"
            .parse()
            .unwrap();
        assert_eq!(endpoint.timeout(), Duration::from_millis(200));
        assert_eq!(endpoint.size(), 16);
    }

    #[test]
    fn req_timeout_is_an_alias_for_the_timeout() {
        let endpoint: Endpoint = "modbus-tcp://10.0.0.5?req_timeout_ms=50".parse().unwrap();
        assert_eq!(endpoint.timeout(), Duration::from_millis(50));
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = "dnp3://10.0.0.5".parse::<Endpoint>().err().unwrap();
        assert_eq!(err, EndpointError::UnknownScheme("dnp3".to_string()));
    }

    #[test]
    fn rejects_unknown_parameter() {
        let err = "modbus-tcp://10.0.0.5?bogus=1".parse::<Endpoint>().err().unwrap();
        assert_eq!(err, EndpointError::UnknownParameter("bogus".to_string()));
    }

    #[test]
    fn rejects_unparsable_timeout() {
        let err = "modbus-tcp://10.0.0.5?res_timeout_ms=fast"
            .parse::<Endpoint>()
            .err()
            .unwrap();
        assert_eq!(
            err,
            EndpointError::InvalidParameter("res_timeout_ms".to_string())
        );
    }
}
