use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Remote storage backend types
///
/// Defined in core because configuration selects it and both the relay and the
/// web ingress build a backend from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteBackend {
    /// NAS reachable over WebDAV
    Webdav,
    /// NAS share mounted into the local filesystem
    Local,
}

impl FromStr for RemoteBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "webdav" => Ok(RemoteBackend::Webdav),
            "local" => Ok(RemoteBackend::Local),
            _ => Err(anyhow::anyhow!("Invalid storage backend: {}", s)),
        }
    }
}

impl Display for RemoteBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RemoteBackend::Webdav => write!(f, "webdav"),
            RemoteBackend::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("WebDAV".parse::<RemoteBackend>().unwrap(), RemoteBackend::Webdav);
        assert_eq!("local".parse::<RemoteBackend>().unwrap(), RemoteBackend::Local);
        assert!("s3".parse::<RemoteBackend>().is_err());
    }
}
