//! Value objects shared by operations at their interface.

use std::fmt;

use bytes::Bytes;

/// Bucket type used when none is given explicitly.
pub const DEFAULT_BUCKET_TYPE: &str = "default";

/// A namespace in the store: bucket type plus bucket name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    bucket_type: Bytes,
    bucket: Bytes,
}

impl Namespace {
    pub fn new(bucket_type: impl Into<Bytes>, bucket: impl Into<Bytes>) -> Self {
        Self {
            bucket_type: bucket_type.into(),
            bucket: bucket.into(),
        }
    }

    /// Namespace under [`DEFAULT_BUCKET_TYPE`].
    pub fn with_default_type(bucket: impl Into<Bytes>) -> Self {
        Self::new(DEFAULT_BUCKET_TYPE, bucket)
    }

    pub fn bucket_type(&self) -> &[u8] {
        &self.bucket_type
    }

    pub fn bucket(&self) -> &[u8] {
        &self.bucket
    }
}

/// A remote endpoint identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAndPort {
    host: String,
    port: u16,
}

impl HostAndPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostAndPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_type_namespace() {
        let ns = Namespace::with_default_type("users");
        assert_eq!(ns.bucket_type(), b"default");
        assert_eq!(ns.bucket(), b"users");
    }

    #[test]
    fn test_host_and_port_display() {
        let hp = HostAndPort::new("10.0.0.1", 8087);
        assert_eq!(hp.to_string(), "10.0.0.1:8087");
    }
}
