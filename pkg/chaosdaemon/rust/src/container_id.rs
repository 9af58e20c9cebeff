// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};

/// The container runtimes a container ID can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    Docker,
    Containerd,
    Crio,
}

impl RuntimeKind {
    pub const ALL: [RuntimeKind; 3] = [
        RuntimeKind::Docker,
        RuntimeKind::Containerd,
        RuntimeKind::Crio,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker",
            RuntimeKind::Containerd => "containerd",
            RuntimeKind::Crio => "crio",
        }
    }

    /// Scheme prefix carried by container IDs of this runtime.
    pub fn scheme(self) -> &'static str {
        match self {
            RuntimeKind::Docker => "docker://",
            RuntimeKind::Containerd => "containerd://",
            RuntimeKind::Crio => "crio://",
        }
    }

    /// Strips this runtime's scheme from `container_id`, returning the native
    /// ID untouched. The native ID itself is validated by the runtime.
    pub fn format_container_id(self, container_id: &str) -> Result<&str> {
        let scheme = self.scheme();
        if container_id.len() < scheme.len() {
            return Err(Error::InvalidFormat {
                id: container_id.to_string(),
                runtime: self,
            });
        }

        match container_id.split_at_checked(scheme.len()) {
            Some((prefix, native_id)) if prefix == scheme => Ok(native_id),
            Some((prefix, _)) => Err(Error::SchemeMismatch {
                expected: scheme,
                got: prefix.to_string(),
            }),
            // The prefix ends inside a multi-byte character, so it can't match.
            None => Err(Error::SchemeMismatch {
                expected: scheme,
                got: container_id.chars().take(scheme.len()).collect(),
            }),
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuntimeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        RuntimeKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnsupportedRuntime(s.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_own_scheme() {
        for kind in RuntimeKind::ALL {
            let id = format!("{}abc123", kind.scheme());
            assert_eq!(kind.format_container_id(&id).unwrap(), "abc123");
        }
    }

    #[test]
    fn test_native_id_is_returned_unmodified() {
        let id = "containerd://  weird/ID:with.chars  ";
        assert_eq!(
            RuntimeKind::Containerd.format_container_id(id).unwrap(),
            "  weird/ID:with.chars  "
        );
    }

    #[test]
    fn test_empty_native_id() {
        assert_eq!(
            RuntimeKind::Crio.format_container_id("crio://").unwrap(),
            ""
        );
    }

    #[test]
    fn test_too_short() {
        let err = RuntimeKind::Containerd
            .format_container_id("docker://")
            .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidFormat {
                id: "docker://".to_string(),
                runtime: RuntimeKind::Containerd,
            }
        );
        assert_eq!(
            err.to_string(),
            "container id docker:// is not a containerd container id"
        );
    }

    #[test]
    fn test_wrong_scheme() {
        let err = RuntimeKind::Crio
            .format_container_id("docker://abc")
            .unwrap_err();
        assert_eq!(
            err,
            Error::SchemeMismatch {
                expected: "crio://",
                got: "docker:".to_string(),
            }
        );

        let err = RuntimeKind::Docker
            .format_container_id("containerd://abc")
            .unwrap_err();
        assert!(matches!(err, Error::SchemeMismatch { expected: "docker://", .. }));
    }

    #[test]
    fn test_scheme_is_case_sensitive() {
        let err = RuntimeKind::Docker
            .format_container_id("DOCKER://abc")
            .unwrap_err();
        assert!(matches!(err, Error::SchemeMismatch { .. }));
    }

    #[test]
    fn test_multibyte_prefix_does_not_panic() {
        let err = RuntimeKind::Crio
            .format_container_id("crio:/\u{e9}abcdef")
            .unwrap_err();
        assert!(matches!(err, Error::SchemeMismatch { .. }));
    }

    #[test]
    fn test_parse_runtime_name() {
        assert_eq!("docker".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert_eq!(
            "containerd".parse::<RuntimeKind>().unwrap(),
            RuntimeKind::Containerd
        );
        assert_eq!("crio".parse::<RuntimeKind>().unwrap(), RuntimeKind::Crio);

        let err = "gvisor".parse::<RuntimeKind>().unwrap_err();
        assert_eq!(err, Error::UnsupportedRuntime("gvisor".to_string()));
        assert!(err.to_string().contains("gvisor"));
    }
}
