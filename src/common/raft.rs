//! Cluster membership and log types shared between the coordinator and the engine

use crate::common::{Error, Result};
use std::fmt;

/// Cluster-unique server identifier
pub type ServerId = u64;

/// Identity of this node inside the cluster configuration.
///
/// Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub server_id: ServerId,
    /// Address advertised to peers
    pub address: String,
}

impl NodeIdentity {
    pub fn new(server_id: ServerId, address: impl Into<String>) -> Self {
        Self {
            server_id,
            address: address.into(),
        }
    }

    pub fn as_server(&self) -> Server {
        Server {
            server_id: self.server_id,
            addresses: self.address.clone(),
        }
    }
}

/// One member of a cluster configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Server {
    pub server_id: ServerId,
    pub addresses: String,
}

/// Ordered list of members plus the id of the log entry that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfiguration {
    pub id: u64,
    pub servers: Vec<Server>,
}

impl ClusterConfiguration {
    pub fn contains(&self, server_id: ServerId) -> bool {
        self.servers.iter().any(|s| s.server_id == server_id)
    }

    /// Member list with `server` added, or its address replaced when the id
    /// is already present. Order of existing members is preserved.
    pub fn with_server(&self, server: Server) -> Vec<Server> {
        let mut servers = self.servers.clone();
        match servers.iter_mut().find(|s| s.server_id == server.server_id) {
            Some(existing) => existing.addresses = server.addresses,
            None => servers.push(server),
        }
        servers
    }
}

impl fmt::Display for ClusterConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [", self.id)?;
        for (i, s) in self.servers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}@{}", s.server_id, s.addresses)?;
        }
        write!(f, "]")
    }
}

/// Payload of `POST /join`: `"<server_id>,<address>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub server_id: ServerId,
    pub address: String,
}

impl JoinRequest {
    pub fn new(server_id: ServerId, address: impl Into<String>) -> Self {
        Self {
            server_id,
            address: address.into(),
        }
    }

    /// Parse a join body. Exactly two comma-separated fields are accepted.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(body)
            .map_err(|_| Error::InvalidJoinRequest("body is not valid UTF-8".into()))?;
        let fields: Vec<&str> = text.trim().split(',').collect();
        if fields.len() != 2 {
            return Err(Error::InvalidJoinRequest(format!(
                "expected 2 comma-separated fields, got {}",
                fields.len()
            )));
        }

        let server_id: ServerId = fields[0].trim().parse().map_err(|_| {
            Error::InvalidJoinRequest(format!("invalid server id: {:?}", fields[0]))
        })?;
        if server_id == 0 {
            return Err(Error::InvalidJoinRequest("server id must be positive".into()));
        }

        let address = fields[1].trim();
        if address.is_empty() {
            return Err(Error::InvalidJoinRequest("address is empty".into()));
        }

        Ok(Self::new(server_id, address))
    }

    pub fn encode(&self) -> String {
        format!("{},{}", self.server_id, self.address)
    }

    pub fn into_server(self) -> Server {
        Server {
            server_id: self.server_id,
            addresses: self.address,
        }
    }
}

impl From<&NodeIdentity> for JoinRequest {
    fn from(identity: &NodeIdentity) -> Self {
        Self::new(identity.server_id, identity.address.clone())
    }
}

/// Entry in the in-process engine's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    Configuration { index: u64, config: ClusterConfiguration },
    Data { index: u64, data: Vec<u8> },
}

impl LogEntry {
    pub fn index(&self) -> u64 {
        match self {
            LogEntry::Configuration { index, .. } | LogEntry::Data { index, .. } => *index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join_request() {
        let req = JoinRequest::parse(b"2,127.0.0.1:9002").unwrap();
        assert_eq!(req.server_id, 2);
        assert_eq!(req.address, "127.0.0.1:9002");
        assert_eq!(req.encode(), "2,127.0.0.1:9002");
    }

    #[test]
    fn test_parse_join_request_trims_whitespace() {
        let req = JoinRequest::parse(b" 7 , node7:6001\n").unwrap();
        assert_eq!(req, JoinRequest::new(7, "node7:6001"));
    }

    #[test]
    fn test_parse_join_request_rejects_field_count() {
        for body in [&b"2"[..], b"2,a,b", b""] {
            assert!(matches!(
                JoinRequest::parse(body),
                Err(Error::InvalidJoinRequest(_))
            ));
        }
    }

    #[test]
    fn test_parse_join_request_rejects_bad_fields() {
        assert!(JoinRequest::parse(b"abc,host:1").is_err());
        assert!(JoinRequest::parse(b"0,host:1").is_err());
        assert!(JoinRequest::parse(b"3, ").is_err());
        assert!(JoinRequest::parse(&[0xff, b',', b'a']).is_err());
    }

    #[test]
    fn test_with_server_appends_or_replaces() {
        let config = ClusterConfiguration {
            id: 4,
            servers: vec![NodeIdentity::new(1, "a:1").as_server()],
        };

        let added = config.with_server(NodeIdentity::new(2, "b:2").as_server());
        assert_eq!(added.len(), 2);
        assert_eq!(added[1].server_id, 2);

        let replaced = config.with_server(NodeIdentity::new(1, "a:9").as_server());
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].addresses, "a:9");
    }

    #[test]
    fn test_configuration_display() {
        let config = ClusterConfiguration {
            id: 3,
            servers: vec![
                NodeIdentity::new(1, "a:1").as_server(),
                NodeIdentity::new(2, "b:2").as_server(),
            ],
        };
        assert_eq!(config.to_string(), "#3 [1@a:1, 2@b:2]");
    }
}
