//! Service and port descriptions shared by state sources and the renderer.

use serde::{Deserialize, Serialize};

/// A port bound by a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    /// Protocol, e.g. "tcp" or "udp".
    #[serde(rename = "type", default = "default_protocol")]
    pub protocol: String,

    /// Public port number.
    pub port: u16,

    /// Address the port is reachable on. Empty when unknown.
    #[serde(default)]
    pub ip: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "tcp".to_string(),
            port,
            ip: String::new(),
        }
    }

    pub fn udp(port: u16) -> Self {
        Self {
            protocol: "udp".to_string(),
            port,
            ip: String::new(),
        }
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol.eq_ignore_ascii_case("tcp")
    }
}

/// One running instance of a service on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Instance id, unique per host.
    pub id: String,

    /// Logical service name. Derived from the image when empty.
    #[serde(default)]
    pub name: String,

    /// Container image the instance runs.
    #[serde(default)]
    pub image: String,

    /// Host the instance runs on.
    #[serde(default)]
    pub hostname: String,

    /// Bound ports.
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl Service {
    pub fn new(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            image: String::new(),
            hostname: hostname.into(),
            ports: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }
}

/// Logical name of a service: explicit name, else the image without registry and tag.
pub fn default_service_name(svc: &Service) -> String {
    if !svc.name.is_empty() {
        return svc.name.clone();
    }

    let repo = svc.image.rsplit('/').next().unwrap_or(&svc.image);
    let bare = repo.split(['@', ':']).next().unwrap_or(repo);
    bare.to_string()
}
