//! Config rendering from the services state.
//!
//! # Responsibilities
//! - Keep only services that bind at least one port
//! - Collect distinct TCP ports per service
//! - Execute the on-disk template against that projection
//!
//! # Template context
//! - `services`: service name → list of instances
//! - `ports(name)`: sorted TCP ports of a service
//! - `bind_ip()`: configured frontend address
//! - `sanitize_name(s)`: function and filter, maps to `[a-z0-9-]`
//! - `now()`: render time, RFC 3339 UTC

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, SecondsFormat, Utc};
use minijinja::{context, Environment};
use regex::Regex;
use thiserror::Error;

use crate::config::HaproxyConfig;
use crate::state::{Service, ServicesState, StateError};

/// Service name → instances that bind ports.
pub type ServiceMap = BTreeMap<String, Vec<Service>>;

/// Service name → distinct TCP ports.
pub type PortMap = BTreeMap<String, BTreeSet<u16>>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read template {path:?}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse template: {0}")]
    Parse(#[source] minijinja::Error),

    #[error("failed to execute template: {0}")]
    Execute(#[source] minijinja::Error),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

static INVALID_NAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9-]").expect("static pattern is valid"));

/// Make a name safe for use as a frontend/backend identifier.
pub fn sanitize_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(&name.to_lowercase(), "-").into_owned()
}

/// Group instances by service name, dropping those without ports.
pub fn services_with_ports(state: &dyn ServicesState) -> Result<ServiceMap, StateError> {
    let mut services = ServiceMap::new();
    state.each_service_sorted(&mut |svc| {
        if svc.ports.is_empty() {
            return;
        }
        services
            .entry(state.service_name(svc))
            .or_default()
            .push(svc.clone());
    })?;
    Ok(services)
}

/// Distinct TCP ports bound by each service.
pub fn make_port_map(services: &ServiceMap) -> PortMap {
    services
        .iter()
        .map(|(name, instances)| {
            let ports = instances
                .iter()
                .flat_map(|svc| svc.ports.iter())
                .filter(|p| p.is_tcp())
                .map(|p| p.port)
                .collect();
            (name.clone(), ports)
        })
        .collect()
}

/// Renders the load balancer config from a template on disk.
#[derive(Debug, Clone)]
pub struct ConfigRenderer {
    template: PathBuf,
    bind_ip: String,
}

impl ConfigRenderer {
    pub fn new(template: impl Into<PathBuf>, bind_ip: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            bind_ip: bind_ip.into(),
        }
    }

    pub fn from_config(config: &HaproxyConfig) -> Self {
        Self::new(&config.template, &config.bind_ip)
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    /// Render to `out` using the current time.
    pub fn render(
        &self,
        state: &dyn ServicesState,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        self.render_at(state, Utc::now(), out)
    }

    /// Render to `out` with a fixed render time.
    ///
    /// Template read and parse errors happen before anything is written.
    /// Output produced before an execution error is left in `out`.
    pub fn render_at(
        &self,
        state: &dyn ServicesState,
        now: DateTime<Utc>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let source = fs::read_to_string(&self.template).map_err(|source| RenderError::TemplateRead {
            path: self.template.clone(),
            source,
        })?;
        let name = self
            .template
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "haproxy".to_string());

        let services = services_with_ports(state)?;
        let ports = Arc::new(make_port_map(&services));

        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.add_function("ports", move |service: &str| -> Vec<u16> {
            ports
                .get(service)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        });
        let bind_ip = self.bind_ip.clone();
        env.add_function("bind_ip", move || bind_ip.clone());
        env.add_function("sanitize_name", |s: &str| sanitize_name(s));
        env.add_filter("sanitize_name", |s: &str| sanitize_name(s));
        let rendered_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        env.add_function("now", move || rendered_at.clone());

        let template = env
            .template_from_named_str(&name, &source)
            .map_err(RenderError::Parse)?;
        template
            .render_to_write(context! { services => services }, out)
            .map_err(RenderError::Execute)?;
        Ok(())
    }

    /// Render and replace `path` only if rendering succeeded.
    pub fn render_to_file(
        &self,
        state: &dyn ServicesState,
        path: &Path,
    ) -> Result<(), RenderError> {
        let mut buf = Vec::new();
        self.render(state, &mut buf)?;
        write_replace(path, &buf).map_err(|source| RenderError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = ?path, bytes = buf.len(), "Wrote proxy config");
        Ok(())
    }
}

/// Write through a sibling temp file so readers never see a partial config.
fn write_replace(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "config path has no file name")
    })?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}
