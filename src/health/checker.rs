//! Pluggable check execution.
//!
//! # Responsibilities
//! - Define the `Checker` capability (args in, status or error out)
//! - Provide the built-in variants: placeholder, HTTP, TCP, script
//! - Resolve a variant from the configured type tag
//!
//! # Design Decisions
//! - A returned status means the resource answered; an error means the probe itself failed
//! - Every run gets a cancellation token; implementations must stop promptly when it fires
//! - Checkers hold no state shared with other checks

use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::health::check::Status;

/// Errors raised while executing a check.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The run exceeded its deadline.
    #[error("check timed out after {0:?}")]
    Timeout(Duration),

    /// The run was cancelled before completion.
    #[error("check cancelled")]
    Cancelled,

    /// The args could not be interpreted by this checker.
    #[error("invalid check arguments '{args}': {reason}")]
    InvalidArgs { args: String, reason: String },

    /// Network level failure reaching the resource.
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    /// HTTP transport failure.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The check script could not be spawned or returned an unmapped exit code.
    #[error("script failed: {0}")]
    Script(String),

    /// No checker registered under this type tag.
    #[error("unknown check type '{0}'")]
    UnknownType(String),
}

/// Capability that performs a single health probe.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Execute the probe with the check's configured arguments.
    async fn run(&self, args: &str, cancel: &CancellationToken) -> Result<Status, CheckError>;
}

/// Placeholder that always reports healthy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHealthy;

#[async_trait]
impl Checker for AlwaysHealthy {
    async fn run(&self, _args: &str, _cancel: &CancellationToken) -> Result<Status, CheckError> {
        Ok(Status::Healthy)
    }
}

/// HTTP GET probe. `args` is the URL to fetch.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Checker for HttpChecker {
    async fn run(&self, args: &str, cancel: &CancellationToken) -> Result<Status, CheckError> {
        let url = args.trim();
        if url.is_empty() {
            return Err(CheckError::InvalidArgs {
                args: args.to_string(),
                reason: "missing URL".to_string(),
            });
        }

        let request = self
            .client
            .get(url)
            .header("user-agent", "healthsync-check")
            .timeout(self.timeout)
            .send();

        let response = tokio::select! {
            res = request => res?,
            _ = cancel.cancelled() => return Err(CheckError::Cancelled),
        };

        let status = response.status();
        if status.is_success() {
            Ok(Status::Healthy)
        } else {
            tracing::debug!(url = %url, status = %status, "HTTP check returned non-success status");
            Ok(Status::Sickly)
        }
    }
}

/// TCP connect probe. `args` is `host:port`.
#[derive(Debug, Clone, Copy)]
pub struct TcpChecker {
    timeout: Duration,
}

impl TcpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Checker for TcpChecker {
    async fn run(&self, args: &str, cancel: &CancellationToken) -> Result<Status, CheckError> {
        let addr = args.trim();
        let valid = addr
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(CheckError::InvalidArgs {
                args: args.to_string(),
                reason: "expected host:port".to_string(),
            });
        }

        let connect = tokio::time::timeout(self.timeout, TcpStream::connect(addr));
        let result = tokio::select! {
            res = connect => res,
            _ = cancel.cancelled() => return Err(CheckError::Cancelled),
        };

        match result {
            Ok(Ok(_stream)) => Ok(Status::Healthy),
            Ok(Err(e)) => match e.kind() {
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted => {
                    tracing::debug!(addr = %addr, error = %e, "TCP check refused");
                    Ok(Status::Sickly)
                }
                _ => Err(CheckError::Connect(e)),
            },
            Err(_) => Err(CheckError::Timeout(self.timeout)),
        }
    }
}

/// Shell script probe. `args` is the command line.
///
/// Exit codes follow the status codes: 0 healthy, 1 sickly, 2 failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptChecker;

#[async_trait]
impl Checker for ScriptChecker {
    async fn run(&self, args: &str, cancel: &CancellationToken) -> Result<Status, CheckError> {
        if args.trim().is_empty() {
            return Err(CheckError::InvalidArgs {
                args: args.to_string(),
                reason: "missing command".to_string(),
            });
        }

        let child = Command::new("/bin/bash")
            .arg("-c")
            .arg(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let exit = tokio::select! {
            res = child => res.map_err(|e| CheckError::Script(e.to_string()))?,
            _ = cancel.cancelled() => return Err(CheckError::Cancelled),
        };

        match exit.code() {
            Some(0) => Ok(Status::Healthy),
            Some(1) => Ok(Status::Sickly),
            Some(2) => Ok(Status::Failed),
            Some(code) => Err(CheckError::Script(format!("exit code {code}"))),
            None => Err(CheckError::Script("terminated by signal".to_string())),
        }
    }
}

/// Build the checker registered under `check_type`.
pub fn checker_for_type(
    check_type: &str,
    timeout: Duration,
) -> Result<Box<dyn Checker>, CheckError> {
    match check_type {
        "always" => Ok(Box::new(AlwaysHealthy)),
        "http" => Ok(Box::new(HttpChecker::new(timeout))),
        "tcp" => Ok(Box::new(TcpChecker::new(timeout))),
        "script" => Ok(Box::new(ScriptChecker)),
        other => Err(CheckError::UnknownType(other.to_string())),
    }
}

/// Type tags accepted by [`checker_for_type`].
pub const CHECK_TYPES: &[&str] = &["always", "http", "tcp", "script"];

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_always_healthy() {
        let token = CancellationToken::new();
        let status = AlwaysHealthy.run("anything", &token).await.unwrap();
        assert_eq!(status, Status::Healthy);
    }

    #[tokio::test]
    async fn test_tcp_checker_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let checker = TcpChecker::new(Duration::from_secs(1));
        let status = checker.run(&addr.to_string(), &CancellationToken::new()).await.unwrap();
        assert_eq!(status, Status::Healthy);
    }

    #[tokio::test]
    async fn test_tcp_checker_refused_is_sickly() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let checker = TcpChecker::new(Duration::from_secs(1));
        let status = checker.run(&addr.to_string(), &CancellationToken::new()).await.unwrap();
        assert_eq!(status, Status::Sickly);
    }

    #[tokio::test]
    async fn test_tcp_checker_invalid_args() {
        let checker = TcpChecker::new(Duration::from_secs(1));
        let err = checker.run("no-port-here", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, CheckError::InvalidArgs { .. }));
    }

    #[tokio::test]
    async fn test_http_checker_statuses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut n = 0;
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let line = if n == 0 { "200 OK" } else { "503 Service Unavailable" };
                n += 1;
                let resp =
                    format!("HTTP/1.1 {line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
                let _ = socket.write_all(resp.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        let checker = HttpChecker::new(Duration::from_secs(2));
        let url = format!("http://{addr}/health");
        let token = CancellationToken::new();
        assert_eq!(checker.run(&url, &token).await.unwrap(), Status::Healthy);
        assert_eq!(checker.run(&url, &token).await.unwrap(), Status::Sickly);
    }

    #[tokio::test]
    async fn test_http_checker_accepts_https_urls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        // TLS support is compiled in, so the request reaches the connect stage.
        let checker = HttpChecker::new(Duration::from_secs(1));
        let url = format!("https://{addr}/health");
        let err = checker.run(&url, &CancellationToken::new()).await.unwrap_err();
        let e = match err {
            CheckError::Http(e) => e,
            other => panic!("unexpected error: {other}"),
        };
        assert!(e.is_connect(), "unexpected error: {e}");

        let mut chain = Vec::new();
        let mut source: Option<&dyn std::error::Error> = Some(&e);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        assert!(
            !chain.iter().any(|m| m.contains("scheme is not http")),
            "https rejected: {chain:?}"
        );
    }

    #[tokio::test]
    async fn test_script_checker_exit_codes() {
        let token = CancellationToken::new();
        assert_eq!(ScriptChecker.run("exit 0", &token).await.unwrap(), Status::Healthy);
        assert_eq!(ScriptChecker.run("exit 1", &token).await.unwrap(), Status::Sickly);
        assert_eq!(ScriptChecker.run("exit 2", &token).await.unwrap(), Status::Failed);
        assert!(matches!(
            ScriptChecker.run("exit 9", &token).await,
            Err(CheckError::Script(_))
        ));
    }

    #[tokio::test]
    async fn test_script_checker_cancelled() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let err = ScriptChecker.run("sleep 10", &token).await.unwrap_err();
        assert!(matches!(err, CheckError::Cancelled));
    }

    #[test]
    fn test_checker_for_type() {
        for t in CHECK_TYPES {
            assert!(checker_for_type(t, Duration::from_secs(1)).is_ok());
        }
        assert!(matches!(
            checker_for_type("carrier-pigeon", Duration::from_secs(1)),
            Err(CheckError::UnknownType(_))
        ));
    }
}
