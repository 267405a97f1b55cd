//! Reachability probes.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use onvif_model::Device;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use url::Url;

use crate::error::ProbeError;

const RTSP_DEFAULT_PORT: u16 = 554;

/// What a probe checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    /// ICMP echo against a hostname
    Host(String),
    /// Protocol handshake against a URL (`rtsp`, `http` or `https`)
    Url(Url),
}

impl ProbeTarget {
    /// The device's alternate probe URL when it declares a valid one, its
    /// hostname otherwise.
    pub fn for_device(device: &Device) -> Self {
        match device.probe_url() {
            Some(url) => ProbeTarget::Url(url),
            None => ProbeTarget::Host(device.hostname.clone()),
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Host(host) => f.write_str(host),
            ProbeTarget::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Reachability check with bounded latency.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns whether the target answered. Every failure means `false`.
    async fn probe(&self, target: &ProbeTarget) -> bool;
}

/// Prober backed by the system `ping` binary, an RTSP `OPTIONS` handshake or
/// an HTTP `HEAD` request.
#[derive(Debug, Clone)]
pub struct NetworkProber {
    connect_timeout: Duration,
    http: reqwest::Client,
}

impl NetworkProber {
    pub fn new(connect_timeout: Duration) -> Result<Self, ProbeError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout * 2)
            .no_proxy()
            .build()?;

        Ok(Self {
            connect_timeout,
            http,
        })
    }

    /// Run the probe and report why it failed.
    pub async fn check(&self, target: &ProbeTarget) -> Result<(), ProbeError> {
        match target {
            ProbeTarget::Host(host) => self.ping(host).await,
            ProbeTarget::Url(url) => match url.scheme() {
                "rtsp" => self.rtsp_options(url).await,
                "http" | "https" => self.http_head(url).await,
                other => Err(ProbeError::Unsupported(format!("{other} URL"))),
            },
        }
    }

    async fn ping(&self, host: &str) -> Result<(), ProbeError> {
        if host.is_empty() || host.starts_with('-') {
            return Err(ProbeError::Unsupported(format!("host {host:?}")));
        }

        let wait = self.connect_timeout.as_secs().max(1).to_string();
        let child = Command::new("ping")
            .args(["-c", "1", "-W", wait.as_str(), host])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let status = timeout(self.connect_timeout + Duration::from_secs(1), child)
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(ProbeError::Spawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(ProbeError::Status(format!("ping exited with {status}")))
        }
    }

    async fn rtsp_options(&self, url: &Url) -> Result<(), ProbeError> {
        let host = url
            .host_str()
            .ok_or_else(|| ProbeError::Unsupported(format!("URL without host: {url}")))?;
        let port = url.port().unwrap_or(RTSP_DEFAULT_PORT);

        let stream = timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProbeError::Timeout)?
            .map_err(ProbeError::Connect)?;
        let (reader, mut writer) = stream.into_split();

        let request = format!("OPTIONS {url} RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: onvif-relay\r\n\r\n");
        writer
            .write_all(request.as_bytes())
            .await
            .map_err(ProbeError::Connect)?;

        let mut status_line = String::new();
        timeout(
            self.connect_timeout,
            BufReader::new(reader).read_line(&mut status_line),
        )
        .await
        .map_err(|_| ProbeError::Timeout)?
        .map_err(ProbeError::Connect)?;

        if is_success_status_line(&status_line) {
            Ok(())
        } else {
            Err(ProbeError::Status(status_line.trim_end().to_string()))
        }
    }

    async fn http_head(&self, url: &Url) -> Result<(), ProbeError> {
        let response = self.http.head(url.clone()).send().await?;
        if response.status() == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(ProbeError::Status(response.status().to_string()))
        }
    }
}

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, target: &ProbeTarget) -> bool {
        match self.check(target).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(probe = %target, "Probe failed: {}", e);
                false
            }
        }
    }
}

/// Whether an RTSP or HTTP status line reports `200`.
pub fn is_success_status_line(line: &str) -> bool {
    let mut parts = line.split_whitespace();
    matches!(
        (parts.next(), parts.next()),
        (Some(protocol), Some("200")) if protocol.starts_with("RTSP/") || protocol.starts_with("HTTP/")
    )
}
