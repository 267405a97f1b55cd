//! Where the device roster comes from.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use onvif_model::Device;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::error::RosterError;

/// A full roster, either fixed or read from a watched file.
#[derive(Debug, Clone)]
pub enum RosterSource {
    Static(Vec<Device>),
    File(PathBuf),
}

impl RosterSource {
    /// The roster file when the config names one, the inline roster otherwise.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, RosterError> {
        if let Some(path) = &config.onvif_devices_json {
            return Ok(RosterSource::File(path.clone()));
        }

        let devices = match &config.onvif {
            Some(document) => parse_document(document.clone())?,
            None => {
                tracing::warn!("No devices configured");
                Vec::new()
            }
        };
        Ok(RosterSource::Static(devices))
    }

    pub async fn load(&self) -> Result<Vec<Device>, RosterError> {
        match self {
            RosterSource::Static(devices) => Ok(devices.clone()),
            RosterSource::File(path) => read_roster_file(path).await,
        }
    }
}

/// Read and validate a roster file. Invalid entries are skipped.
pub async fn read_roster_file(path: &Path) -> Result<Vec<Device>, RosterError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RosterError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let document: Value = serde_json::from_str(&json).map_err(|source| RosterError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    parse_document(document)
}

fn parse_document(document: Value) -> Result<Vec<Device>, RosterError> {
    let parsed = Device::parse_roster(document)?;
    for rejected in &parsed.rejected {
        tracing::warn!("Skipping roster entry: {}", rejected);
    }
    Ok(parsed.devices)
}

/// Modification time and length of a roster file, used to detect changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    /// `None` when the file cannot be inspected.
    pub async fn read(path: &Path) -> Option<Self> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        Some(FileStamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }
}

/// Polls a roster file and sends the full roster whenever it changes.
///
/// A change that cannot be read or parsed is logged and skipped; the
/// receiver keeps its current roster.
pub struct RosterWatcher {
    task: Option<JoinHandle<()>>,
}

impl RosterWatcher {
    /// Start polling `path`.
    ///
    /// `initial` is the stamp taken before the roster now in use was read, so
    /// an edit made after that read is picked up on the first poll.
    pub fn spawn(
        path: PathBuf,
        poll_interval: Duration,
        initial: Option<FileStamp>,
        updates: mpsc::Sender<Vec<Device>>,
    ) -> Self {
        tracing::info!(path = %path.display(), "Watching roster file");
        let task = tokio::spawn(Self::watch(path, poll_interval, initial, updates));
        Self { task: Some(task) }
    }

    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    async fn watch(
        path: PathBuf,
        poll_interval: Duration,
        mut last: Option<FileStamp>,
        updates: mpsc::Sender<Vec<Device>>,
    ) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let current = FileStamp::read(&path).await;
            if current == last {
                continue;
            }
            last = current;

            if current.is_none() {
                tracing::warn!(path = %path.display(), "Roster file disappeared, keeping current roster");
                continue;
            }

            tracing::info!(path = %path.display(), "Roster file changed");
            match read_roster_file(&path).await {
                Ok(devices) => {
                    if updates.send(devices).await.is_err() {
                        tracing::debug!("Roster receiver dropped, stopping watcher");
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to reload roster, keeping current roster: {}", e);
                }
            }
        }
    }
}

impl Drop for RosterWatcher {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[tokio::test]
    async fn test_read_roster_file_skips_bad_entries() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "porch", "hostname": "10.0.0.2", "port": 80}},
                {{"name": "garage", "hostname": "10.0.0.3"}},
                {{"name": "porch", "hostname": "10.0.0.9", "port": 80}}
            ]"#
        )
        .unwrap();

        let devices = read_roster_file(file.path()).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].hostname, "10.0.0.2");
    }

    #[tokio::test]
    async fn test_read_errors() {
        assert!(matches!(
            read_roster_file(Path::new("/nonexistent/devices.json")).await,
            Err(RosterError::Read { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[{{").unwrap();
        assert!(matches!(
            read_roster_file(file.path()).await,
            Err(RosterError::Parse { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "porch"}}"#).unwrap();
        assert!(matches!(
            read_roster_file(file.path()).await,
            Err(RosterError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_watcher_reports_edit_made_after_initial_stamp() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "porch", "hostname": "10.0.0.2", "port": 80}}]"#).unwrap();
        file.flush().unwrap();

        let initial = FileStamp::read(file.path()).await;
        assert!(initial.is_some());
        let devices = read_roster_file(file.path()).await.unwrap();
        assert_eq!(devices.len(), 1);

        // Edited between the initial read and the watcher starting.
        std::fs::write(
            file.path(),
            r#"[
                {"name": "porch", "hostname": "10.0.0.2", "port": 80},
                {"name": "garage", "hostname": "10.0.0.3", "port": 8080}
            ]"#,
        )
        .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        let mut watcher = RosterWatcher::spawn(
            file.path().to_path_buf(),
            Duration::from_millis(100),
            initial,
            tx,
        );

        let devices = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("edit reported")
            .unwrap();
        assert_eq!(devices.len(), 2);
        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_watcher_is_quiet_while_file_is_unchanged() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[]").unwrap();
        file.flush().unwrap();

        let initial = FileStamp::read(file.path()).await;
        let (tx, mut rx) = mpsc::channel(4);
        let mut watcher = RosterWatcher::spawn(
            file.path().to_path_buf(),
            Duration::from_millis(50),
            initial,
            tx,
        );

        assert!(tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .is_err());
        watcher.stop().await;
    }

    #[tokio::test]
    async fn test_source_from_config() {
        let config = BridgeConfig {
            onvif: Some(json!([{"name": "porch", "hostname": "10.0.0.2", "port": 80}])),
            ..BridgeConfig::default()
        };
        let source = RosterSource::from_config(&config).unwrap();
        assert!(matches!(source, RosterSource::Static(ref devices) if devices.len() == 1));
        assert_eq!(source.load().await.unwrap()[0].name.as_str(), "porch");

        let config = config.with_roster_file("/config/devices.json");
        assert!(matches!(
            RosterSource::from_config(&config).unwrap(),
            RosterSource::File(_)
        ));
    }
}
