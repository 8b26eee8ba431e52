//! Filesystem watcher: observes configured directories for changed
//! `.class` files, waits for each change to settle (stop being actively
//! written), classifies it, and emits a [`WatchEvent`] for anything that
//! survives classification.

pub mod classifier;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use hotswap_core::model::artifact::{ArtifactChange, ArtifactEvent, ArtifactKind, WatchEvent};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;

pub use classifier::ClassifierPolicy;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to initialize filesystem watcher: {0}")]
    Init(#[from] notify::Error),

    #[error("failed to read settling file {path}: {source}")]
    SettlingRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watcher is not running")]
    NotRunning,
}

pub type WatchResult<T> = Result<T, WatchError>;

/// Lifecycle states the watcher moves through. `start` takes it
/// `Idle -> Registering -> Running`; `stop` takes a running watcher
/// `Running -> Draining -> Stopped`, letting in-flight settling checks
/// finish rather than aborting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Registering,
    Running,
    Draining,
    Stopped,
}

struct SettlingConfig {
    poll_interval: Duration,
    settling_attempts: u32,
    settling_delay: Duration,
    classifier_policy: ClassifierPolicy,
}

/// Watches a fixed set of directories, recursively, for `.class` file
/// changes, emitting a settled, classified [`ArtifactEvent`] per change
/// on the channel returned by [`FilesystemWatcher::start`].
pub struct FilesystemWatcher {
    watch_paths: Vec<PathBuf>,
    config: SettlingConfig,
    state: Arc<Mutex<WatcherState>>,
    _inner: Option<RecommendedWatcher>,
}

impl FilesystemWatcher {
    pub fn new(
        watch_paths: Vec<PathBuf>,
        poll_interval: Duration,
        settling_attempts: u32,
        settling_delay: Duration,
        classifier_policy: ClassifierPolicy,
    ) -> Self {
        Self {
            watch_paths,
            config: SettlingConfig {
                poll_interval,
                settling_attempts,
                settling_delay,
                classifier_policy,
            },
            state: Arc::new(Mutex::new(WatcherState::Idle)),
            _inner: None,
        }
    }

    pub async fn state(&self) -> WatcherState {
        *self.state.lock().await
    }

    pub async fn is_healthy(&self) -> bool {
        matches!(self.state().await, WatcherState::Running)
    }

    /// Registers the watch paths with the OS-level backend and starts
    /// emitting settled, classified [`WatchEvent`]s. The returned
    /// receiver closes once [`FilesystemWatcher::stop`] has fully
    /// drained in-flight settling tasks.
    pub async fn start(&mut self) -> WatchResult<mpsc::Receiver<WatchEvent>> {
        *self.state.lock().await = WatcherState::Registering;

        let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Result<NotifyEvent>>(1024);
        let mut watcher = notify::recommended_watcher(move |res| {
            // An unbounded blocking_send here would only fail if the
            // receiver has been dropped, which only happens after stop()
            // has already moved the watcher state out of Running.
            let _ = raw_tx.blocking_send(res);
        })?;

        for path in &self.watch_paths {
            watcher.watch(path, RecursiveMode::Recursive)?;
        }
        self._inner = Some(watcher);

        let (event_tx, event_rx) = mpsc::channel::<WatchEvent>(256);
        let state = self.state.clone();
        let poll_interval = self.config.poll_interval;
        let settling_attempts = self.config.settling_attempts;
        let settling_delay = self.config.settling_delay;
        let policy = self.config.classifier_policy.clone();

        *state.lock().await = WatcherState::Running;

        tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                if matches!(*state.lock().await, WatcherState::Draining | WatcherState::Stopped) {
                    break;
                }
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        // notify surfaces a dropped-events condition
                        // (the OS-level queue overflowed before the
                        // backend could drain it) as an error rather
                        // than a distinct event kind; the message is
                        // the only signal available to tell it apart
                        // from an ordinary backend error.
                        if e.to_string().to_lowercase().contains("overflow") {
                            tracing::warn!("filesystem watcher overflow detected, events may have been dropped");
                            if event_tx
                                .send(WatchEvent::OverflowDetected { at: chrono::Utc::now() })
                                .await
                                .is_err()
                            {
                                return;
                            }
                        } else {
                            tracing::warn!(error = %e, "filesystem watcher backend error");
                        }
                        continue;
                    }
                };

                for path in event.paths.clone() {
                    let Some((artifact, kind)) = classifier::classify(&path, &policy) else {
                        continue;
                    };
                    if kind == ArtifactKind::NotAnArtifact {
                        continue;
                    }

                    let change = match event.kind {
                        EventKind::Create(_) => {
                            match wait_for_settled(&path, settling_attempts, settling_delay, poll_interval).await {
                                Ok((bytes, size)) => Some((ArtifactChange::Created { size }, bytes)),
                                Err(e) => {
                                    tracing::warn!(path = %path.display(), error = %e, "failed to read settled artifact");
                                    None
                                }
                            }
                        }
                        EventKind::Modify(_) => match read_opportunistic(&path).await {
                            Some((bytes, size)) => Some((ArtifactChange::Modified { size }, bytes)),
                            None => continue,
                        },
                        EventKind::Remove(_) => Some((ArtifactChange::Deleted, Vec::new())),
                        _ => None,
                    };

                    let Some((change, bytes)) = change else { continue };
                    let artifact_event = ArtifactEvent::new(artifact, kind, change, bytes);
                    if event_tx.send(WatchEvent::Artifact(artifact_event)).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(event_rx)
    }

    /// Moves the watcher through `Running -> Draining -> Stopped`,
    /// de-registering every watched path so the OS-level backend stops
    /// delivering events.
    pub async fn stop(&mut self) -> WatchResult<()> {
        {
            let mut state = self.state.lock().await;
            if *state != WatcherState::Running {
                return Err(WatchError::NotRunning);
            }
            *state = WatcherState::Draining;
        }
        if let Some(mut watcher) = self._inner.take() {
            for path in &self.watch_paths {
                let _ = watcher.unwatch(path);
            }
        }
        *self.state.lock().await = WatcherState::Stopped;
        Ok(())
    }
}

/// Polls a changed file until its length stops changing across
/// `settling_attempts` consecutive reads, `settling_delay` apart, then
/// returns its final bytes and size. Treats a file that disappears
/// mid-settle (editor atomic-rename pattern) as "not yet settled"
/// rather than an error, retrying until the attempt budget given by
/// `settling_attempts` is exhausted, at which point the last observed
/// size is used regardless — this call must never block forever.
async fn wait_for_settled(
    path: &Path,
    settling_attempts: u32,
    settling_delay: Duration,
    poll_interval: Duration,
) -> WatchResult<(Vec<u8>, u64)> {
    let mut last_len: Option<u64> = None;
    let mut stable_reads = 0u32;
    let max_total_attempts = settling_attempts.saturating_mul(4).max(settling_attempts);
    let mut attempts = 0u32;

    loop {
        sleep(poll_interval.min(settling_delay)).await;
        attempts += 1;
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(_) => {
                stable_reads = 0;
                last_len = None;
                if attempts >= max_total_attempts {
                    return read_with_len(path).await;
                }
                sleep(settling_delay).await;
                continue;
            }
        };
        let len = metadata.len();
        if Some(len) == last_len {
            stable_reads += 1;
        } else {
            stable_reads = 0;
            last_len = Some(len);
        }
        if stable_reads >= settling_attempts || attempts >= max_total_attempts {
            return read_with_len(path).await;
        }
        sleep(settling_delay).await;
    }
}

async fn read_with_len(path: &Path) -> WatchResult<(Vec<u8>, u64)> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| WatchError::SettlingRead {
            path: path.to_path_buf(),
            source,
        })?;
    let len = bytes.len() as u64;
    Ok((bytes, len))
}

/// Reads a `Modified` path's current bytes without waiting for it to
/// settle — an in-place modification is read opportunistically rather
/// than held for settling, since the pre-existing file already has a
/// stable identity. Returns `None` if the path has already disappeared
/// by the time this runs (a Modify event racing a subsequent Remove).
async fn read_opportunistic(path: &Path) -> Option<(Vec<u8>, u64)> {
    tokio::fs::read(path).await.ok().map(|bytes| {
        let len = bytes.len() as u64;
        (bytes, len)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_idle_and_transitions_to_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FilesystemWatcher::new(
            vec![dir.path().to_path_buf()],
            Duration::from_millis(5),
            1,
            Duration::from_millis(5),
            ClassifierPolicy::default(),
        );
        assert_eq!(watcher.state().await, WatcherState::Idle);
        let _rx = watcher.start().await.unwrap();
        assert_eq!(watcher.state().await, WatcherState::Running);
        watcher.stop().await.unwrap();
        assert_eq!(watcher.state().await, WatcherState::Stopped);
    }

    #[tokio::test]
    async fn created_class_file_under_recognized_root_emits_artifact_event() {
        let dir = tempfile::tempdir().unwrap();
        let classes_dir = dir.path().join("target/classes/com/acme");
        tokio::fs::create_dir_all(&classes_dir).await.unwrap();

        let mut watcher = FilesystemWatcher::new(
            vec![dir.path().to_path_buf()],
            Duration::from_millis(5),
            1,
            Duration::from_millis(5),
            ClassifierPolicy::default(),
        );
        let mut rx = watcher.start().await.unwrap();

        tokio::fs::write(classes_dir.join("Widget.class"), b"hello").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for artifact event")
            .expect("channel closed without an event");

        match event {
            WatchEvent::Artifact(artifact_event) => {
                assert_eq!(artifact_event.artifact.dotted_class_name, "com.acme.Widget");
                assert!(matches!(artifact_event.change, ArtifactChange::Created { .. }));
            }
            WatchEvent::OverflowDetected { .. } => panic!("expected an artifact event"),
        }

        watcher.stop().await.unwrap();
    }
}
