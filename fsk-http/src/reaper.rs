use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};

use crate::{artifact::is_artifact_name, logging::category_reaper};

/// Artifacts younger than this are never touched, so an in-flight request
/// cannot lose its file to the reaper.
pub const ARTIFACT_MAX_AGE: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
pub struct ReaperConfig {
    pub dir: PathBuf,
    pub interval: Duration,
    pub max_age: Duration,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Starts the periodic sweep as a detached task. The first sweep happens one
/// full interval after startup.
pub fn spawn_temp_reaper(config: ReaperConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run_temp_reaper(config).await;
    })
}

pub async fn run_temp_reaper(config: ReaperConfig) {
    info!(
        "{} sweeping {} every {}s (max age {}s)",
        category_reaper(),
        config.dir.display(),
        config.interval.as_secs(),
        config.max_age.as_secs()
    );

    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + config.interval,
        config.interval,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let dir = config.dir.clone();
        let max_age = config.max_age;
        match tokio::task::spawn_blocking(move || reap_once(&dir, max_age, SystemTime::now()))
            .await
        {
            Ok(Ok(report)) if report.removed > 0 || report.failed > 0 => info!(
                "{} removed {} orphaned artifacts ({} failed, {} scanned)",
                category_reaper(),
                report.removed,
                report.failed,
                report.scanned
            ),
            Ok(Ok(report)) => debug!(
                "{} nothing to remove ({} scanned)",
                category_reaper(),
                report.scanned
            ),
            Ok(Err(err)) => warn!(
                "{} could not list {}: {err}",
                category_reaper(),
                config.dir.display()
            ),
            Err(err) => warn!("{} sweep task failed: {err}", category_reaper()),
        }
    }
}

/// Deletes artifacts in `dir` older than `max_age` relative to `now`.
/// Failures on individual files are logged and counted, never returned.
pub fn reap_once(dir: &Path, max_age: Duration, now: SystemTime) -> io::Result<ReapReport> {
    let mut report = ReapReport::default();
    for entry in fs::read_dir(dir)? {
        let Ok(entry) = entry else {
            continue;
        };
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_artifact_name(name) {
            continue;
        }
        report.scanned += 1;

        let path = entry.path();
        let age = match entry.metadata().and_then(|metadata| artifact_birth(&metadata)) {
            Ok(born) => now.duration_since(born).unwrap_or_default(),
            Err(err) => {
                debug!("could not stat {}: {err}", path.display());
                report.failed += 1;
                continue;
            }
        };
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("cleaned up orphaned artifact {}", path.display());
                report.removed += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                debug!("could not clean up {}: {err}", path.display());
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn artifact_birth(metadata: &fs::Metadata) -> io::Result<SystemTime> {
    metadata.created().or_else(|_| metadata.modified())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fskhttp-reaper-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("scratch dir should be created");
        dir
    }

    #[test]
    fn removes_only_expired_artifacts() {
        let dir = scratch_dir();
        let artifact = dir.join("fskhttp-deadbeef.wav");
        let foreign = dir.join("recording.wav");
        let other = dir.join("fskhttp-notes.txt");
        for path in [&artifact, &foreign, &other] {
            fs::write(path, b"RIFF").expect("write fixture");
        }

        let later = SystemTime::now() + Duration::from_secs(3_600);
        let report = reap_once(&dir, ARTIFACT_MAX_AGE, later).expect("sweep should run");
        assert_eq!(
            report,
            ReapReport {
                scanned: 1,
                removed: 1,
                failed: 0
            }
        );
        assert!(!artifact.exists());
        assert!(foreign.exists());
        assert!(other.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn fresh_artifacts_survive() {
        let dir = scratch_dir();
        let artifact = dir.join("fskhttp-cafebabe.wav");
        fs::write(&artifact, b"RIFF").expect("write fixture");

        let report =
            reap_once(&dir, ARTIFACT_MAX_AGE, SystemTime::now()).expect("sweep should run");
        assert_eq!(report.scanned, 1);
        assert_eq!(report.removed, 0);
        assert!(artifact.exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_directory_is_reported() {
        let dir = std::env::temp_dir().join(format!("fskhttp-missing-{}", Uuid::new_v4()));
        assert!(reap_once(&dir, ARTIFACT_MAX_AGE, SystemTime::now()).is_err());
    }
}
