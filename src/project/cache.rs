use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use crate::project::error::CacheError;
use crate::project::types::{ProjectInfo, ProjectKey, now_seconds};

/// Distinguishes temp files of concurrent writers within this process
static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Outcome of looking up a project in the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheRead {
    Absent,
    Stale(ProjectInfo),
    Fresh(ProjectInfo),
}

impl CacheRead {
    pub fn into_entry(self) -> Option<ProjectInfo> {
        match self {
            CacheRead::Absent => None,
            CacheRead::Stale(info) | CacheRead::Fresh(info) => Some(info),
        }
    }
}

/// Trait for storing and retrieving project records
#[async_trait::async_trait]
pub trait ProjectStorer: Send + Sync + 'static {
    /// Look up a project, classifying the record by staleness
    ///
    /// Unreadable or malformed records are reported as [`CacheRead::Absent`].
    async fn read(&self, project: &ProjectKey) -> CacheRead;

    /// Persist a project record, replacing any previous one
    ///
    /// When `touch_timestamp` is set, `info.last_update` is stamped with the
    /// current time before writing; otherwise it is written as-is.
    async fn write(
        &self,
        project: &ProjectKey,
        info: &mut ProjectInfo,
        touch_timestamp: bool,
    ) -> Result<(), CacheError>;
}

/// One JSON file per project under a cache directory
pub struct ProjectCache {
    dir: PathBuf,
    stale_time: TimeDelta,
}

impl ProjectCache {
    pub fn new(dir: &Path, stale_time: TimeDelta) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir)?;
        info!("Using {:?} as project cache directory", dir);

        Ok(Self {
            dir: dir.to_path_buf(),
            stale_time,
        })
    }

    /// Path of the record for a project
    pub fn path_for(&self, project: &ProjectKey) -> PathBuf {
        self.dir.join(file_name(project))
    }

    fn temp_path_for(&self, project: &ProjectKey) -> PathBuf {
        let n = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}.{}.{}.tmp",
            file_name(project),
            std::process::id(),
            n
        ))
    }
}

/// `<owner>--<repo>.json`, with the owner escaped so that distinct keys never
/// share a file name
fn file_name(project: &ProjectKey) -> String {
    format!("{}--{}.json", escape_owner(&project.owner), project.repo)
}

/// Escapes `%` and every `-` that is followed by another `-` or ends the name.
///
/// The escaped owner never contains `--` and never ends with `-`, so the first
/// `--` of a file name is always the separator.
fn escape_owner(owner: &str) -> String {
    let mut escaped = String::with_capacity(owner.len());
    let mut chars = owner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '%' => escaped.push_str("%25"),
            '-' if matches!(chars.peek(), None | Some('-')) => escaped.push_str("%2D"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Writes `contents` to `temp_path` and renames it over `path`.
///
/// The temp file is removed if either step fails.
async fn replace_file(temp_path: &Path, path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let result = async {
        tokio::fs::write(temp_path, contents).await?;
        tokio::fs::rename(temp_path, path).await
    }
    .await;

    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(temp_path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove temp file {:?}: {}", temp_path, e);
    }
    result
}

/// Returns true if a record last updated at `last_update` must be revalidated.
///
/// Records without a timestamp are always stale.
pub fn is_stale(
    last_update: Option<DateTime<Utc>>,
    window: TimeDelta,
    now: DateTime<Utc>,
) -> bool {
    match last_update {
        None => true,
        Some(last_update) => (now - last_update).abs() > window,
    }
}

#[async_trait::async_trait]
impl ProjectStorer for ProjectCache {
    async fn read(&self, project: &ProjectKey) -> CacheRead {
        let path = self.path_for(project);

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache entry for {}", project);
                return CacheRead::Absent;
            }
            Err(e) => {
                warn!("Failed to read cache file {:?}: {}", path, e);
                return CacheRead::Absent;
            }
        };

        let info: ProjectInfo = match serde_json::from_slice(&contents) {
            Ok(info) => info,
            Err(e) => {
                warn!("Ignoring corrupt cache file {:?}: {}", path, e);
                return CacheRead::Absent;
            }
        };

        if is_stale(info.last_update, self.stale_time, Utc::now()) {
            debug!("Cache entry for {} is stale", project);
            CacheRead::Stale(info)
        } else {
            debug!("Reusing cached version of {}", project);
            CacheRead::Fresh(info)
        }
    }

    async fn write(
        &self,
        project: &ProjectKey,
        info: &mut ProjectInfo,
        touch_timestamp: bool,
    ) -> Result<(), CacheError> {
        if touch_timestamp {
            info.last_update = Some(now_seconds());
        }
        let contents = serde_json::to_vec(info)?;

        // Write to a sibling temp file and rename so readers never see a partial record
        let temp_path = self.temp_path_for(project);
        let path = self.path_for(project);
        replace_file(&temp_path, &path, &contents).await?;

        debug!("Wrote cache entry for {} to {:?}", project, path);
        Ok(())
    }
}
