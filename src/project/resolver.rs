//! Version resolution through the cache and the forge fallback chain
//!
//! ```text
//! CheckCache ──fresh──────────────────────────────────────────▶ Done (cached)
//!     │ absent/stale
//!     ▼
//!  Release ──200──────────────────────────┐
//!     │ 404 (or 200 without a tag)         ▼
//!     ▼                              MetadataFile ──▶ WriteCache ──▶ Done
//!   Tags ────200──────────────────────────┘
//!
//! Release 403/other, Tags non-200 ─────────────────────────────▶ Done (no write)
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::project::cache::{CacheRead, ProjectStorer};
use crate::project::forge::{Endpoint, Forge, MetadataFile, Release, Tag, strip_v};
use crate::project::types::{ProjectInfo, ProjectKey, UNKNOWN_VERSION};

const STATUS_OK: u16 = 200;
const STATUS_FORBIDDEN: u16 = 403;
const STATUS_NOT_FOUND: u16 = 404;

/// Result of resolving a project's version
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub info: ProjectInfo,
    /// True only when the entry was served from a fresh cache record
    pub cached: bool,
}

impl Resolution {
    fn from_cache(info: ProjectInfo) -> Self {
        Self { info, cached: true }
    }

    fn fetched(info: ProjectInfo) -> Self {
        Self {
            info,
            cached: false,
        }
    }
}

/// States of the fallback chain
enum Step {
    CheckCache,
    Release { previous: Option<ProjectInfo> },
    Tags { previous: Option<ProjectInfo> },
    MetadataFile { info: ProjectInfo },
    WriteCache { info: ProjectInfo },
    Done(Resolution),
}

/// Resolves project versions, reusing fresh cache records and refetching
/// stale or missing ones from the forge
pub struct VersionResolver<S: ProjectStorer> {
    storer: Arc<S>,
    forge: Arc<dyn Forge>,
}

impl<S: ProjectStorer> VersionResolver<S> {
    pub fn new(storer: Arc<S>, forge: Arc<dyn Forge>) -> Self {
        Self { storer, forge }
    }

    pub fn storer(&self) -> &Arc<S> {
        &self.storer
    }

    /// Resolve the current version of `project`.
    ///
    /// Never fails; a missing `info.version` means no version could be found.
    /// Concurrent resolutions of the same project are not de-duplicated.
    pub async fn resolve(&self, project: &ProjectKey) -> Resolution {
        let mut step = Step::CheckCache;
        loop {
            step = match step {
                Step::CheckCache => self.check_cache(project).await,
                Step::Release { previous } => self.release(project, previous).await,
                Step::Tags { previous } => self.tags(project, previous).await,
                Step::MetadataFile { info } => self.metadata_file(project, info).await,
                Step::WriteCache { info } => self.write_cache(project, info).await,
                Step::Done(resolution) => return resolution,
            };
        }
    }

    async fn check_cache(&self, project: &ProjectKey) -> Step {
        match self.storer.read(project).await {
            CacheRead::Fresh(info) => Step::Done(Resolution::from_cache(info)),
            CacheRead::Stale(info) => Step::Release {
                previous: Some(info),
            },
            CacheRead::Absent => Step::Release { previous: None },
        }
    }

    async fn release(&self, project: &ProjectKey, previous: Option<ProjectInfo>) -> Step {
        let response = self.forge.fetch(Endpoint::Release, project).await;

        match response.status {
            STATUS_OK => {
                let version = response
                    .parse::<Release>()
                    .as_ref()
                    .and_then(Release::version_tag)
                    .map(strip_v)
                    .filter(|version| !version.is_empty())
                    .map(str::to_string);
                match version {
                    Some(version) => Step::MetadataFile {
                        info: refreshed(previous, version),
                    },
                    None => {
                        warn!("Release of {} has no usable tag, trying tags", project);
                        Step::Tags { previous }
                    }
                }
            }
            STATUS_FORBIDDEN => {
                warn!("Rate limited while fetching release of {}", project);
                Step::Done(abandoned(previous, STATUS_FORBIDDEN))
            }
            STATUS_NOT_FOUND => {
                debug!("No release for {}, trying tags", project);
                Step::Tags { previous }
            }
            status => {
                warn!("Fetching release of {} returned status {}", project, status);
                Step::Done(abandoned(previous, status))
            }
        }
    }

    /// Tags are assumed to be ordered newest first by the forge.
    async fn tags(&self, project: &ProjectKey, previous: Option<ProjectInfo>) -> Step {
        let response = self.forge.fetch(Endpoint::Tags, project).await;

        if response.status != STATUS_OK {
            warn!("Fetching tags of {} returned status {}", project, response.status);
            return Step::Done(abandoned(previous, response.status));
        }

        let version = response
            .parse::<Vec<Tag>>()
            .and_then(|tags| tags.into_iter().next())
            .and_then(|tag| tag.name)
            .map(|name| strip_v(&name).to_string())
            .filter(|version| !version.is_empty())
            .unwrap_or_else(|| {
                info!("No usable tags for {}", project);
                UNKNOWN_VERSION.to_string()
            });

        Step::MetadataFile {
            info: refreshed(previous, version),
        }
    }

    async fn metadata_file(&self, project: &ProjectKey, mut info: ProjectInfo) -> Step {
        let response = self.forge.fetch(Endpoint::MetadataFile, project).await;

        if response.status == STATUS_OK {
            if let Some(bad_versions) = response
                .parse::<MetadataFile>()
                .and_then(|metadata| metadata.bad_versions)
            {
                debug!("{} flags bad versions {:?}", project, bad_versions);
                info.bad_versions = Some(bad_versions);
            }
        } else {
            debug!(
                "No metadata file for {} (status {})",
                project, response.status
            );
        }

        Step::WriteCache { info }
    }

    async fn write_cache(&self, project: &ProjectKey, mut info: ProjectInfo) -> Step {
        if let Err(e) = self.storer.write(project, &mut info, true).await {
            error!("Failed to write cache entry for {}: {}", project, e);
        } else {
            info!(
                "Cached version {} for {}",
                info.version.as_deref().unwrap_or_default(),
                project
            );
        }
        Step::Done(Resolution::fetched(info))
    }
}

/// The previous entry (stats and flags included) with a newly fetched version
fn refreshed(previous: Option<ProjectInfo>, version: String) -> ProjectInfo {
    let mut info = previous.unwrap_or_default();
    info.version = Some(version);
    info.status = Some(STATUS_OK);
    info
}

/// The previous entry, if any, annotated with the status that ended the attempt
fn abandoned(previous: Option<ProjectInfo>, status: u16) -> Resolution {
    let mut info = previous.unwrap_or_default();
    info.status = Some(status);
    Resolution::fetched(info)
}
