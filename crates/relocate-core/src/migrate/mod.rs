//! Migration coordinator.
//!
//! A move walks through the stages of [`MigrationStage`] in order. The store
//! connection and every remote session are acquired when a move starts and
//! released before it returns, whatever the outcome. With a journal configured
//! each stage is recorded on disk so an interrupted move resumes after its last
//! completed stage instead of cloning again.

mod journal;
mod volume;

pub use journal::{JournalEntry, JournalStore};
pub use volume::{VolumeMoveReport, VolumeMoveRequest};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clone::{CloneEngine, CloneOptions, ClonedResource, VolumePair};
use crate::error::{MigrationError, Result};
use crate::identifier::IdentifierSource;
use crate::locate::Locator;
use crate::platform::PlatformApi;
use crate::preflight::{self, PreflightReport, PreflightRequest, SpaceCheck};
use crate::remote::{KeyRing, RemoteShell, Sessions, VolumeProbe};
use crate::store::{ConfigStore, StoreConnector};
use crate::transfer::{CommandRunner, TransferRequest, TransferSettings, VolumeTransfer};
use crate::types::{HostDescriptor, ResourceDescriptor, ResourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    Located,
    PreflightChecked,
    SourceStopped,
    Cloned,
    VolumesTransferred,
    OldRetired,
    Completed,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MigrationStage::Located => "located",
            MigrationStage::PreflightChecked => "preflight checked",
            MigrationStage::SourceStopped => "source stopped",
            MigrationStage::Cloned => "cloned",
            MigrationStage::VolumesTransferred => "volumes transferred",
            MigrationStage::OldRetired => "original retired",
            MigrationStage::Completed => "completed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationOptions {
    pub new_name: Option<String>,
    /// Kind probed first when resolving the resource.
    pub expected: Option<ResourceKind>,
    pub dry_run: bool,
    pub skip_space_check: bool,
    pub stop_source: bool,
    /// Continue past failed preflight checks.
    pub force: bool,
}

/// A full-resource move.
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub resource: String,
    pub from: String,
    pub to: String,
    pub options: MigrationOptions,
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub resource: String,
    pub resource_uuid: String,
    pub kind: ResourceKind,
    pub source_host: String,
    pub target_host: String,
    pub dry_run: bool,
    pub stages: Vec<MigrationStage>,
    pub preflight: PreflightReport,
    pub space: Option<SpaceCheck>,
    /// The clone, or the clone a dry run would create.
    pub clone: Option<ClonedResource>,
    /// Volumes copied (or simulated) by this run.
    pub transferred: Vec<VolumePair>,
    pub retired_name: Option<String>,
    /// Last stage recorded by an earlier, interrupted run.
    pub resumed_from: Option<MigrationStage>,
    pub warnings: Vec<String>,
}

impl MigrationReport {
    fn new(
        descriptor: &ResourceDescriptor,
        source: &HostDescriptor,
        target: &HostDescriptor,
        dry_run: bool,
    ) -> Self {
        Self {
            resource: descriptor.name().to_string(),
            resource_uuid: descriptor.uuid().to_string(),
            kind: descriptor.kind(),
            source_host: source.name.clone(),
            target_host: target.name.clone(),
            dry_run,
            stages: Vec::new(),
            preflight: PreflightReport::default(),
            space: None,
            clone: None,
            transferred: Vec::new(),
            retired_name: None,
            resumed_from: None,
            warnings: Vec::new(),
        }
    }

    pub fn reached(&self, stage: MigrationStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn completed(&self) -> bool {
        self.reached(MigrationStage::Completed)
    }

    fn reach(&mut self, stage: MigrationStage) {
        tracing::debug!(resource = %self.resource_uuid, "Stage reached: {}", stage);
        if !self.stages.contains(&stage) {
            self.stages.push(stage);
        }
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Runs moves against a set of collaborators.
pub struct Migrator<'a> {
    pub store: &'a dyn StoreConnector,
    pub shell: &'a dyn RemoteShell,
    pub runner: &'a dyn CommandRunner,
    /// Needed only to stop the source.
    pub platform: Option<&'a dyn PlatformApi>,
    pub ids: &'a dyn IdentifierSource,
    pub keys: &'a KeyRing,
    pub transfer: &'a TransferSettings,
    pub retire_suffix: String,
    pub allow_unmapped_volume_names: bool,
    pub journal: Option<JournalStore>,
}

impl<'a> Migrator<'a> {
    /// Move a resource from one host to another.
    pub fn run_move(&self, request: &MoveRequest) -> Result<MigrationReport> {
        let store = self.store.open()?;
        let mut sessions = Sessions::new(self.shell);
        let result = self.execute(&*store, &mut sessions, request);
        sessions.disconnect_all();
        drop(store);
        result
    }

    /// Run only the preflight checks for `request`.
    pub fn preflight(&self, request: &MoveRequest) -> Result<PreflightReport> {
        let store = self.store.open()?;
        let mut sessions = Sessions::new(self.shell);
        let report = preflight::check(&*store, &mut sessions, &self.preflight_request(request));
        sessions.disconnect_all();
        Ok(report)
    }

    fn preflight_request<'r>(&'r self, request: &'r MoveRequest) -> PreflightRequest<'r> {
        PreflightRequest {
            source_host: &request.from,
            target_host: &request.to,
            resource: &request.resource,
            expected: request.options.expected,
            tool: &self.transfer.tool,
            volume_root: &self.transfer.volume_root,
        }
    }

    fn execute(
        &self,
        store: &dyn ConfigStore,
        sessions: &mut Sessions<'_>,
        request: &MoveRequest,
    ) -> Result<MigrationReport> {
        let options = &request.options;
        let dry_run = options.dry_run;
        let locator = Locator::new(store);

        let source = locator.host(&request.from)?;
        let target = locator.host(&request.to)?;
        let descriptor = locator.locate(&request.resource, options.expected)?;
        let kind = descriptor.kind();

        let mut report = MigrationReport::new(&descriptor, &source, &target, dry_run);
        tracing::info!(
            resource = %descriptor.uuid(),
            "Moving {} '{}' from {} to {}",
            kind.display_name(),
            descriptor.name(),
            source.name,
            target.name
        );
        for owned in &descriptor.volumes {
            tracing::info!(volume = %owned.volume.name, "Volume of {}", owned.owner);
        }
        report.reach(MigrationStage::Located);

        let checks = preflight::check(store, sessions, &self.preflight_request(request));
        if !checks.passed() {
            if !options.force {
                return Err(MigrationError::PreflightFailed(checks));
            }
            let summary = checks.failure_summary();
            tracing::warn!("Continuing past failed preflight checks: {}", summary);
            report.warn(format!("preflight failed: {summary}"));
        }
        report.preflight = checks;
        report.reach(MigrationStage::PreflightChecked);

        let mut entry = self.open_journal(&descriptor, &source, &target, dry_run)?;
        if entry.reached(MigrationStage::Cloned) {
            tracing::info!(
                resource = %descriptor.uuid(),
                "Resuming interrupted move after stage: {}",
                entry.stage
            );
            report.resumed_from = Some(entry.stage);
        }
        self.checkpoint(&mut entry, MigrationStage::PreflightChecked, dry_run)?;

        let pending: Vec<String> = descriptor
            .volume_names()
            .into_iter()
            .filter(|v| !entry.is_transferred(v))
            .collect();
        if options.skip_space_check {
            tracing::warn!("Skipping disk space check");
            report.warn("disk space check skipped");
        } else if !pending.is_empty() {
            report.space = Some(self.check_space(sessions, &source, &target, &pending)?);
        }

        if options.stop_source {
            if dry_run {
                tracing::info!("Dry run: source would be stopped");
            } else if entry.reached(MigrationStage::Cloned) {
                tracing::debug!("Source already handled by an earlier run");
            } else if self.stop_source(&descriptor, &mut report) {
                self.checkpoint(&mut entry, MigrationStage::SourceStopped, dry_run)?;
                report.reach(MigrationStage::SourceStopped);
            }
        }

        let clone_options = CloneOptions {
            new_name: options.new_name.clone(),
            allow_unmapped_volume_names: self.allow_unmapped_volume_names,
        };
        let engine = CloneEngine::new(store, self.ids);
        let resumed_clone = entry
            .clone
            .clone()
            .filter(|_| entry.reached(MigrationStage::Cloned));
        let clone = if dry_run {
            let preview = engine.preview(&descriptor, &clone_options)?;
            tracing::info!(
                "Dry run: would clone as '{}' ({}) with {} volume(s)",
                preview.name,
                preview.uuid,
                preview.volumes.len()
            );
            preview
        } else if let Some(existing) = resumed_clone {
            tracing::info!(clone = %existing.uuid, "Reusing clone from earlier run");
            report.reach(MigrationStage::Cloned);
            existing
        } else {
            let destination = locator.destination(&target)?;
            let created =
                engine.clone_resource(&descriptor, &target, &destination, &clone_options)?;
            entry.clone = Some(created.clone());
            self.checkpoint(&mut entry, MigrationStage::Cloned, dry_run)?;
            report.reach(MigrationStage::Cloned);
            created
        };

        if clone.volumes.is_empty() {
            tracing::warn!(resource = %descriptor.uuid(), "No volumes to transfer");
        }
        let transfer = VolumeTransfer::new(self.runner, self.keys, self.transfer);
        for pair in &clone.volumes {
            if entry.is_transferred(&pair.source) {
                tracing::info!(volume = %pair.source, "Already transferred, skipping");
                continue;
            }
            if !dry_run {
                self.ensure_target_volume(sessions, &target, &pair.target)?;
            }
            transfer.transfer(
                &TransferRequest {
                    source: &source,
                    target: &target,
                    source_volume: &pair.source,
                    target_volume: &pair.target,
                    dry_run,
                },
                sessions,
            )?;
            report.transferred.push(pair.clone());
            if !dry_run {
                entry.transferred.push(pair.source.clone());
                self.save(&mut entry)?;
            }
        }
        if !dry_run {
            self.checkpoint(&mut entry, MigrationStage::VolumesTransferred, dry_run)?;
            report.reach(MigrationStage::VolumesTransferred);
        }

        let retired_name = format!("{}{}", descriptor.name(), self.retire_suffix);
        if dry_run {
            tracing::info!("Dry run: original would be renamed to '{}'", retired_name);
        } else if entry.reached(MigrationStage::OldRetired) {
            tracing::debug!("Original already retired by an earlier run");
            report.reach(MigrationStage::OldRetired);
        } else {
            store
                .rename_resource(kind, descriptor.record.id, &retired_name)
                .map_err(|e| MigrationError::RetireFailure {
                    name: descriptor.name().to_string(),
                    reason: e.to_string(),
                })?;
            tracing::info!(
                resource = %descriptor.uuid(),
                "Renamed original to '{}'",
                retired_name
            );
            report.retired_name = Some(retired_name);
            // The original is renamed now; a lost checkpoint must not fail the move.
            if let Err(e) = self.checkpoint(&mut entry, MigrationStage::OldRetired, dry_run) {
                tracing::warn!(resource = %descriptor.uuid(), "Failed to record retirement: {}", e);
                report.warn(format!("retirement not recorded in journal: {e}"));
            }
            report.reach(MigrationStage::OldRetired);
        }

        if !dry_run {
            if let Some(warning) = self
                .journal
                .as_ref()
                .and_then(|journal| discard_journal(journal, descriptor.uuid()))
            {
                report.warn(warning);
            }
            report.reach(MigrationStage::Completed);
            tracing::info!(
                resource = %descriptor.uuid(),
                clone = %clone.uuid,
                "Move completed"
            );
        }
        report.clone = Some(clone);
        Ok(report)
    }

    /// Journal entry to continue from, or a fresh one.
    fn open_journal(
        &self,
        descriptor: &ResourceDescriptor,
        source: &HostDescriptor,
        target: &HostDescriptor,
        dry_run: bool,
    ) -> Result<JournalEntry> {
        let fresh = || {
            JournalEntry::new(descriptor.uuid(), descriptor.name(), &source.uuid, &target.uuid)
        };
        let Some(journal) = self.journal.as_ref().filter(|_| !dry_run) else {
            return Ok(fresh());
        };
        let Some(entry) = journal.load(descriptor.uuid())? else {
            return Ok(fresh());
        };
        if !entry.reached(MigrationStage::Cloned) {
            tracing::debug!("Discarding journal entry without a clone");
            return Ok(fresh());
        }
        if entry.source_host != source.uuid || entry.target_host != target.uuid {
            return Err(MigrationError::Journal(format!(
                "an interrupted move of '{}' from {} to {} is recorded in {}; finish it or remove the file",
                descriptor.name(),
                entry.source_host,
                entry.target_host,
                journal.path_for(descriptor.uuid()).display()
            )));
        }
        Ok(entry)
    }

    fn checkpoint(
        &self,
        entry: &mut JournalEntry,
        stage: MigrationStage,
        dry_run: bool,
    ) -> Result<()> {
        if dry_run {
            return Ok(());
        }
        entry.stage = entry.stage.max(stage);
        self.save(entry)
    }

    fn save(&self, entry: &mut JournalEntry) -> Result<()> {
        entry.updated_at = chrono::Utc::now();
        match &self.journal {
            Some(journal) => journal.save(entry),
            None => Ok(()),
        }
    }

    fn check_space(
        &self,
        sessions: &mut Sessions<'_>,
        source: &HostDescriptor,
        target: &HostDescriptor,
        volumes: &[String],
    ) -> Result<SpaceCheck> {
        let source_session = sessions.get(source)?;
        let target_session = sessions.get(target)?;
        let root = self.transfer.volume_root.as_str();
        SpaceCheck::measure(
            &VolumeProbe::new(&*source_session, root),
            &VolumeProbe::new(&*target_session, root),
            volumes,
        )?
        .ensure()
    }

    /// Best-effort stop. Returns true if the platform accepted the request.
    fn stop_source(&self, descriptor: &ResourceDescriptor, report: &mut MigrationReport) -> bool {
        let Some(platform) = self.platform else {
            tracing::warn!("No platform API configured, cannot stop the source");
            report.warn("source not stopped: no platform API configured");
            return false;
        };
        match platform.stop(descriptor.kind(), descriptor.uuid()) {
            Ok(()) => {
                tracing::info!(resource = %descriptor.uuid(), "Stopped source");
                true
            }
            Err(e) => {
                tracing::warn!(resource = %descriptor.uuid(), "Failed to stop source: {}", e);
                report.warn(format!("source not stopped: {e}"));
                false
            }
        }
    }

    fn ensure_target_volume(
        &self,
        sessions: &mut Sessions<'_>,
        target: &HostDescriptor,
        name: &str,
    ) -> Result<bool> {
        let session = sessions.get(target)?;
        let probe = VolumeProbe::new(&*session, &self.transfer.volume_root);
        if probe.exists(name)? {
            tracing::debug!(host = %target.name, volume = %name, "Target volume exists");
            return Ok(false);
        }
        probe.create(name)?;
        Ok(true)
    }
}

/// Remove the journal entry of a finished move, returning a warning on failure.
fn discard_journal(journal: &JournalStore, resource_uuid: &str) -> Option<String> {
    let err = journal.remove(resource_uuid).err()?;
    tracing::warn!(resource = %resource_uuid, "Failed to remove journal entry: {}", err);
    Some(format!("journal entry not removed: {err}"))
}
