//! Moving a single volume between hosts without touching configuration.

use super::Migrator;
use crate::error::{MigrationError, Result};
use crate::locate::Locator;
use crate::preflight::SpaceCheck;
use crate::remote::{Sessions, VolumeProbe, validate_volume_name};
use crate::store::ConfigStore;
use crate::transfer::{TransferRequest, VolumeTransfer};

#[derive(Debug, Clone, Default)]
pub struct VolumeMoveRequest {
    pub volume: String,
    pub from: String,
    pub to: String,
    /// Name on the target host. Defaults to the source name.
    pub target_volume: Option<String>,
    pub dry_run: bool,
    pub skip_space_check: bool,
}

impl VolumeMoveRequest {
    pub fn target_volume(&self) -> &str {
        self.target_volume.as_deref().unwrap_or(&self.volume)
    }
}

#[derive(Debug, Clone)]
pub struct VolumeMoveReport {
    pub source_volume: String,
    pub target_volume: String,
    pub source_host: String,
    pub target_host: String,
    pub size: Option<String>,
    pub space: Option<SpaceCheck>,
    pub created_target: bool,
    pub dry_run: bool,
}

impl Migrator<'_> {
    /// Copy one volume's data from one host to another.
    pub fn run_volume_move(&self, request: &VolumeMoveRequest) -> Result<VolumeMoveReport> {
        let store = self.store.open()?;
        let mut sessions = Sessions::new(self.shell);
        let result = self.execute_volume_move(&*store, &mut sessions, request);
        sessions.disconnect_all();
        drop(store);
        result
    }

    fn execute_volume_move(
        &self,
        store: &dyn ConfigStore,
        sessions: &mut Sessions<'_>,
        request: &VolumeMoveRequest,
    ) -> Result<VolumeMoveReport> {
        let source_volume = request.volume.as_str();
        let target_volume = request.target_volume();
        validate_volume_name(source_volume)?;
        validate_volume_name(target_volume)?;

        let locator = Locator::new(store);
        let source = locator.host(&request.from)?;
        let target = locator.host(&request.to)?;
        let root = self.transfer.volume_root.as_str();
        let tool = self.transfer.tool.as_str();

        let source_session = sessions.get(&source)?;
        let target_session = sessions.get(&target)?;
        let source_probe = VolumeProbe::new(&*source_session, root);
        let target_probe = VolumeProbe::new(&*target_session, root);

        for (host, probe) in [(&source, &source_probe), (&target, &target_probe)] {
            if !probe.has_tool(tool)? {
                return Err(MigrationError::ToolMissing {
                    tool: tool.to_string(),
                    host: host.name.clone(),
                });
            }
        }

        if !source_probe.exists(source_volume)? {
            return Err(MigrationError::not_found(
                "volume",
                format!("{source_volume} on {}", source.name),
            ));
        }
        let size = match source_probe.size_human(source_volume) {
            Ok(size) => Some(size),
            Err(e) => {
                tracing::warn!(volume = %source_volume, "Could not read volume size: {}", e);
                None
            }
        };
        tracing::info!(
            volume = %source_volume,
            "Moving volume from {} to {} as {} ({})",
            source.name,
            target.name,
            target_volume,
            size.as_deref().unwrap_or("size unknown")
        );

        let space = if request.skip_space_check {
            tracing::warn!("Skipping disk space check");
            None
        } else {
            let volumes = [source_volume.to_string()];
            Some(SpaceCheck::measure(&source_probe, &target_probe, &volumes)?.ensure()?)
        };

        let mut created_target = false;
        if target_probe.exists(target_volume)? {
            tracing::warn!(
                host = %target.name,
                volume = %target_volume,
                "Target volume already exists, its contents will be overwritten"
            );
        } else if request.dry_run {
            tracing::info!("Dry run: would create volume {} on {}", target_volume, target.name);
        } else {
            target_probe.create(target_volume)?;
            created_target = true;
        }

        VolumeTransfer::new(self.runner, self.keys, self.transfer).transfer(
            &TransferRequest {
                source: &source,
                target: &target,
                source_volume,
                target_volume,
                dry_run: request.dry_run,
            },
            sessions,
        )?;

        Ok(VolumeMoveReport {
            source_volume: source_volume.to_string(),
            target_volume: target_volume.to_string(),
            source_host: source.name.clone(),
            target_host: target.name.clone(),
            size,
            space,
            created_target,
            dry_run: request.dry_run,
        })
    }
}
