//! Batch files: an ordered list of moves run one after another.
//!
//! ```yaml
//! migrations:
//!   - resource: billing-db
//!     from: node-a
//!     to: node-b
//!     stop_source: true
//!   - volume: uploads
//!     from: node-a
//!     to: node-c
//!     target_volume: uploads-v2
//! ```
//!
//! A failing task is recorded and the run continues with the next one.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::migrate::{MigrationOptions, Migrator, MoveRequest, VolumeMoveRequest};
use crate::types::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    pub migrations: Vec<BatchTask>,
}

/// One entry of a batch file. Exactly one of `resource` or `volume` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchTask {
    pub resource: Option<String>,
    pub volume: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub target_volume: Option<String>,
    /// Expected resource kind, e.g. `postgresql`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Name for the clone.
    pub name: Option<String>,
    pub stop_source: bool,
}

/// Settings applied to every task of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    pub dry_run: bool,
    pub skip_space_check: bool,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub enum TaskPlan {
    Move(MoveRequest),
    Volume(VolumeMoveRequest),
}

enum TaskTarget<'t> {
    Resource(&'t str),
    Volume(&'t str),
}

impl BatchTask {
    pub fn describe(&self) -> String {
        let route = format!(
            "{} -> {}",
            self.from.as_deref().unwrap_or("?"),
            self.to.as_deref().unwrap_or("?")
        );
        match (&self.resource, &self.volume) {
            (Some(resource), _) => format!("resource {resource} ({route})"),
            (None, Some(volume)) => format!("volume {volume} ({route})"),
            (None, None) => format!("invalid task ({route})"),
        }
    }

    pub fn plan(&self, options: &BatchOptions) -> Result<TaskPlan> {
        let invalid = |reason: &str| MigrationError::InvalidTask(reason.to_string());
        let target = match (&self.resource, &self.volume) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "a task must specify either \"resource\" or \"volume\", not both",
                ));
            }
            (None, None) => {
                return Err(invalid("a task must specify either \"resource\" or \"volume\""));
            }
            (Some(resource), None) => TaskTarget::Resource(resource),
            (None, Some(volume)) => TaskTarget::Volume(volume),
        };
        let from = self.from.clone().ok_or_else(|| invalid("missing \"from\""))?;
        let to = self.to.clone().ok_or_else(|| invalid("missing \"to\""))?;

        match target {
            TaskTarget::Resource(resource) => {
                let expected = self
                    .kind
                    .as_deref()
                    .map(|k| k.parse::<ResourceKind>())
                    .transpose()
                    .map_err(MigrationError::UnsupportedKind)?;
                Ok(TaskPlan::Move(MoveRequest {
                    resource: resource.to_string(),
                    from,
                    to,
                    options: MigrationOptions {
                        new_name: self.name.clone(),
                        expected,
                        dry_run: options.dry_run,
                        skip_space_check: options.skip_space_check,
                        stop_source: self.stop_source,
                        force: options.force,
                    },
                }))
            }
            TaskTarget::Volume(volume) => Ok(TaskPlan::Volume(VolumeMoveRequest {
                volume: volume.to_string(),
                from,
                to,
                target_volume: self.target_volume.clone(),
                dry_run: options.dry_run,
                skip_space_check: options.skip_space_check,
            })),
        }
    }
}

/// Read and parse a YAML batch file.
pub fn load_batch_file(path: &Path) -> anyhow::Result<BatchFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read batch file: {}", path.display()))?;
    parse_batch(&content).with_context(|| format!("Failed to parse batch file: {}", path.display()))
}

pub fn parse_batch(content: &str) -> anyhow::Result<BatchFile> {
    serde_yaml::from_str(content).context("Batch file must contain a \"migrations\" list")
}

/// Something that can carry out a planned task.
pub trait TaskExecutor {
    fn execute(&self, plan: &TaskPlan) -> Result<()>;
}

impl TaskExecutor for Migrator<'_> {
    fn execute(&self, plan: &TaskPlan) -> Result<()> {
        match plan {
            TaskPlan::Move(request) => self.run_move(request).map(|_| ()),
            TaskPlan::Volume(request) => self.run_volume_move(request).map(|_| ()),
        }
    }
}

/// Progress notifications from [`run_batch`]. Indices are 1-based.
#[derive(Debug)]
pub enum BatchEvent<'a> {
    Started {
        index: usize,
        total: usize,
        task: &'a BatchTask,
    },
    Completed {
        index: usize,
    },
    Failed {
        index: usize,
        error: &'a MigrationError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub index: usize,
    pub description: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub failures: Vec<TaskFailure>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Run every task in order. A task's failure never stops the run.
pub fn run_batch(
    tasks: &[BatchTask],
    options: &BatchOptions,
    executor: &dyn TaskExecutor,
    mut progress: impl FnMut(BatchEvent<'_>),
) -> BatchSummary {
    let total = tasks.len();
    let mut summary = BatchSummary {
        total,
        ..BatchSummary::default()
    };
    tracing::info!(
        "Batch migration: {} task(s){}",
        total,
        if options.dry_run { " (dry run)" } else { "" }
    );

    for (i, task) in tasks.iter().enumerate() {
        let index = i + 1;
        progress(BatchEvent::Started { index, total, task });
        match task.plan(options).and_then(|plan| executor.execute(&plan)) {
            Ok(()) => {
                tracing::info!("Task {}/{} completed", index, total);
                summary.completed += 1;
                progress(BatchEvent::Completed { index });
            }
            Err(error) => {
                tracing::error!("Task {}/{} failed: {}", index, total, error);
                summary.failed += 1;
                summary.failures.push(TaskFailure {
                    index,
                    description: task.describe(),
                    error: error.to_string(),
                });
                progress(BatchEvent::Failed {
                    index,
                    error: &error,
                });
            }
        }
    }
    summary
}
