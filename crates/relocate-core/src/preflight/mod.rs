//! Non-mutating checks run before a migration changes anything.
//!
//! Every check runs and is recorded, so one report shows all failures at
//! once. Checks whose inputs are missing are recorded as skipped.

mod space;

pub use space::{SAFETY_MARGIN_PERCENT, SpaceCheck, format_bytes, required_bytes};

use std::fmt;

use crate::locate::Locator;
use crate::remote::{Sessions, VolumeProbe};
use crate::store::ConfigStore;
use crate::types::{HostDescriptor, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Fail(String),
    Skip(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub outcome: CheckOutcome,
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            CheckOutcome::Pass => write!(f, "{}: ok", self.name),
            CheckOutcome::Fail(reason) => write!(f, "{}: {}", self.name, reason),
            CheckOutcome::Skip(reason) => write!(f, "{}: skipped ({})", self.name, reason),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks
            .iter()
            .filter(|c| matches!(c.outcome, CheckOutcome::Fail(_)))
    }

    pub fn failure_summary(&self) -> String {
        self.failures()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn record(&mut self, name: impl Into<String>, outcome: CheckOutcome) {
        let result = CheckResult {
            name: name.into(),
            outcome,
        };
        match &result.outcome {
            CheckOutcome::Pass => tracing::debug!("Preflight {}", result),
            CheckOutcome::Fail(_) => tracing::warn!("Preflight {}", result),
            CheckOutcome::Skip(_) => tracing::debug!("Preflight {}", result),
        }
        self.checks.push(result);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PreflightRequest<'a> {
    pub source_host: &'a str,
    pub target_host: &'a str,
    pub resource: &'a str,
    pub expected: Option<ResourceKind>,
    /// Copy program whose presence is required on each host.
    pub tool: &'a str,
    pub volume_root: &'a str,
}

/// Run every check against the store and the hosts it can resolve.
pub fn check(
    store: &dyn ConfigStore,
    sessions: &mut Sessions<'_>,
    request: &PreflightRequest<'_>,
) -> PreflightReport {
    let mut report = PreflightReport::default();
    let source_name = format!("source host '{}'", request.source_host);
    let target_name = format!("target host '{}'", request.target_host);
    let resource_name = format!("resource '{}'", request.resource);

    if let Err(e) = store.ping() {
        report.record("configuration store", CheckOutcome::Fail(e.to_string()));
        let skip = || CheckOutcome::Skip("configuration store unreachable".into());
        report.record(source_name, skip());
        report.record(target_name, skip());
        report.record(resource_name, skip());
        report.record("target destination", skip());
        return report;
    }
    report.record("configuration store", CheckOutcome::Pass);

    let locator = Locator::new(store);
    let source = resolve_host(&mut report, &locator, source_name, request.source_host);
    let target = resolve_host(&mut report, &locator, target_name, request.target_host);

    match locator.find_resource(request.resource, request.expected) {
        Ok(Some(record)) => match (&source, record.server_id) {
            (Some(host), Some(server_id)) if server_id != host.id => report.record(
                resource_name,
                CheckOutcome::Fail(format!(
                    "bound to host id {server_id}, not '{}'",
                    host.name
                )),
            ),
            _ => report.record(resource_name, CheckOutcome::Pass),
        },
        Ok(None) => report.record(resource_name, CheckOutcome::Fail("not found".into())),
        Err(e) => report.record(resource_name, CheckOutcome::Fail(e.to_string())),
    }

    match &target {
        Some(host) => match locator.destination(host) {
            Ok(_) => report.record("target destination", CheckOutcome::Pass),
            Err(e) => report.record("target destination", CheckOutcome::Fail(e.to_string())),
        },
        None => report.record(
            "target destination",
            CheckOutcome::Skip("target host not found".into()),
        ),
    }

    for host in [source.as_ref(), target.as_ref()].into_iter().flatten() {
        let ssh_name = format!("ssh to {}", host.name);
        let tool_name = format!("{} on {}", request.tool, host.name);
        let session = match sessions.get(host) {
            Ok(session) => {
                report.record(ssh_name, CheckOutcome::Pass);
                session
            }
            Err(e) => {
                report.record(ssh_name, CheckOutcome::Fail(e.to_string()));
                report.record(tool_name, CheckOutcome::Skip("host unreachable".into()));
                continue;
            }
        };
        let outcome = match VolumeProbe::new(&*session, request.volume_root).has_tool(request.tool) {
            Ok(true) => CheckOutcome::Pass,
            Ok(false) => CheckOutcome::Fail("not installed".into()),
            Err(e) => CheckOutcome::Fail(e.to_string()),
        };
        report.record(tool_name, outcome);
    }

    report
}

fn resolve_host(
    report: &mut PreflightReport,
    locator: &Locator<'_>,
    name: String,
    identifier: &str,
) -> Option<HostDescriptor> {
    match locator.find_host(identifier) {
        Ok(Some(host)) => {
            report.record(name, CheckOutcome::Pass);
            Some(host)
        }
        Ok(None) => {
            report.record(name, CheckOutcome::Fail("not found".into()));
            None
        }
        Err(e) => {
            report.record(name, CheckOutcome::Fail(e.to_string()));
            None
        }
    }
}
