//! Interactive flow for the `migrate` command.
//!
//! Walks the operator through choosing a source host, a resource on it, a
//! target host and the move options, then shows the preflight report and asks
//! for confirmation. Uses dialoguer for terminal UI prompts.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, MultiSelect, Select, theme::ColorfulTheme};

use relocate_core::inventory::Inventory;
use relocate_core::migrate::{MigrationOptions, MoveRequest};
use relocate_core::platform::{PlatformHost, PlatformResource};
use relocate_core::preflight::{CheckOutcome, PreflightReport};
use relocate_core::types::ResourceKind;

/// Pre-filled values that skip the matching prompts.
#[derive(Debug, Clone, Default)]
pub struct PrefilledOptions {
    pub source: Option<String>,
    pub resource: Option<String>,
    pub target: Option<String>,
    pub stop_source: Option<bool>,
    pub skip_space_check: Option<bool>,
    pub dry_run: Option<bool>,
    /// Skip all confirmations
    pub yes: bool,
}

/// A movable resource offered for selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChoice {
    pub uuid: String,
    pub name: String,
    pub kind: ResourceKind,
}

impl ResourceChoice {
    fn label(&self) -> String {
        format!("{} ({})", self.name, self.kind.label())
    }

    fn matches(&self, identifier: &str) -> bool {
        self.uuid == identifier || self.name == identifier
    }
}

/// Kind of a platform database from its reported type, e.g. `standalone-postgresql`.
pub fn database_kind(resource: &PlatformResource) -> Option<ResourceKind> {
    let reported = resource.resource_type.as_deref()?;
    reported
        .strip_prefix("standalone-")
        .unwrap_or(reported)
        .parse()
        .ok()
        .filter(|kind: &ResourceKind| kind.is_database())
}

/// Services and databases bound to `host`.
pub fn resources_on(inventory: &Inventory, host: &PlatformHost) -> Vec<ResourceChoice> {
    let on_host = |r: &&PlatformResource| host.id.is_some() && r.server_id == host.id;
    let mut choices: Vec<ResourceChoice> = inventory
        .databases
        .iter()
        .filter(on_host)
        .filter_map(|r| {
            database_kind(r).map(|kind| ResourceChoice {
                uuid: r.uuid.clone(),
                name: r.name.clone(),
                kind,
            })
        })
        .collect();
    choices.extend(
        inventory
            .services
            .iter()
            .filter(on_host)
            .map(|r| ResourceChoice {
                uuid: r.uuid.clone(),
                name: r.name.clone(),
                kind: ResourceKind::Service,
            }),
    );
    choices
}

pub struct MigrationWizard<W: Write = io::Stdout> {
    inventory: Inventory,
    prefilled: PrefilledOptions,
    writer: W,
    theme: ColorfulTheme,
}

impl MigrationWizard<io::Stdout> {
    pub fn new(inventory: Inventory, prefilled: PrefilledOptions) -> Self {
        Self {
            inventory,
            prefilled,
            writer: io::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> MigrationWizard<W> {
    #[cfg(test)]
    pub fn with_writer(inventory: Inventory, prefilled: PrefilledOptions, writer: W) -> Self {
        Self {
            inventory,
            prefilled,
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    /// Collect a move request. `None` if there is nothing to move.
    ///
    /// Flow:
    /// 1. Select source host
    /// 2. Select a service or database on it
    /// 3. Select target host among the others
    /// 4. Choose options
    /// 5. Show summary
    pub fn collect(&mut self) -> Result<Option<MoveRequest>> {
        self.print_header()?;

        if self.inventory.hosts.is_empty() {
            writeln!(self.writer, "  {}", style("No hosts found.").red())?;
            return Ok(None);
        }

        let source = self.prompt_source()?;
        let resources = resources_on(&self.inventory, &source);
        if resources.is_empty() {
            writeln!(
                self.writer,
                "  {}",
                style(format!("No movable resources found on {}", source.name)).yellow()
            )?;
            return Ok(None);
        }
        let resource = self.prompt_resource(&resources)?;

        let targets: Vec<PlatformHost> = self
            .inventory
            .hosts
            .iter()
            .filter(|h| h.uuid != source.uuid)
            .cloned()
            .collect();
        if targets.is_empty() {
            writeln!(
                self.writer,
                "  {}",
                style("No other hosts available as target.").red()
            )?;
            return Ok(None);
        }
        let target = self.prompt_target(&targets)?;

        let options = self.prompt_options(&resource)?;
        let request = MoveRequest {
            resource: resource.uuid.clone(),
            from: source.name.clone(),
            to: target.name.clone(),
            options,
        };
        self.print_summary(&request, &resource)?;
        Ok(Some(request))
    }

    fn print_header(&mut self) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{}",
            style("  Relocate Migration Wizard").bold().cyan()
        )?;
        writeln!(self.writer)?;
        Ok(())
    }

    fn select_host(&self, prompt: &str, hosts: &[PlatformHost], prefilled: Option<&str>) -> Result<PlatformHost> {
        if let Some(identifier) = prefilled {
            return hosts
                .iter()
                .find(|h| h.matches(identifier))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Host not found: {identifier}"));
        }

        let labels: Vec<String> = hosts.iter().map(|h| format!("{} ({})", h.name, h.ip)).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(&labels)
            .default(0)
            .interact()?;
        Ok(hosts[selection].clone())
    }

    fn prompt_source(&self) -> Result<PlatformHost> {
        self.select_host(
            "Select source host",
            &self.inventory.hosts,
            self.prefilled.source.as_deref(),
        )
    }

    fn prompt_target(&self, hosts: &[PlatformHost]) -> Result<PlatformHost> {
        self.select_host("Select target host", hosts, self.prefilled.target.as_deref())
    }

    fn prompt_resource(&self, resources: &[ResourceChoice]) -> Result<ResourceChoice> {
        if let Some(identifier) = &self.prefilled.resource {
            return resources
                .iter()
                .find(|r| r.matches(identifier))
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Resource not found on source host: {identifier}"));
        }

        let labels: Vec<String> = resources.iter().map(ResourceChoice::label).collect();
        let selection = Select::with_theme(&self.theme)
            .with_prompt("Select resource to move")
            .items(&labels)
            .default(0)
            .interact()?;
        Ok(resources[selection].clone())
    }

    fn prompt_options(&self, resource: &ResourceChoice) -> Result<MigrationOptions> {
        let base = MigrationOptions {
            expected: Some(resource.kind),
            ..MigrationOptions::default()
        };
        let prefilled = &self.prefilled;
        if let (Some(stop_source), Some(skip_space_check), Some(dry_run)) =
            (prefilled.stop_source, prefilled.skip_space_check, prefilled.dry_run)
        {
            return Ok(MigrationOptions {
                stop_source,
                skip_space_check,
                dry_run,
                ..base
            });
        }

        let items = [
            "Stop source before migration (recommended for databases)",
            "Skip disk space check",
            "Dry run (don't make changes)",
        ];
        let defaults = [
            prefilled.stop_source.unwrap_or(resource.kind.is_database()),
            prefilled.skip_space_check.unwrap_or(false),
            prefilled.dry_run.unwrap_or(false),
        ];
        let selections = MultiSelect::with_theme(&self.theme)
            .with_prompt("Options (space to toggle, enter to confirm)")
            .items(&items)
            .defaults(&defaults)
            .interact()?;

        Ok(MigrationOptions {
            stop_source: selections.contains(&0),
            skip_space_check: selections.contains(&1),
            dry_run: selections.contains(&2),
            ..base
        })
    }

    fn print_summary(&mut self, request: &MoveRequest, resource: &ResourceChoice) -> Result<()> {
        let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", style("  Summary").bold())?;
        writeln!(self.writer, "  ───────────────────────────")?;
        writeln!(self.writer, "  Resource:    {}", style(&resource.name).green())?;
        writeln!(self.writer, "  Type:        {}", style(resource.kind.display_name()).green())?;
        writeln!(self.writer, "  From:        {}", style(&request.from).green())?;
        writeln!(self.writer, "  To:          {}", style(&request.to).green())?;
        writeln!(
            self.writer,
            "  Stop source: {}",
            style(yes_no(request.options.stop_source)).green()
        )?;
        writeln!(
            self.writer,
            "  Dry run:     {}",
            style(yes_no(request.options.dry_run)).green()
        )?;
        writeln!(self.writer)?;
        Ok(())
    }

    /// Print each check with its marker.
    pub fn print_preflight(&mut self, report: &PreflightReport) -> Result<()> {
        writeln!(self.writer, "{}", style("  Pre-flight checks").bold())?;
        for check in &report.checks {
            let (marker, detail) = match &check.outcome {
                CheckOutcome::Pass => (style("[ OK ]").green(), String::new()),
                CheckOutcome::Fail(reason) => (style("[FAIL]").red(), format!(" - {reason}")),
                CheckOutcome::Skip(reason) => (style("[SKIP]").yellow(), format!(" - {reason}")),
            };
            writeln!(self.writer, "  {} {}{}", marker, check.name, detail)?;
        }
        writeln!(self.writer)?;
        if report.passed() {
            writeln!(self.writer, "  {}", style("All pre-flight checks passed!").green())?;
        } else {
            writeln!(
                self.writer,
                "  {}",
                style("Some pre-flight checks failed.").red()
            )?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    /// Ask whether to continue past failures, then whether to start.
    pub fn confirm_start(&mut self, report: &PreflightReport) -> Result<bool> {
        if self.prefilled.yes {
            return Ok(true);
        }

        if !report.passed() {
            let continue_anyway = Confirm::with_theme(&self.theme)
                .with_prompt("Some checks failed. Continue anyway?")
                .default(false)
                .interact()?;
            if !continue_anyway {
                return Ok(false);
            }
        }

        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt("Start migration?")
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relocate_core::preflight::CheckResult;

    fn host(id: i64, name: &str) -> PlatformHost {
        PlatformHost {
            id: Some(id),
            uuid: format!("{name}-uuid"),
            name: name.to_string(),
            ip: format!("10.0.0.{id}"),
        }
    }

    fn resource(uuid: &str, name: &str, server_id: i64, resource_type: Option<&str>) -> PlatformResource {
        PlatformResource {
            uuid: uuid.to_string(),
            name: name.to_string(),
            status: Some("running:healthy".to_string()),
            server_id: Some(server_id),
            resource_type: resource_type.map(str::to_string),
            persistent_storages: Vec::new(),
        }
    }

    fn make_inventory() -> Inventory {
        Inventory {
            hosts: vec![host(1, "alpha"), host(2, "beta")],
            services: vec![resource("svc1", "wiki", 1, Some("service"))],
            applications: vec![resource("app1", "site", 1, None)],
            databases: vec![
                resource("db1", "billing", 1, Some("standalone-postgresql")),
                resource("db2", "cache", 2, Some("standalone-redis")),
            ],
            filter: None,
        }
    }

    fn prefilled_all() -> PrefilledOptions {
        PrefilledOptions {
            source: Some("alpha".to_string()),
            resource: Some("billing".to_string()),
            target: Some("beta".to_string()),
            stop_source: Some(true),
            skip_space_check: Some(false),
            dry_run: Some(true),
            yes: true,
        }
    }

    #[test]
    fn test_database_kind_from_reported_type() {
        let db = resource("x", "x", 1, Some("standalone-mariadb"));
        assert_eq!(database_kind(&db), Some(ResourceKind::Mariadb));
        let service = resource("x", "x", 1, Some("service"));
        assert_eq!(database_kind(&service), None);
        let unknown = resource("x", "x", 1, None);
        assert_eq!(database_kind(&unknown), None);
    }

    #[test]
    fn test_resources_on_host_excludes_applications() {
        let inventory = make_inventory();
        let choices = resources_on(&inventory, &inventory.hosts[0]);
        let names: Vec<_> = choices.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["billing", "wiki"]);
        assert_eq!(choices[0].kind, ResourceKind::Postgresql);
        assert_eq!(choices[1].kind, ResourceKind::Service);
    }

    #[test]
    fn test_prefilled_skips_prompts() {
        let mut output = Vec::new();
        let mut wizard =
            MigrationWizard::with_writer(make_inventory(), prefilled_all(), &mut output);

        let request = wizard.collect().unwrap().unwrap();

        assert_eq!(request.resource, "db1");
        assert_eq!(request.from, "alpha");
        assert_eq!(request.to, "beta");
        assert_eq!(request.options.expected, Some(ResourceKind::Postgresql));
        assert!(request.options.stop_source);
        assert!(request.options.dry_run);
        assert!(!request.options.force);
    }

    #[test]
    fn test_summary_output_format() {
        let mut output = Vec::new();
        let mut wizard =
            MigrationWizard::with_writer(make_inventory(), prefilled_all(), &mut output);
        wizard.collect().unwrap();

        let output_str = String::from_utf8(output).unwrap();
        assert!(output_str.contains("Summary"));
        assert!(output_str.contains("billing"));
        assert!(output_str.contains("PostgreSQL"));
        assert!(output_str.contains("beta"));
    }

    #[test]
    fn test_no_resources_on_source_returns_none() {
        let mut inventory = make_inventory();
        inventory.databases.clear();
        inventory.services.clear();
        let mut output = Vec::new();
        let mut wizard = MigrationWizard::with_writer(inventory, prefilled_all(), &mut output);
        assert!(wizard.collect().unwrap().is_none());
    }

    #[test]
    fn test_unknown_prefilled_host_is_an_error() {
        let prefilled = PrefilledOptions {
            source: Some("gamma".to_string()),
            ..prefilled_all()
        };
        let mut output = Vec::new();
        let mut wizard = MigrationWizard::with_writer(make_inventory(), prefilled, &mut output);
        assert!(wizard.collect().is_err());
    }

    #[test]
    fn test_preflight_output_marks_each_check() {
        let report = PreflightReport {
            checks: vec![
                CheckResult {
                    name: "configuration store".to_string(),
                    outcome: CheckOutcome::Pass,
                },
                CheckResult {
                    name: "rsync on beta".to_string(),
                    outcome: CheckOutcome::Fail("not installed".to_string()),
                },
            ],
        };
        let mut output = Vec::new();
        let mut wizard =
            MigrationWizard::with_writer(make_inventory(), prefilled_all(), &mut output);
        wizard.print_preflight(&report).unwrap();
        assert!(wizard.confirm_start(&report).unwrap());

        let output_str = String::from_utf8(output).unwrap();
        assert!(output_str.contains("[ OK ]"));
        assert!(output_str.contains("rsync on beta - not installed"));
        assert!(output_str.contains("Some pre-flight checks failed."));
    }
}
