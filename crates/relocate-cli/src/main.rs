//! Relocate - move platform resources between hosts
//!
//! Usage:
//!   relocate move -r <resource> -f <host> -t <host>   # Move a service or database
//!   relocate volume -v <volume> -f <host> -t <host>   # Move one volume's data
//!   relocate list                                     # Show hosts and resources
//!   relocate batch -c migrations.yaml                 # Run a batch file
//!   relocate migrate                                  # Interactive wizard
//!   relocate init                                     # Write a default config

mod interactive;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relocate_core::batch::{self, BatchEvent, BatchOptions, BatchSummary};
use relocate_core::config::{ConfigFile, DockerCli};
use relocate_core::context::AppContext;
use relocate_core::inventory::{self, Inventory};
use relocate_core::migrate::{
    MigrationOptions, MigrationReport, MoveRequest, VolumeMoveReport, VolumeMoveRequest,
};
use relocate_core::platform::PlatformResource;
use relocate_core::preflight::format_bytes;
use relocate_core::types::ResourceKind;

use crate::interactive::{MigrationWizard, PrefilledOptions};

#[derive(Parser)]
#[command(name = "relocate")]
#[command(about = "Move services and databases between hosts", long_about = None)]
struct Cli {
    /// Configuration file (default: <config dir>/relocate/relocate.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a service or standalone database to another host
    Move {
        /// Resource name or UUID
        #[arg(short, long)]
        resource: String,
        /// Source host name or UUID
        #[arg(short, long)]
        from: String,
        /// Target host name or UUID
        #[arg(short, long)]
        to: String,
        /// Resource type to try first (service, postgresql, redis, ...)
        #[arg(long = "type")]
        kind: Option<ResourceKind>,
        /// Name for the clone (defaults to the current name)
        #[arg(long)]
        name: Option<String>,
        /// Show what would happen without changing anything
        #[arg(long)]
        dry_run: bool,
        /// Do not check free disk space on the target
        #[arg(long)]
        skip_space_check: bool,
        /// Stop the source through the platform API first
        #[arg(long)]
        stop_source: bool,
        /// Continue even if preflight checks fail
        #[arg(long)]
        force: bool,
    },

    /// Copy a single Docker volume to another host
    Volume {
        /// Volume name on the source host
        #[arg(short, long)]
        volume: String,
        /// Source host name or UUID
        #[arg(short, long)]
        from: String,
        /// Target host name or UUID
        #[arg(short, long)]
        to: String,
        /// Volume name on the target host (defaults to the source name)
        #[arg(long)]
        target_volume: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        skip_space_check: bool,
    },

    /// List hosts, services, applications and databases
    List {
        /// Only show resources on this host
        #[arg(short, long)]
        server: Option<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },

    /// Run the migrations listed in a YAML file, one after another
    Batch {
        /// Batch file
        #[arg(short = 'c', long = "file")]
        file: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        skip_space_check: bool,
        /// Continue tasks past failed preflight checks
        #[arg(long)]
        force: bool,
    },

    /// Interactive migration wizard
    Migrate,

    /// Write a default configuration file
    Init,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "relocate=debug,info"
    } else {
        "relocate=info,warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    run_cli(cli.command, cli.config.as_deref())
}

fn run_cli(command: Commands, config: Option<&Path>) -> Result<()> {
    match command {
        Commands::Init => run_init(config),
        Commands::Move {
            resource,
            from,
            to,
            kind,
            name,
            dry_run,
            skip_space_check,
            stop_source,
            force,
        } => {
            let request = MoveRequest {
                resource,
                from,
                to,
                options: MigrationOptions {
                    new_name: name,
                    expected: kind,
                    dry_run,
                    skip_space_check,
                    stop_source,
                    force,
                },
            };
            let ctx = load_context(config)?;
            let report = ctx.migrator().run_move(&request)?;
            print_move_report(&report);
            Ok(())
        }
        Commands::Volume {
            volume,
            from,
            to,
            target_volume,
            dry_run,
            skip_space_check,
        } => {
            let request = VolumeMoveRequest {
                volume,
                from,
                to,
                target_volume,
                dry_run,
                skip_space_check,
            };
            let ctx = load_context(config)?;
            let report = ctx.migrator().run_volume_move(&request)?;
            print_volume_report(&report);
            Ok(())
        }
        Commands::List { server, format } => {
            let ctx = load_context(config)?;
            let inventory = inventory::collect(ctx.require_platform()?, server.as_deref())?;
            match format {
                OutputFormat::Table => print_inventory(&inventory),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&inventory)?),
            }
            Ok(())
        }
        Commands::Batch {
            file: batch_file,
            dry_run,
            skip_space_check,
            force,
        } => {
            let file = batch::load_batch_file(&batch_file)?;
            let ctx = load_context(config)?;
            let options = BatchOptions {
                dry_run,
                skip_space_check,
                force,
            };
            let migrator = ctx.migrator();
            let summary = batch::run_batch(&file.migrations, &options, &migrator, print_batch_event);
            print_batch_summary(&summary);
            if !summary.succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Migrate => run_wizard(config),
    }
}

fn load_context(config: Option<&Path>) -> Result<AppContext> {
    AppContext::load(config, &DockerCli)
}

fn run_init(config: Option<&Path>) -> Result<()> {
    let outcome = ConfigFile::resolve(config)?.init()?;
    if outcome.created {
        println!("✓ Wrote configuration to {}", outcome.path.display());
        println!("  Fill in [api] url and token, then run: relocate list");
    } else {
        println!("• Configuration already exists at {}", outcome.path.display());
    }
    Ok(())
}

fn run_wizard(config: Option<&Path>) -> Result<()> {
    let ctx = load_context(config)?;
    let inventory = inventory::collect(ctx.require_platform()?, None)?;
    let mut wizard = MigrationWizard::new(inventory, PrefilledOptions::default());

    let Some(mut request) = wizard.collect()? else {
        return Ok(());
    };
    let migrator = ctx.migrator();
    let checks = migrator.preflight(&request)?;
    wizard.print_preflight(&checks)?;
    if !wizard.confirm_start(&checks)? {
        println!("Migration cancelled.");
        return Ok(());
    }
    request.options.force = !checks.passed();

    let report = migrator.run_move(&request)?;
    print_move_report(&report);
    Ok(())
}

fn print_move_report(report: &MigrationReport) {
    println!();
    for warning in &report.warnings {
        println!("  {} {}", style("[WARN]").yellow(), warning);
    }
    if let Some(space) = &report.space {
        println!(
            "  {} Disk space: need {}, {} available",
            style("[ OK ]").green(),
            format_bytes(space.required),
            format_bytes(space.available)
        );
    }
    if let Some(stage) = report.resumed_from {
        println!("  Resumed after stage: {stage}");
    }

    if let Some(clone) = &report.clone {
        let verb = if report.dry_run { "Would clone" } else { "Cloned" };
        println!(
            "  {} {} '{}' as {} on {}",
            style("•").cyan(),
            verb,
            report.resource,
            clone.uuid,
            report.target_host
        );
        println!(
            "    {} member(s), {} environment variable(s)",
            clone.sub_resources.len(),
            clone.environment_variables
        );
    }
    for volume in &report.transferred {
        println!("    {} -> {}", volume.source, volume.target);
    }

    println!();
    if report.dry_run {
        println!("{}", style("Dry run complete. No changes made.").bold());
        return;
    }
    println!(
        "{} {} '{}' moved from {} to {}",
        style("✓").green(),
        report.kind.display_name(),
        report.resource,
        report.source_host,
        report.target_host
    );
    if let Some(retired) = &report.retired_name {
        println!("  Original kept as '{}'", retired);
    }
    println!();
    println!("Next steps:");
    println!("  1. Deploy the new resource on {} from the platform UI", report.target_host);
    println!("  2. Verify it works");
    if let Some(retired) = &report.retired_name {
        println!("  3. Delete '{}' once you are satisfied", retired);
    }
}

fn print_volume_report(report: &VolumeMoveReport) {
    println!();
    if report.created_target {
        println!(
            "  {} Created volume {} on {}",
            style("[ OK ]").green(),
            report.target_volume,
            report.target_host
        );
    }
    let size = report.size.as_deref().unwrap_or("unknown size");
    if report.dry_run {
        println!(
            "{}",
            style(format!(
                "Dry run complete: {} ({}) would be copied from {} to {} as {}. No changes made.",
                report.source_volume,
                size,
                report.source_host,
                report.target_host,
                report.target_volume
            ))
            .bold()
        );
    } else {
        println!(
            "{} Volume {} ({}) copied from {} to {} as {}",
            style("✓").green(),
            report.source_volume,
            size,
            report.source_host,
            report.target_host,
            report.target_volume
        );
    }
}

fn print_batch_event(event: BatchEvent<'_>) {
    match event {
        BatchEvent::Started { index, total, task } => {
            println!("{}", "=".repeat(80));
            println!("Task {}/{}: {}", index, total, task.describe());
            println!("{}", "=".repeat(80));
        }
        BatchEvent::Completed { index } => {
            println!("{} Task {} completed\n", style("✓").green(), index);
        }
        BatchEvent::Failed { index, error } => {
            println!("{} Task {} failed: {}\n", style("✗").red(), index, error);
        }
    }
}

fn print_batch_summary(summary: &BatchSummary) {
    println!("{}", "=".repeat(80));
    println!("{}", style("BATCH MIGRATION SUMMARY").bold());
    println!("{}", "=".repeat(80));
    println!("  Total tasks: {}", summary.total);
    println!("  Completed:   {}", style(summary.completed).green());
    println!("  Failed:      {}", style(summary.failed).red());
    if !summary.failures.is_empty() {
        println!();
        println!("Failed tasks:");
        for failure in &summary.failures {
            println!("  Task {} ({}): {}", failure.index, failure.description, failure.error);
        }
    }
    println!("{}", "=".repeat(80));
}

fn print_inventory(inventory: &Inventory) {
    let rule = "=".repeat(80);
    println!("{rule}\nHOSTS\n{rule}");
    for host in &inventory.hosts {
        let marker = match &inventory.filter {
            Some(filter) if filter.uuid == host.uuid => " *",
            _ => "",
        };
        println!("  {}{}", style(&host.name).bold(), marker);
        println!("    IP:   {}", host.ip);
        println!("    UUID: {}", host.uuid);
    }

    print_resource_section(inventory, "SERVICES", &inventory.services);
    print_resource_section(inventory, "APPLICATIONS", &inventory.applications);
    print_resource_section(inventory, "DATABASES", &inventory.databases);

    println!("{rule}");
    println!(
        "Total: {} services, {} applications, {} databases",
        inventory.services.len(),
        inventory.applications.len(),
        inventory.databases.len()
    );
    println!("{rule}");
}

fn print_resource_section(inventory: &Inventory, title: &str, resources: &[PlatformResource]) {
    let rule = "=".repeat(80);
    println!("{rule}\n{title}\n{rule}");
    if resources.is_empty() {
        println!("  None found");
        return;
    }
    for resource in resources {
        println!("  {}", style(&resource.name).bold());
        println!("    UUID:   {}", resource.uuid);
        if let Some(kind) = &resource.resource_type {
            println!("    Type:   {}", kind);
        }
        println!(
            "    Host:   {}",
            inventory.host_name(resource).unwrap_or("unknown")
        );
        println!(
            "    Status: {}",
            resource.status.as_deref().unwrap_or("unknown")
        );
        if !resource.persistent_storages.is_empty() {
            println!("    Volumes:");
            for volume in &resource.persistent_storages {
                println!(
                    "      - {} -> {}",
                    volume.display_name(),
                    volume.mount_path.as_deref().unwrap_or("?")
                );
            }
        }
    }
}
