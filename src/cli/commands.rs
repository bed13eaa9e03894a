//! Command dispatch: loads settings, wires services and renders results.

use std::path::{Path, PathBuf};

use chrono::Utc;
use itertools::Itertools;
use tracing::{debug, instrument};

use crate::application::services::{RollupStatus, TenantHealth};
use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{
    CustomerId, PointId, ProjectId, RollupResult, Timestamp, TreeIndex, TreeNodeConvert,
};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

/// Execute the parsed command.
pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let project_dir = resolve_project_dir(cli.project_dir.as_deref())?;
    let mut settings = Settings::load(Some(&project_dir))?;
    if let Some(data_file) = &cli.data_file {
        settings.data_file = data_file.clone();
    }
    debug!("data file: {}", settings.data_file.display());

    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see --help".to_string(),
        ));
    };

    match command {
        Commands::Config { command } => cmd_config(command, &settings, &project_dir),
        Commands::Completion { .. } => Err(CliError::Usage(
            "completion is handled before dispatch".to_string(),
        )),
        other => {
            let container = load_container(settings)?;
            match other {
                Commands::Tree { tenant } => cmd_tree(&container, *tenant),
                Commands::Path { id } => cmd_path(&container, *id),
                Commands::Rollup { tenant, persist } => cmd_rollup(&container, *tenant, *persist),
                Commands::Delete { id, at } => cmd_delete(&container, *id, *at),
                Commands::Restore { id } => cmd_restore(&container, *id),
                Commands::Move { id, parent } => cmd_move(&container, *id, *parent),
                Commands::Scope { project, tenant } => cmd_scope(&container, *tenant, *project),
                Commands::Report { project, tenant } => cmd_report(&container, *tenant, *project),
                Commands::Health => cmd_health(&container),
                Commands::Config { .. } | Commands::Completion { .. } => Ok(()),
            }
        }
    }
}

fn resolve_project_dir(project_dir: Option<&Path>) -> CliResult<PathBuf> {
    match project_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => std::env::current_dir()
            .map_err(|e| CliError::Infra(InfraError::io("resolve current directory", e))),
    }
}

/// Wire services and build every customer's tree. Failed customers are reported, not fatal.
fn load_container(settings: Settings) -> CliResult<ServiceContainer> {
    let container = ServiceContainer::new(settings);
    let report = container.registry.load_all()?;
    for (customer, e) in &report.failed {
        output::warning(&format!("customer {}: {}", customer, e));
    }
    debug!(
        "loaded {} customer(s), {} failed",
        report.loaded.len(),
        report.failed.len()
    );
    Ok(container)
}

fn selected_customers(
    container: &ServiceContainer,
    tenant: Option<CustomerId>,
) -> CliResult<Vec<CustomerId>> {
    match tenant {
        Some(customer) => Ok(vec![customer]),
        None => Ok(container.registry.customers()?),
    }
}

#[instrument(skip(container))]
fn cmd_tree(container: &ServiceContainer, tenant: Option<CustomerId>) -> CliResult<()> {
    for customer in selected_customers(container, tenant)? {
        output::header(&format!("customer {}", customer));
        match container.registry.tree(customer) {
            Ok(tree) => print_forest(&tree),
            Err(e) => output::failure(&e),
        }
    }
    Ok(())
}

fn print_forest(tree: &TreeIndex) {
    if tree.is_empty() {
        output::detail(&"(no points)");
        return;
    }
    for root in tree.to_tree_strings() {
        output::info(&root);
    }
    for drift in tree.drift() {
        output::warning(&format!(
            "#{}: stored path [{}] differs from [{}]",
            drift.point,
            drift.stored.iter().join("."),
            drift.derived.iter().join(".")
        ));
    }
}

#[instrument(skip(container))]
fn cmd_path(container: &ServiceContainer, id: PointId) -> CliResult<()> {
    let customer = container.registry.customer_of(id)?;
    let breadcrumbs = container.registry.full_path(customer, id)?;
    output::info(
        &breadcrumbs
            .iter()
            .map(|b| format!("{} [{} #{}]", b.name, b.label, b.id))
            .join(" > "),
    );
    Ok(())
}

#[instrument(skip(container))]
fn cmd_rollup(
    container: &ServiceContainer,
    tenant: Option<CustomerId>,
    persist: bool,
) -> CliResult<()> {
    let registry = &container.registry;
    let customers = selected_customers(container, tenant)?;
    if tenant.is_none() {
        // computes every dirty customer at once; the per-customer calls below hit the cache
        registry.rollup_all()?;
    }

    let mut first_failure = None;
    for customer in customers {
        output::header(&format!("customer {}", customer));
        match registry.rollup(customer) {
            Ok(result) => {
                print_rollup(&result);
                if persist {
                    let written = registry.persist_rollup(customer)?;
                    output::action("Persisted", &format!("{} internal point(s)", written));
                }
            }
            Err(e) => {
                output::failure(&e);
                first_failure.get_or_insert(e);
            }
        }
    }
    match first_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn print_rollup(result: &RollupResult) {
    output::detail(&format!(
        "leaf averages: cost {} cost/kg {} amount {}",
        output::metric(result.leaf_averages.cost),
        output::metric(result.leaf_averages.cost_per_kg),
        output::metric(result.leaf_averages.amount)
    ));
    for (id, metrics) in &result.aggregates {
        output::success_detail(&format!(
            "#{}: cost {} cost/kg {} amount {}",
            id,
            output::metric(metrics.cost),
            output::metric(metrics.cost_per_kg),
            output::metric(metrics.amount)
        ));
    }
}

#[instrument(skip(container))]
fn cmd_delete(container: &ServiceContainer, id: PointId, at: Option<Timestamp>) -> CliResult<()> {
    let customer = container.registry.customer_of(id)?;
    let at = at.unwrap_or_else(Utc::now);
    let outcome = container.registry.soft_delete(customer, id, at)?;
    if outcome.is_empty() {
        output::warning(&format!("#{} is already deleted", id));
        return Ok(());
    }
    output::action(
        "Deleted",
        &format!(
            "{} point(s) at {}: {}",
            outcome.affected.len(),
            at.to_rfc3339(),
            outcome.affected.iter().map(|p| format!("#{}", p)).join(", ")
        ),
    );
    Ok(())
}

#[instrument(skip(container))]
fn cmd_restore(container: &ServiceContainer, id: PointId) -> CliResult<()> {
    let customer = container.registry.customer_of(id)?;
    let outcome = container.registry.restore(customer, id)?;
    if outcome.is_empty() {
        output::warning(&format!("#{} is not deleted", id));
        return Ok(());
    }
    output::action("Restored", &format!("#{} (descendants stay deleted)", id));
    Ok(())
}

#[instrument(skip(container))]
fn cmd_move(container: &ServiceContainer, id: PointId, parent: Option<PointId>) -> CliResult<()> {
    let customer = container.registry.customer_of(id)?;
    let rewritten = container.registry.reparent(customer, id, parent)?;
    let target = parent
        .map(|p| format!("#{}", p))
        .unwrap_or_else(|| "root".to_string());
    output::action(
        "Moved",
        &format!("#{} under {}, {} path(s) rewritten", id, target, rewritten.len()),
    );
    Ok(())
}

#[instrument(skip(container))]
fn cmd_scope(container: &ServiceContainer, customer: CustomerId, project: ProjectId) -> CliResult<()> {
    let scope = container.reports.effective_members(customer, project)?;
    output::header(&format!(
        "project {} / customer {}: {} leaf point(s)",
        project,
        customer,
        scope.members.len()
    ));
    let tree = container.registry.tree(customer)?;
    for id in &scope.members {
        match tree.get(*id) {
            Some(point) => output::detail(point),
            None => output::detail(&format!("#{}", id)),
        }
    }
    for rejected in &scope.rejected {
        output::warning(rejected);
    }
    Ok(())
}

#[instrument(skip(container))]
fn cmd_report(container: &ServiceContainer, customer: CustomerId, project: ProjectId) -> CliResult<()> {
    let report = container.reports.report(customer, project)?;
    output::header(&format!(
        "project {} / customer {}: {} registration(s)",
        report.project_id,
        report.customer_id,
        report.registrations.len()
    ));
    for registration in &report.registrations {
        output::detail(&format!(
            "{}  #{:<6} amount {:>10.2}  cost {:>10.2}",
            registration.date,
            registration.registration_point_id,
            registration.amount,
            registration.cost
        ));
    }
    output::info(&format!(
        "total amount {:.2}, total cost {:.2}",
        report.total_amount, report.total_cost
    ));
    for warning in &report.scope_warnings {
        output::warning(warning);
    }
    if report.aggregates.stale {
        let reason = report
            .aggregates
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "not recomputed".to_string());
        output::warning(&format!("aggregates are stale: {}", reason));
    }
    Ok(())
}

fn describe_health(health: &TenantHealth) -> String {
    let rollup = match &health.rollup {
        RollupStatus::Never => "never".to_string(),
        RollupStatus::Fresh => "fresh".to_string(),
        RollupStatus::Dirty => "dirty".to_string(),
        RollupStatus::Failed(e) => format!("failed ({})", e),
    };
    format!(
        "customer {}: {} point(s), {} drifted path(s), rollup {}",
        health.customer_id, health.points, health.drift, rollup
    )
}

#[instrument(skip(container))]
fn cmd_health(container: &ServiceContainer) -> CliResult<()> {
    let health = container.registry.health()?;
    let mut unhealthy = None;
    for tenant in &health {
        if tenant.is_healthy() {
            output::success_detail(&describe_health(tenant));
            continue;
        }
        output::failure(&describe_health(tenant));
        if let Some(e) = &tenant.error {
            output::detail(e);
        }
        unhealthy.get_or_insert(tenant.customer_id);
    }
    match unhealthy {
        Some(customer) => Err(ApplicationError::TenantUnhealthy {
            customer,
            reason: "see health output".to_string(),
        }
        .into()),
        None => Ok(()),
    }
}

fn cmd_config(command: &ConfigCommands, settings: &Settings, project_dir: &Path) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Template => {
            output::info(&Settings::template());
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("cannot determine global config directory".to_string())
                })?
            } else {
                local_config_path(project_dir)
            };
            if path.exists() {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .map_err(|e| InfraError::io(format!("create {}", dir.display()), e))?;
            }
            std::fs::write(&path, Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::action("Created", &path.display());
            Ok(())
        }
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::info(&format!(
                    "global: {} ({})",
                    path.display(),
                    if path.exists() { "exists" } else { "missing" }
                )),
                None => output::info(&"global: (no config directory)"),
            }
            let local = local_config_path(project_dir);
            output::info(&format!(
                "local:  {} ({})",
                local.display(),
                if local.exists() { "exists" } else { "missing" }
            ));
            output::info(&format!("data:   {}", settings.data_file.display()));
            Ok(())
        }
    }
}
