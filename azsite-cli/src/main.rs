mod orchestrator;
mod stack;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};

use azsite_core::effect::Effect;
use azsite_core::plan::PlanSummary;
use azsite_core::provider::ComponentProvider;
use azsite_core::resource::properties_from_json;
use azsite_core::{Context, Urn, Website, WebsiteState};
use azsite_provider_azure::{DEFAULT_LOCATION, SimulatedAzure, WebsiteProvider};
use azsite_state::{BackendError, ChildState, StateBackend, StateFile, create_backend};

use orchestrator::{LocalOrchestrator, Mode, Outcome, Removal, RunReport};
use stack::StackFile;

#[derive(Parser)]
#[command(name = "azsite")]
#[command(about = "Publish static websites to Azure Storage", long_about = None)]
struct Cli {
    /// Path to the stack file
    #[arg(long, global = true, default_value = "azsite.json")]
    file: PathBuf,

    /// State file used when the stack file declares no backend
    #[arg(long, global = true, default_value = "azsite.state.json")]
    state: PathBuf,

    /// File holding the simulated cloud
    #[arg(long, global = true, default_value = ".azsite/cloud.json")]
    cloud: PathBuf,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the stack file
    Validate,
    /// Show what `up` would change without changing anything
    Preview,
    /// Create or update every resource of the stack
    Up,
    /// Destroy every resource recorded in the state
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Print the outputs recorded by the last `up`
    Outputs,
    /// Release a stuck state lock
    ForceUnlock {
        /// ID printed by the command that found the lock
        lock_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match &cli.command {
        Commands::Validate => run_validate(&cli.file),
        Commands::Preview => run_preview(&cli).await,
        Commands::Up => run_up(&cli).await,
        Commands::Destroy { auto_approve } => run_destroy(&cli, *auto_approve).await,
        Commands::Outputs => run_outputs(&cli).await,
        Commands::ForceUnlock { lock_id } => run_force_unlock(&cli, lock_id).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Load and validate the stack file; returns it with the directory it lives in
fn load_stack(file: &Path) -> Result<(StackFile, PathBuf), String> {
    let stack = StackFile::load(file)?;
    if let Err(errors) = stack.validate() {
        for error in &errors {
            eprintln!("  {} {}", "✗".red(), error);
        }
        return Err(format!("{} has {} error(s)", file.display(), errors.len()));
    }
    let base_dir = file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    Ok((stack, base_dir))
}

async fn open_backend(
    cli: &Cli,
    stack: &StackFile,
    base_dir: &Path,
) -> Result<Box<dyn StateBackend>, String> {
    let config = stack.backend_config(base_dir, &cli.state);
    create_backend(&config)
        .await
        .map_err(|e| format!("Failed to open state backend: {}", e))
}

fn website_provider(
    cli: &Cli,
    stack: &StackFile,
    base_dir: &Path,
) -> Result<WebsiteProvider<SimulatedAzure>, String> {
    let cloud = SimulatedAzure::open(&cli.cloud)
        .map_err(|e| format!("Failed to open {}: {}", cli.cloud.display(), e))?;
    Ok(WebsiteProvider::new(cloud)
        .with_location(stack.location.as_deref().unwrap_or(DEFAULT_LOCATION))
        .with_base_dir(base_dir))
}

fn lock_error(e: BackendError) -> String {
    match e {
        BackendError::Locked { ref lock_id, .. } => format!(
            "{}\n  If no other run is active, release it with: azsite force-unlock {}",
            e, lock_id
        ),
        other => format!("Failed to acquire lock: {}", other),
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());

    let (stack, _) = load_stack(file)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            stack.resources.len()
        )
        .green()
        .bold()
    );
    for (name, decl) in &stack.resources {
        println!("  • {} ({})", name, decl.resource_type);
    }
    Ok(())
}

/// A finished run. `registered` is an error when the stack did not fully
/// register; the report still holds whatever converged before that.
struct Execution {
    report: RunReport,
    registered: Result<Vec<Website>, String>,
}

/// Register every declared resource and wait for the orchestrator to finish
async fn execute(
    cli: &Cli,
    stack: &StackFile,
    base_dir: &Path,
    previous: &StateFile,
    mode: Mode,
) -> Result<Execution, String> {
    let provider: Arc<dyn ComponentProvider> = Arc::new(website_provider(cli, stack, base_dir)?);
    let orchestrator = Arc::new(LocalOrchestrator::new(
        provider,
        previous.resources.clone(),
        mode,
    ));
    let ctx = Context::new(&stack.name, stack.stack_name(), orchestrator.clone());

    let registered = register_stack(&ctx, stack);
    let mut report = orchestrator.finish().await?;
    // A stack that did not fully register must not prune anything
    if registered.is_ok() {
        orchestrator.remove_absent(&mut report).await;
    }
    Ok(Execution { report, registered })
}

fn register_stack(ctx: &Context, stack: &StackFile) -> Result<Vec<Website>, String> {
    let mut urns: HashMap<&str, Urn> = HashMap::new();
    let mut websites = Vec::new();

    for name in stack.registration_order()? {
        let decl = stack
            .resources
            .get(name)
            .ok_or_else(|| format!("unknown resource '{}'", name))?;
        let lookup = |other: &str| {
            urns.get(other)
                .cloned()
                .ok_or_else(|| format!("{}: '{}' is not registered", name, other))
        };

        let mut opts = decl.base_options();
        if let Some(parent) = &decl.options.parent {
            opts = opts.parent(lookup(parent.as_str())?);
        }
        for dep in &decl.options.depends_on {
            opts = opts.depends_on(lookup(dep.as_str())?);
        }

        let website = Website::from_properties(ctx, name, &decl.properties(), opts)
            .map_err(|e| format!("{}: {}", name, e))?;
        urns.insert(name, website.urn().clone());
        websites.push(website);
    }
    Ok(websites)
}

async fn run_preview(cli: &Cli) -> Result<(), String> {
    let (stack, base_dir) = load_stack(&cli.file)?;
    let backend = open_backend(cli, &stack, &base_dir).await?;
    let previous = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default();

    let Execution { report, registered } =
        execute(cli, &stack, &base_dir, &previous, Mode::Preview).await?;
    print_preview(&report);
    registered?;

    if report.failures() > 0 {
        return Err(format!("preview failed for {} resource(s)", report.failures()));
    }
    Ok(())
}

async fn run_up(cli: &Cli) -> Result<(), String> {
    let (stack, base_dir) = load_stack(&cli.file)?;
    let backend = open_backend(cli, &stack, &base_dir).await?;
    let lock = backend
        .acquire_lock("up", stack.stack_name())
        .await
        .map_err(lock_error)?;

    let result = up_locked(cli, &stack, &base_dir, backend.as_ref()).await;

    backend
        .release_lock(&lock)
        .await
        .map_err(|e| format!("Failed to release lock: {}", e))?;
    result
}

async fn up_locked(
    cli: &Cli,
    stack: &StackFile,
    base_dir: &Path,
    backend: &dyn StateBackend,
) -> Result<(), String> {
    let mut state = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default();

    println!("{}", "Updating resources...".cyan().bold());
    println!();

    let Execution { report, registered } =
        execute(cli, stack, base_dir, &state, Mode::Apply).await?;

    report.record(&mut state);
    state.increment_serial();
    backend
        .write_state(&state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))?;

    print_update(&report);
    let websites = registered?;

    let failures = report.failures();
    println!();
    if failures == 0 {
        println!(
            "{}",
            format!(
                "Update complete! {} resources converged.",
                report.outcomes.len()
            )
            .green()
            .bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "Update failed. {} succeeded, {} failed.",
                report.outcomes.len() + report.removals.len() - failures,
                failures
            )
            .red()
            .bold()
        );
    }

    let mut printed_header = false;
    for website in &websites {
        if let Ok(outputs) = website.state().get().await {
            if !printed_header {
                println!();
                println!("{}", "Outputs:".cyan().bold());
                printed_header = true;
            }
            print_outputs(website.name(), &outputs);
        }
    }

    if failures > 0 {
        return Err(format!("{} resource(s) failed", failures));
    }
    Ok(())
}

async fn run_destroy(cli: &Cli, auto_approve: bool) -> Result<(), String> {
    let (stack, base_dir) = load_stack(&cli.file)?;
    let backend = open_backend(cli, &stack, &base_dir).await?;
    let lock = backend
        .acquire_lock("destroy", stack.stack_name())
        .await
        .map_err(lock_error)?;

    let result = destroy_locked(cli, &stack, &base_dir, backend.as_ref(), auto_approve).await;

    backend
        .release_lock(&lock)
        .await
        .map_err(|e| format!("Failed to release lock: {}", e))?;
    result
}

async fn destroy_locked(
    cli: &Cli,
    stack: &StackFile,
    base_dir: &Path,
    backend: &dyn StateBackend,
    auto_approve: bool,
) -> Result<(), String> {
    let Some(mut state) = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .filter(|s| !s.resources.is_empty())
    else {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    };

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for resource in state.resources.iter().rev() {
        println!(
            "  {} {} ({} child resources)",
            "-".red().bold(),
            resource.name,
            resource.children.len()
        );
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        state.resources.len().to_string().red()
    );
    println!();

    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy all resources?"
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let provider = website_provider(cli, stack, base_dir)?;
    let mut success_count = 0;
    let mut failure_count = 0;

    let recorded: Vec<_> = state.resources.iter().rev().cloned().collect();
    for resource in recorded {
        if resource.protected {
            println!(
                "  {} {} - protected resources cannot be destroyed",
                "✗".red(),
                resource.name
            );
            failure_count += 1;
            continue;
        }

        match provider.destroy(resource.to_component()).await {
            Ok(()) => {
                println!("  {} Destroy {}", "✓".green(), resource.name);
                state.remove_resource(&resource.urn);
                success_count += 1;
            }
            Err(failure) => {
                println!("  {} Destroy {} - {}", "✗".red(), resource.name, failure);
                if let Some(record) = state.find_resource_mut(&resource.urn) {
                    record.children = failure.children.iter().map(ChildState::from_state).collect();
                }
                failure_count += 1;
            }
        }
    }

    state.increment_serial();
    backend
        .write_state(&state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))?;

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        println!(
            "{}",
            format!(
                "Destroy failed. {} succeeded, {} failed.",
                success_count, failure_count
            )
            .red()
            .bold()
        );
        Err(format!("{} resource(s) could not be destroyed", failure_count))
    }
}

async fn run_outputs(cli: &Cli) -> Result<(), String> {
    let stack = StackFile::load(&cli.file)?;
    let base_dir = cli.file.parent().unwrap_or(Path::new("."));
    let backend = open_backend(cli, &stack, base_dir).await?;
    let state = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default();

    if state.resources.is_empty() {
        println!("{}", "No outputs. Run `azsite up` first.".yellow());
        return Ok(());
    }

    for resource in &state.resources {
        let outputs = properties_from_json(&resource.outputs);
        match WebsiteState::from_outputs(&resource.urn, &outputs) {
            Ok(outputs) => print_outputs(&resource.name, &outputs),
            Err(e) => println!("{}\n  {} {}", resource.name.bold(), "✗".red(), e),
        }
    }
    Ok(())
}

async fn run_force_unlock(cli: &Cli, lock_id: &str) -> Result<(), String> {
    let stack = StackFile::load(&cli.file)?;
    let base_dir = cli.file.parent().unwrap_or(Path::new("."));
    let backend = open_backend(cli, &stack, base_dir).await?;
    backend
        .force_unlock(lock_id)
        .await
        .map_err(|e| format!("Failed to unlock: {}", e))?;
    println!("{}", format!("✓ Lock {} released.", lock_id).green().bold());
    Ok(())
}

fn effect_symbol(effect: &Effect) -> ColoredString {
    match effect {
        Effect::Create(_) => effect.symbol().green().bold(),
        Effect::Update { .. } => effect.symbol().yellow().bold(),
        Effect::Replace { .. } | Effect::Delete { replaced: true, .. } => {
            effect.symbol().magenta().bold()
        }
        Effect::Delete { .. } => effect.symbol().red().bold(),
    }
}

fn print_preview(report: &RunReport) {
    let mut summary = PlanSummary::default();
    let mut changes = 0;

    for outcome in &report.outcomes {
        if let Outcome::Planned { plan, replaces, .. } = outcome {
            summary += plan.summary();
            if !plan.is_empty() || *replaces {
                changes += 1;
            }
        }
    }
    let failed = report.outcomes.iter().any(Outcome::is_failed);

    if changes == 0 && report.removals.is_empty() && !failed {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for outcome in &report.outcomes {
        let name = &outcome.request().name;
        match outcome {
            Outcome::Planned { plan, replaces, .. } => {
                if plan.is_empty() && !replaces {
                    continue;
                }
                if *replaces {
                    println!("  {} {} (replace)", "+-".magenta().bold(), name.bold());
                } else {
                    println!("  {} {}", "~".yellow().bold(), name.bold());
                }
                for effect in plan.effects() {
                    println!("      {} {}", effect_symbol(effect), effect);
                }
            }
            Outcome::Failed { error, .. } => {
                println!("  {} {} - {}", "✗".red(), name.bold(), error);
            }
            Outcome::Converged { .. } => {}
        }
    }

    for removal in &report.removals {
        match removal {
            Removal::Planned(resource) => {
                println!("  {} {}", "-".red().bold(), resource.name.bold());
                summary.delete += resource.children.len();
            }
            Removal::Failed {
                resource, error, ..
            } => println!("  {} {} - {}", "✗".red(), resource.name.bold(), error),
            Removal::Destroyed(_) => {}
        }
    }

    println!();
    println!("{}.", summary);
}

fn print_update(report: &RunReport) {
    for outcome in &report.outcomes {
        let name = &outcome.request().name;
        match outcome {
            Outcome::Converged { state, .. } => println!(
                "  {} {} ({} child resources)",
                "✓".green(),
                name,
                state.children.len()
            ),
            Outcome::Failed { error, .. } => println!("  {} {} - {}", "✗".red(), name, error),
            Outcome::Planned { .. } => {}
        }
    }

    for removal in &report.removals {
        match removal {
            Removal::Destroyed(resource) => {
                println!("  {} Destroy {}", "✓".green(), resource.name)
            }
            Removal::Failed {
                resource, error, ..
            } => println!("  {} Destroy {} - {}", "✗".red(), resource.name, error),
            Removal::Planned(_) => {}
        }
    }
}

fn print_outputs(name: &str, outputs: &WebsiteState) {
    println!("  {}", name.bold());
    println!("    {:<18} {}", "originURL", outputs.origin_url);
    if let Some(url) = &outputs.cdn_url {
        println!("    {:<18} {}", "cdnURL", url);
    }
    if let Some(url) = &outputs.custom_domain_url {
        println!("    {:<18} {}", "customDomainURL", url);
    }
    println!("    {:<18} {}", "resourceGroupName", outputs.resource_group_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use azsite_state::LocalBackend;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn partial_registration_still_records_converged_resources() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("site")).unwrap();
        fs::write(dir.path().join("site/index.html"), "<h1>docs</h1>").unwrap();
        let cloud = dir.path().join("cloud.json");
        let cli = Cli::parse_from(["azsite", "--cloud", cloud.to_str().unwrap(), "up"]);

        // `b` is registered after `a` and has no sitePath
        let stack = StackFile::parse(
            r#"{ "name": "docs", "resources": {
                "a": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "site" } },
                "b": { "type": "azure-static-website:index:Website", "properties": {} }
            } }"#,
        )
        .unwrap();
        let backend = LocalBackend::with_path(dir.path().join("state.json"));

        let err = up_locked(&cli, &stack, dir.path(), &backend)
            .await
            .unwrap_err();
        assert!(err.starts_with("b:"));

        let state = backend.read_state().await.unwrap().unwrap();
        assert_eq!(state.resources.len(), 1);
        assert_eq!(state.resources[0].name, "a");
        assert!(!state.resources[0].children.is_empty());
    }
}
