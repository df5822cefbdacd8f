use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use labsentry::archive::{ArchiveEngine, ArchiveGate};
use labsentry::duplicate::SkipAllPrompt;
use labsentry::{
    AutoSendLog, Config, Daemon, DirectoryScanner, HealthCheck, NotifyChangeSource, NullEvents,
    SendCategory, SendReport, SyncEngine,
};

#[derive(Parser)]
#[command(name = "labsentry")]
#[command(about = "Dental lab case folder watcher and file synchronization daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an initial configuration file
    Init {
        /// Watch folder to scan for case projects
        #[arg(long)]
        watch: Option<String>,

        /// CAM destination folder
        #[arg(long)]
        cam: Option<String>,

        /// Print destination folder
        #[arg(long)]
        print: Option<String>,
    },

    /// Scan the watch folder for projects modified today
    Scan,

    /// Send project file bundles to a destination
    Send {
        /// Which bundle to send
        #[arg(value_enum)]
        category: CategoryArg,

        /// Send one specific project folder instead of all of today's
        #[arg(long)]
        project: Option<PathBuf>,
    },

    /// Watch for file changes in the foreground (Ctrl+C to stop)
    Watch,

    /// Run the daily archive pass on destination folders if still due
    Archive {
        /// Which destination to archive
        #[arg(value_enum, default_value = "all")]
        target: ArchiveTargetArg,
    },

    /// Show today's auto-send status
    Status,

    /// System health check and diagnostics
    Doctor,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum CategoryArg {
    /// Info document plus all *cad.stl meshes
    Cam,
    /// All *model*.stl meshes
    Print,
}

impl From<CategoryArg> for SendCategory {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::Cam => SendCategory::Cam,
            CategoryArg::Print => SendCategory::Print,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum ArchiveTargetArg {
    Cam,
    Print,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting labsentry v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Init { watch, cam, print } = &cli.command {
        return cmd_init(watch.clone(), cam.clone(), print.clone(), cli.config);
    }

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Scan => cmd_scan(&config),
        Commands::Send { category, project } => cmd_send(category.into(), project, &config),
        Commands::Watch => cmd_watch(config).await,
        Commands::Archive { target } => cmd_archive(target, &config),
        Commands::Status => cmd_status(),
        Commands::Doctor => cmd_doctor(&config),
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Write an initial configuration file
fn cmd_init(
    watch: Option<String>,
    cam: Option<String>,
    print: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::default();
    if let Some(watch) = watch {
        config.watch_folder = watch;
    }
    if let Some(cam) = cam {
        config.targets.cam = cam;
    }
    if let Some(print) = print {
        config.targets.print = print;
    }

    let path = match config_path {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.save(&path)?;

    println!("✅ Configuration written to {}", path.display());
    if config.watch_folder.is_empty() {
        println!("   Next: set watch_folder and run 'labsentry scan'");
    }

    Ok(())
}

/// Scan the watch folder and print today's projects
fn cmd_scan(config: &Config) -> Result<()> {
    let scanner = DirectoryScanner::new(config.scan.max_depth);
    let projects = scanner.scan(std::path::Path::new(&config.watch_folder));

    if projects.is_empty() {
        println!("No projects modified today in {}", config.watch_folder);
        return Ok(());
    }

    println!("Projects modified today ({}):", projects.len());
    println!(
        "  {:<12} {:<28} {:<24} {:<22} {}",
        "Time", "Patient", "Work Type", "Teeth / Arch", "Files"
    );
    for project in &projects {
        println!(
            "  {:<12} {:<28} {:<24} {:<22} {}",
            relative_time(project.last_modified),
            project.summary.patient,
            project.summary.work_type,
            project.summary.teeth,
            project.file_status()
        );
    }

    Ok(())
}

/// Send bundles for one project or for everything modified today
fn cmd_send(category: SendCategory, project: Option<PathBuf>, config: &Config) -> Result<()> {
    let mut engine = SyncEngine::from_config(config, Box::new(SkipAllPrompt))?;
    let scanner = DirectoryScanner::new(config.scan.max_depth);

    if let Some(folder) = project {
        let Some(record) = scanner.scan_folder(&folder) else {
            anyhow::bail!("Project folder is not readable: {}", folder.display());
        };

        let report = engine.send_category(&record, category, false)?;
        print_send_report(category, &report);
        return Ok(());
    }

    let records = scanner.scan(std::path::Path::new(&config.watch_folder));
    if records.is_empty() {
        println!("Nothing to send: no projects modified today");
        return Ok(());
    }

    let report = engine.send_category_batch(&records, category)?;

    println!("📤 Send to {} complete", category.label());
    println!("   Copied: {}", report.total_copied());
    println!("   Skipped duplicates: {}", report.total_skipped());
    if report.archive.moved > 0 || report.archive.errors > 0 {
        println!(
            "   Archived beforehand: {} moved, {} errors",
            report.archive.moved, report.archive.errors
        );
    }
    for skipped in &report.skipped {
        println!("   ⏭️  {}: {}", skipped.name, skipped.reason);
    }
    for stats in &report.per_project {
        for error in &stats.errors {
            println!("   ❌ {}: {}: {}", stats.project_name, error.file, error.error);
        }
    }
    if report.cancelled {
        println!("   🛑 Batch cancelled; remaining projects were not sent");
    }

    Ok(())
}

fn print_send_report(category: SendCategory, report: &SendReport) {
    use labsentry::sync::SendDisposition;

    match &report.disposition {
        SendDisposition::Completed => {
            println!(
                "✅ Send to {} complete: {} copied, {} skipped",
                category.label(),
                report.stats.copied,
                report.stats.skipped
            );
        }
        SendDisposition::MissingPrerequisites(reason) => {
            println!("⏭️  Nothing sent: {}", reason);
        }
        SendDisposition::Cancelled => {
            println!("🛑 Send cancelled at a duplicate file");
        }
        SendDisposition::Failed => {
            println!(
                "❌ Send to {} failed after {} file(s):",
                category.label(),
                report.stats.copied
            );
            for error in &report.stats.errors {
                println!("   {}: {}", error.file, error.error);
            }
        }
    }

    if report.archive.moved > 0 || report.archive.errors > 0 {
        println!(
            "   Archived beforehand: {} moved, {} errors",
            report.archive.moved, report.archive.errors
        );
    }
}

/// Run the watch loop in the foreground
async fn cmd_watch(config: Config) -> Result<()> {
    let health = HealthCheck::run(&config);
    if !health.all_passed() {
        print_health_report(&health);
        println!();
        println!("❌ Cannot start watching - fix the errors above first");
        std::process::exit(1);
    }
    for warning in health.warnings() {
        println!("⚠️  {}", warning.message);
    }

    println!("👁️  Watching {} (Ctrl+C to stop)", config.watch_folder);

    let mut daemon = Daemon::new(config, Box::new(SkipAllPrompt), Box::new(NullEvents))?;
    let mut source = NotifyChangeSource::new();
    daemon.run(&mut source).await
}

/// Run the daily archive pass for the selected destinations
fn cmd_archive(target: ArchiveTargetArg, config: &Config) -> Result<()> {
    let state_dir = Config::state_dir()?;
    let mut engine = ArchiveEngine::new(config.archive.enabled, ArchiveGate::open(&state_dir));

    if !config.archive.enabled {
        println!("Archiving is disabled in the configuration");
        return Ok(());
    }

    let mut run_one = |category: SendCategory, target: Option<&str>| {
        let Some(target) = target else {
            println!("⏭️  {} target not configured", category.label());
            return;
        };
        let outcome = engine.archive_if_due(std::path::Path::new(target), category.tag());
        if outcome.is_empty() {
            println!("✅ {}: nothing to archive (or already done today)", category.label());
        } else {
            println!(
                "✅ {}: {} file(s) archived, {} error(s)",
                category.label(),
                outcome.moved,
                outcome.errors
            );
        }
    };

    match target {
        ArchiveTargetArg::Cam => run_one(SendCategory::Cam, config.cam_target()),
        ArchiveTargetArg::Print => run_one(SendCategory::Print, config.print_target()),
        ArchiveTargetArg::All => {
            run_one(SendCategory::Cam, config.cam_target());
            run_one(SendCategory::Print, config.print_target());
        }
    }

    Ok(())
}

/// Show today's auto-send status
fn cmd_status() -> Result<()> {
    let state_dir = Config::state_dir()?;
    let log = AutoSendLog::open(&state_dir);
    let today = chrono::Local::now().date_naive();
    let entries = log.entries_on(today);

    if entries.is_empty() {
        println!("No automatic sends recorded today");
        return Ok(());
    }

    println!("Automatic sends today ({}):", today);
    for (folder, entry) in entries {
        let mark = |sent: bool| if sent { "✅" } else { "—" };
        println!(
            "  {} CAM {}  Print {}",
            folder,
            mark(entry.cam_sent),
            mark(entry.print_sent)
        );
    }

    Ok(())
}

/// System health check and diagnostics
fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config);
    print_health_report(&health);
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    println!("🔍 labsentry System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        let icon = if result.passed {
            if result.is_warning {
                "⚠️ "
            } else {
                "✅"
            }
        } else {
            "❌"
        };
        println!("{}:", name);
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}

/// Compact "how long ago" rendering for the scan table
fn relative_time(t: SystemTime) -> String {
    let seconds = match SystemTime::now().duration_since(t) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(_) => return "in the future?".to_string(),
    };

    match seconds {
        0..=4 => "just now".to_string(),
        5..=59 => format!("{}s ago", seconds),
        60..=3599 => format!("{}m ago", seconds / 60),
        3600..=86399 => format!("{}h ago", seconds / 3600),
        86400..=172799 => "Yesterday".to_string(),
        _ => {
            let days = seconds / 86400;
            match days {
                0..=6 => format!("{}d ago", days),
                7..=29 => format!("{}w ago", days / 7),
                30..=364 => format!("{}mo ago", days / 30),
                _ => format!("{}y ago", days / 365),
            }
        }
    }
}
