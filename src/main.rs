use clap::{Parser, Subcommand};
use minicluster::{
    logging, signal, BuildMode, ClusterConfig, DaemonHandle, DaemonRole, MiniCluster, WorkerOpts,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// Mini-cluster harness for daemon integration tests
#[derive(Parser, Debug)]
#[command(
    name = "minicluster",
    about = "Launch and supervise an external test cluster of daemons",
    version,
    disable_help_subcommand = true
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); defaults to RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve every daemon binary and report where each would launch from
    Check {
        /// Installation root holding build/<variant>/ trees
        #[arg(long)]
        home: Option<PathBuf>,

        /// Resolve release binaries instead of debug ones
        #[arg(long)]
        release: bool,
    },

    /// Start a cluster and keep it up until SIGINT/SIGTERM
    Up {
        /// Number of worker daemons
        #[arg(long, default_value_t = 3)]
        workers: usize,

        /// Start workers without the coordination sub-service
        #[arg(long)]
        no_coordinator: bool,

        /// Start workers without the execution sub-service
        #[arg(long)]
        no_executor: bool,

        /// Resolve release binaries instead of debug ones
        #[arg(long)]
        release: bool,

        /// Installation root holding build/<variant>/ trees
        #[arg(long)]
        home: Option<PathBuf>,

        /// First port handed to coordination sub-services
        #[arg(long)]
        base_port: Option<u16>,

        /// Keep logs and the manifest under this directory instead of a
        /// temp dir that vanishes on shutdown
        #[arg(long)]
        scratch_root: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init(cli.log_level.as_deref(), None) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Check { home, release } => check(home, release),
        Commands::Up {
            workers,
            no_coordinator,
            no_executor,
            release,
            home,
            base_port,
            scratch_root,
        } => up(
            workers,
            WorkerOpts {
                coordinator: !no_coordinator,
                executor: !no_executor,
            },
            build_config(home, release, base_port, scratch_root),
        ),
    }
}

/// Env-derived config with CLI flags layered on top.
fn build_config(
    home: Option<PathBuf>,
    release: bool,
    base_port: Option<u16>,
    scratch_root: Option<PathBuf>,
) -> ClusterConfig {
    let mut config = ClusterConfig::from_env();
    if release {
        config.build = BuildMode::Release;
    }
    if let Some(home) = home {
        config.home = Some(home);
    }
    if let Some(port) = base_port {
        config.base_port = port;
    }
    if let Some(root) = scratch_root {
        config.scratch_root = Some(root);
    }
    config
}

fn check(home: Option<PathBuf>, release: bool) -> anyhow::Result<ExitCode> {
    let config = build_config(home, release, None, None);

    let mut all_found = true;
    for role in DaemonRole::ALL {
        match role.resolve(&config) {
            Ok(path) => println!("{role:<12} {}", path.display()),
            Err(err) => {
                all_found = false;
                println!("{role:<12} MISSING ({err})");
            }
        }
    }

    Ok(if all_found {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn up(workers: usize, opts: WorkerOpts, config: ClusterConfig) -> anyhow::Result<ExitCode> {
    let mut cluster = MiniCluster::with_config(config)?;

    signal::install();

    cluster.start_statestored()?;
    cluster.start_catalogd()?;
    for _ in 0..workers {
        cluster.start_worker(opts)?;
    }

    print_cluster(&cluster);
    println!("press Ctrl-C to stop");
    signal::wait_for_stop();

    cluster.shutdown();
    Ok(ExitCode::SUCCESS)
}

fn print_cluster(cluster: &MiniCluster) {
    println!("cluster  {}", cluster.cluster_id());
    println!("manifest {}", cluster.manifest_path().display());
    if let Some(handle) = cluster.statestored() {
        print_daemon(handle);
    }
    if let Some(handle) = cluster.catalogd() {
        print_daemon(handle);
    }
    let mut workers: Vec<&DaemonHandle> = cluster.workers().collect();
    workers.sort_by_key(|handle| handle.pid());
    for handle in workers {
        print_daemon(handle);
    }
}

fn print_daemon(handle: &DaemonHandle) {
    let port = handle
        .coordinator_port()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {:<12} pid {:<7} port {:<6} log {}",
        handle.role(),
        handle.pid(),
        port,
        handle.log_path().display()
    );
}
