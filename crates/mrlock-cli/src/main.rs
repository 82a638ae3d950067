//! `mrlock`: multi-repository lockfile generator.
//!
//! Reads a `repos.in.json`-shaped input, checks out every declared
//! import, applies imports to build the full repository graph,
//! optionally materializes selected repositories onto the local
//! filesystem, deduplicates the result, and writes it back out as a
//! `repos.json`-shaped lockfile.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use mrlock_core::process::Launcher;
use mrlock_core::InvocationContext;

/// Multi-repository lockfile generator for polyglot builds.
#[derive(Parser)]
#[command(name = "mrlock")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    /// Input repository config (`repos.in.json`); searched for near the
    /// current directory if omitted.
    #[arg(short = 'C', long = "repository-config", global = true)]
    repository_config: Option<PathBuf>,

    /// Output lockfile path; defaults to `repos.json` next to the input.
    #[arg(short = 'o', long, global = true)]
    output: Option<PathBuf>,

    /// Root directory for the Git cache, File CAS, and temp workspaces.
    #[arg(long, env = "MRLOCK_LOCAL_BUILD_ROOT", global = true)]
    local_build_root: Option<PathBuf>,

    /// Path to the `git` binary to invoke for all Git operations.
    #[arg(long, default_value = "git", global = true)]
    git: PathBuf,

    /// JSON list used as a command prefix for every external invocation,
    /// e.g. `["env", "--"]`.
    #[arg(long, global = true)]
    launcher: Option<String>,

    /// JSON object mapping clone destination paths to repository names,
    /// e.g. `{"./vendor/foo": "foo"}`.
    #[arg(long, global = true)]
    clone: Option<String>,

    /// Worker pool size; defaults to the logical CPU count.
    #[arg(short = 'j', long, global = true)]
    jobs: Option<usize>,

    /// Log verbosity: error, warn, info, debug, or trace.
    #[arg(short = 'v', long = "log-level", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve imports and write the lockfile (the default when no
    /// subcommand is given).
    Setup,

    /// Print a shell completion script to stdout.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match cli.command.unwrap_or(Commands::Setup) {
        Commands::Setup => run_setup(&cli),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_setup(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let input_path = mrlock::lockfile::resolve_input_path(cli.repository_config.as_deref(), &cwd)?;
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| mrlock::lockfile::default_output_path(&input_path));

    let launcher = parse_launcher(cli.launcher.as_deref())?;
    let local_build_root = cli
        .local_build_root
        .clone()
        .unwrap_or_else(InvocationContext::default_local_build_root);
    let jobs = cli.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    });
    let ctx = InvocationContext::new(local_build_root, launcher, cli.git.clone(), jobs);

    let clone_map = parse_clone_map(cli.clone.as_deref())?;

    mrlock::orchestrator::run(&ctx, &input_path, &output_path, &clone_map)
        .with_context(|| format!("generating {}", output_path.display()))?;

    Ok(())
}

fn parse_launcher(raw: Option<&str>) -> Result<Launcher> {
    let Some(raw) = raw else {
        return Ok(Launcher::default());
    };
    let prefix: Vec<String> = serde_json::from_str(raw).context("--launcher must be a JSON list of strings")?;
    Ok(Launcher::new(prefix))
}

fn parse_clone_map(raw: Option<&str>) -> Result<BTreeMap<PathBuf, String>> {
    let Some(raw) = raw else {
        return Ok(BTreeMap::new());
    };
    let map: BTreeMap<String, String> = serde_json::from_str(raw).context("--clone must be a JSON object mapping destination paths to repository names")?;
    Ok(map.into_iter().map(|(path, repo)| (PathBuf::from(path), repo)).collect())
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_launcher_prefix() {
        let launcher = parse_launcher(Some(r#"["env", "--"]"#)).unwrap();
        assert_eq!(launcher.prefix(), ["env".to_string(), "--".to_string()]);
    }

    #[test]
    fn default_launcher_when_absent() {
        let launcher = parse_launcher(None).unwrap();
        assert_eq!(launcher.prefix(), Launcher::default().prefix());
    }

    #[test]
    fn parses_clone_map() {
        let map = parse_clone_map(Some(r#"{"./vendor/foo": "foo"}"#)).unwrap();
        assert_eq!(map.get(Path::new("./vendor/foo")), Some(&"foo".to_string()));
    }

    #[test]
    fn empty_clone_map_when_absent() {
        assert!(parse_clone_map(None).unwrap().is_empty());
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["mrlock", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Completions { shell: Shell::Bash })
        ));
    }

    #[test]
    fn cli_verifies_itself() {
        Cli::command().debug_assert();
    }
}
