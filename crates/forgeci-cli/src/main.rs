//! forgeci - remote build CLI
//!
//! Pushes an application's source and build manifest to a CI repository,
//! runs the build workflow there and downloads the resulting artifact.
//!
//! ## Commands
//!
//! - `login`: store repository owner, name and access token
//! - `logout`: forget stored credentials
//! - `whoami`: show the stored repository (the token is never printed)
//! - `build`: run a remote build; Ctrl-C cancels it

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use forgeci_core::{
    BuildConfig, BuildPhase, BuildRequest, BuildState, CredentialStore, FileCredentialStore,
    ManifestTemplate,
};
use forgeci_engine::{BuildOptions, BuildOrchestrator};
use forgeci_gateway::GithubGateway;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "forgeci")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build applications on a remote CI repository", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON build summary
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding credentials.json (default: $FORGECI_HOME or the
    /// platform config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store the CI repository and access token
    Login {
        /// Account or organisation owning the CI repository
        #[arg(long)]
        owner: String,

        /// CI repository name
        #[arg(long)]
        repo: String,

        /// Access token with contents and actions permissions
        #[arg(long, env = "FORGECI_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Forget stored credentials
    Logout,

    /// Show the stored repository
    Whoami,

    /// Run a remote build
    Build {
        /// Application name
        #[arg(short, long)]
        name: String,

        /// Source file to build
        #[arg(short, long)]
        source: PathBuf,

        /// Directory the artifact is downloaded into
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the generated manifest and exit without building
        #[arg(long)]
        manifest_only: bool,

        #[command(flatten)]
        manifest: ManifestArgs,
    },
}

/// Manifest overrides, applied on top of `FORGECI_*` environment values.
#[derive(clap::Args, Debug, Default)]
struct ManifestArgs {
    /// Target platform [env: FORGECI_PLATFORM]
    #[arg(long)]
    platform: Option<String>,

    /// Minimum platform version [env: FORGECI_DEPLOYMENT_TARGET]
    #[arg(long)]
    deployment_target: Option<String>,

    /// Bundle identifier prefix [env: FORGECI_BUNDLE_PREFIX]
    #[arg(long)]
    bundle_prefix: Option<String>,

    /// Signing style, "Manual" or "Automatic" [env: FORGECI_SIGNING_STYLE]
    #[arg(long)]
    signing_style: Option<String>,
}

impl ManifestArgs {
    fn apply(self, mut template: ManifestTemplate) -> ManifestTemplate {
        if let Some(platform) = self.platform {
            template.platform = platform;
        }
        if let Some(target) = self.deployment_target {
            template.deployment_target = target;
        }
        if let Some(prefix) = self.bundle_prefix {
            template.bundle_id_prefix = prefix;
        }
        if let Some(style) = self.signing_style {
            template.signing_style = style;
        }
        template
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    forgeci_core::init_tracing(cli.json, level);

    let store = open_store(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Login { owner, repo, token } => {
            cmd_login(&store, &owner, &repo, &token)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Logout => {
            cmd_logout(&store)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Whoami => {
            println!("{}", cmd_whoami(&store)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Build {
            name,
            source,
            out,
            manifest_only,
            manifest,
        } => {
            let template = manifest.apply(ManifestTemplate::from_env());
            if manifest_only {
                print!("{}", cmd_manifest(&template, &name)?);
                return Ok(ExitCode::SUCCESS);
            }
            let state = cmd_build(&store, template, &name, &source, out, cli.json).await?;
            Ok(ExitCode::from(exit_status(&state)))
        }
    }
}

fn open_store(config_dir: Option<&Path>) -> Result<FileCredentialStore> {
    match config_dir {
        Some(dir) => Ok(FileCredentialStore::in_dir(dir)),
        None => FileCredentialStore::open_default().context("Failed to locate config directory"),
    }
}

fn cmd_login(store: &dyn CredentialStore, owner: &str, repo: &str, token: &str) -> Result<()> {
    let config = BuildConfig::new(owner.trim(), repo.trim(), token.trim());
    if !config.is_ready() {
        bail!("owner, repo and token must all be non-empty");
    }
    store
        .set(&config)
        .context("Failed to store credentials")?;
    info!(repository = %config.slug(), "credentials stored");
    println!("Logged in to {}", config.slug());
    Ok(())
}

fn cmd_logout(store: &dyn CredentialStore) -> Result<()> {
    store.clear().context("Failed to clear credentials")?;
    println!("Logged out");
    Ok(())
}

fn cmd_whoami(store: &dyn CredentialStore) -> Result<String> {
    let config = store.get().context("Failed to read credentials")?;
    if !config.is_ready() {
        return Ok("Not logged in. Run 'forgeci login' first.".to_string());
    }
    Ok(format!("Repository: {}\nToken:      <redacted>", config.slug()))
}

fn cmd_manifest(template: &ManifestTemplate, name: &str) -> Result<String> {
    let request = BuildRequest::new(name, "").context("Invalid application name")?;
    template
        .render(request.application_name())
        .context("Failed to render manifest")
}

async fn cmd_build(
    store: &dyn CredentialStore,
    template: ManifestTemplate,
    name: &str,
    source: &Path,
    out: Option<PathBuf>,
    json: bool,
) -> Result<BuildState> {
    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("Failed to read source file {:?}", source))?;
    let request = BuildRequest::new(name, code).context("Invalid build request")?;
    let config = store
        .ready_config()
        .context("Not logged in. Run 'forgeci login' first")?;

    let gateway = GithubGateway::from_env().context("Failed to create API client")?;
    let mut options = BuildOptions::default().with_manifest(template);
    if let Some(dir) = out {
        options = options.with_scratch_dir(dir);
    }
    let settings = gateway.settings();
    debug!(
        api_url = %settings.api_url,
        workflow = %settings.workflow_file,
        branch = %settings.branch,
        scratch_dir = %options.scratch_dir.display(),
        "build options resolved"
    );

    let orchestrator = BuildOrchestrator::new(Arc::new(gateway), options);
    let renderer = tokio::spawn(render_progress(orchestrator.subscribe()));

    let build = orchestrator.compile(&config, &request);
    tokio::pin!(build);
    let state = loop {
        tokio::select! {
            result = &mut build => break result?,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                    break (&mut build).await?;
                }
                if orchestrator.cancel() {
                    eprintln!("Canceling build...");
                }
            }
        }
    };
    let _ = renderer.await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to encode build state")?
        );
    } else {
        print_summary(&state);
    }
    Ok(state)
}

/// Print one progress line per observed state change until the build ends.
async fn render_progress(mut rx: watch::Receiver<BuildState>) {
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        eprintln!("{}", progress_line(&state));
        if state.phase.is_terminal() {
            break;
        }
    }
}

fn progress_line(state: &BuildState) -> String {
    format!(
        "[{:>3.0}%] {:<18} {}",
        state.progress * 100.0,
        state.phase.label(),
        state.status_message
    )
}

fn print_summary(state: &BuildState) {
    match state.phase {
        BuildPhase::Succeeded => {
            if let Some(artifact) = &state.artifact {
                println!("Artifact:  {}", artifact.path.display());
                println!("Size:      {} bytes", artifact.size_bytes);
                println!("SHA-256:   {}", artifact.sha256);
            }
        }
        BuildPhase::Failed => {
            let message = state.error_message().unwrap_or_default();
            eprintln!("Build failed: {}", message);
        }
        BuildPhase::Canceled => eprintln!("Build canceled"),
        _ => {}
    }
    if let Some(ms) = state.duration_ms() {
        eprintln!("Duration:  {:.1}s", ms as f64 / 1000.0);
    }
}

/// Process exit status for a finished build.
fn exit_status(state: &BuildState) -> u8 {
    match state.phase {
        BuildPhase::Succeeded => 0,
        BuildPhase::Canceled => 130,
        _ => 1,
    }
}
