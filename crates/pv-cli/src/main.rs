//! pixvault: encrypted file containers, optionally hidden inside images
//!
//! Commands:
//!   encrypt <file>                 - seal a file into a container
//!   decrypt <container>            - open a container and restore the file
//!   hide <file> --cover <image>    - seal a file and hide the container in a PNG
//!   reveal <image>                 - recover and open a container hidden in an image
//!   capacity <image>               - how many bytes an image can hide
//!   inspect <path>                 - show container metadata (container file or stego image)
//!   config show                    - display current configuration

mod mime;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use pv_core::config::PvConfig;
use pv_crypto::{parse_container, Metadata, SecurityTier};
use pv_engine::{Engine, ProgressFn, Protection, RunOptions};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pixvault",
    version,
    about = "Encrypted file containers, optionally hidden in images",
    long_about = "pixvault: seal files into AES-256-GCM containers and hide them in the pixels of an image"
)]
struct Cli {
    /// Path to pixvault.toml configuration file
    #[arg(long, short = 'c', env = "PIXVAULT_CONFIG", default_value = "pixvault.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "PIXVAULT_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "PIXVAULT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Do not draw progress bars
    #[arg(long, short = 'q')]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file into a container
    Encrypt {
        /// File to encrypt
        input: PathBuf,
        /// Container path (default: <input>.pvault)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        seal: SealArgs,
    },

    /// Decrypt a container and write the original file
    Decrypt {
        /// Container file
        container: PathBuf,
        /// Output path (default: the stored filename, in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[command(flatten)]
        open: OpenArgs,
    },

    /// Encrypt a file and hide the container in a cover image
    ///
    /// The output is always PNG; lossy formats would destroy the hidden bits.
    Hide {
        /// File to encrypt and hide
        input: PathBuf,
        /// Cover image (PNG, BMP, JPEG, ...)
        #[arg(long)]
        cover: PathBuf,
        /// Output PNG path
        #[arg(long, short = 'o')]
        output: PathBuf,
        #[command(flatten)]
        seal: SealArgs,
    },

    /// Recover a container hidden in an image and decrypt it
    Reveal {
        /// Image produced by `pixvault hide`
        image: PathBuf,
        /// Output path (default: the stored filename, in the current directory)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Write the raw container instead of decrypting it
        #[arg(long)]
        container_only: bool,
        #[command(flatten)]
        open: OpenArgs,
    },

    /// Show how many bytes an image can hide
    Capacity {
        /// Cover image
        image: PathBuf,
    },

    /// Show container metadata without decrypting
    Inspect {
        /// Container file or stego image
        path: PathBuf,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct SealArgs {
    /// Filename stored in the container (default: input file name)
    #[arg(long)]
    name: Option<String>,

    /// MIME type stored in the container (default: guessed from the extension)
    #[arg(long)]
    mime: Option<String>,

    /// Password (prompted for when omitted)
    #[arg(long, env = "PIXVAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Create a password-less container. The key is stored inside the
    /// container: anyone with the bytes can decrypt it.
    #[arg(long, conflicts_with = "password")]
    no_password: bool,

    /// Overwrite the output if it exists
    #[arg(long, short = 'f')]
    force: bool,
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Password (prompted for when the container needs one)
    #[arg(long, env = "PIXVAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Overwrite the output if it exists
    #[arg(long, short = 'f')]
    force: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None if config.log.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        from_file,
        "pixvault starting"
    );

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Capacity { image } => cmd_capacity(&image).await,
        Commands::Encrypt { input, output, seal } => {
            cmd_encrypt(&config, &input, output.as_deref(), &seal, cli.quiet).await
        }
        Commands::Decrypt { container, output, open } => {
            cmd_decrypt(&config, &container, output.as_deref(), &open, cli.quiet).await
        }
        Commands::Hide { input, cover, output, seal } => {
            cmd_hide(&config, &input, &cover, &output, &seal, cli.quiet).await
        }
        Commands::Reveal { image, output, container_only, open } => {
            cmd_reveal(&config, &image, output.as_deref(), container_only, &open, cli.quiet).await
        }
        Commands::Inspect { path } => cmd_inspect(&config, &path).await,
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout is left to command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Load the config file if present; the flag tells whether it was.
async fn load_config(path: &Path) -> Result<(PvConfig, bool)> {
    if !path.exists() {
        return Ok((PvConfig::default(), false));
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config: PvConfig = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {}", path.display()))?;
    Ok((config, true))
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Run options wired to a progress bar (unless quiet) and to Ctrl-C.
fn run_options(prefix: &str, quiet: bool) -> Result<(RunOptions, Option<ProgressBar>)> {
    let mut run = RunOptions::default();

    let cancel = run.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, abandoning the current operation");
            cancel.cancel();
        }
    });

    if quiet {
        return Ok((run, None));
    }
    let pb = make_progress_bar(prefix)?;
    let pb_clone = pb.clone();
    let progress: ProgressFn = Box::new(move |done, total, msg| {
        pb_clone.set_length(total);
        pb_clone.set_position(done);
        pb_clone.set_message(msg.to_string());
    });
    run.progress = Some(progress);
    Ok((run, Some(pb)))
}

fn finish(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}

fn prompt(label: &str) -> Result<SecretString> {
    let entered = rpassword::prompt_password(label).context("reading password from terminal")?;
    Ok(SecretString::from(entered))
}

/// Password for a new container, or `None` for the embedded-key tier.
fn sealing_password(args: &SealArgs) -> Result<Option<SecretString>> {
    if args.no_password {
        return Ok(None);
    }
    if let Some(p) = &args.password {
        anyhow::ensure!(!p.is_empty(), "password must not be empty (use --no-password instead)");
        return Ok(Some(SecretString::from(p.clone())));
    }

    let first = prompt("Password: ")?;
    anyhow::ensure!(
        !first.expose_secret().is_empty(),
        "password must not be empty (use --no-password instead)"
    );
    let second = prompt("Confirm password: ")?;
    anyhow::ensure!(
        first.expose_secret() == second.expose_secret(),
        "passwords do not match"
    );
    Ok(Some(first))
}

/// Password for opening a container; prompted only when the container needs one.
fn opening_password(args: &OpenArgs, metadata: &Metadata) -> Result<Option<SecretString>> {
    if metadata.tier() == SecurityTier::EmbeddedKey {
        return Ok(None);
    }
    match &args.password {
        Some(p) => Ok(Some(SecretString::from(p.clone()))),
        None => prompt("Password: ").map(Some),
    }
}

fn stored_name(input: &Path, args: &SealArgs) -> Result<String> {
    if let Some(name) = &args.name {
        return Ok(name.clone());
    }
    input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("input has no file name: {}", input.display()))
}

fn stored_mime(input: &Path, args: &SealArgs) -> String {
    args.mime
        .clone()
        .unwrap_or_else(|| mime::guess(input).to_string())
}

/// Output path for a decrypted file: the stored name's last component, so a
/// crafted name cannot escape the current directory.
fn restore_path(output: Option<&Path>, stored: &str) -> PathBuf {
    if let Some(p) = output {
        return p.to_path_buf();
    }
    match Path::new(stored).file_name() {
        Some(name) => PathBuf::from(name),
        None => PathBuf::from("decrypted.bin"),
    }
}

async fn read_input(config: &PvConfig, path: &Path) -> Result<Vec<u8>> {
    let meta = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    anyhow::ensure!(meta.is_file(), "not a file: {}", path.display());
    anyhow::ensure!(
        meta.len() <= config.crypto.max_input_bytes,
        "{} is {}, above the {} limit (crypto.max_input_bytes)",
        path.display(),
        fmt_bytes(meta.len()),
        fmt_bytes(config.crypto.max_input_bytes)
    );
    tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

async fn write_output(path: &Path, bytes: &[u8], force: bool) -> Result<()> {
    if !force && path.exists() {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

fn load_image(path: &Path) -> Result<pv_stego::PixelBuffer> {
    pv_stego::open_image(path).with_context(|| format!("loading image: {}", path.display()))
}

// ── `pixvault encrypt` ────────────────────────────────────────────────────────

async fn seal(config: &PvConfig, input: &Path, args: &SealArgs, quiet: bool) -> Result<Vec<u8>> {
    let plaintext = read_input(config, input).await?;
    let filename = stored_name(input, args)?;
    let mime_type = stored_mime(input, args);
    let password = sealing_password(args)?;

    let engine = Engine::from_config(config).context("starting engine")?;
    let (run, pb) = run_options("encrypt", quiet)?;
    let result = engine
        .encrypt_container(
            &plaintext,
            &filename,
            &mime_type,
            Protection::from_password(password.as_ref()),
            &run,
        )
        .await;
    finish(pb);
    engine.shutdown().await;

    let container = result.with_context(|| format!("encrypting {}", input.display()))?;
    if let Some(warning) = tier_warning(password.as_ref()) {
        eprintln!("{warning}");
    }
    Ok(container)
}

/// Notice for a container sealed without a password, shown after a successful run.
fn tier_warning(password: Option<&SecretString>) -> Option<&'static str> {
    match Protection::from_password(password).tier() {
        SecurityTier::EmbeddedKey => {
            Some("warning: password-less container; anyone with the file can decrypt it")
        }
        SecurityTier::Password => None,
    }
}

async fn cmd_encrypt(
    config: &PvConfig,
    input: &Path,
    output: Option<&Path>,
    args: &SealArgs,
    quiet: bool,
) -> Result<()> {
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| {
        let mut name = OsString::from(input.as_os_str());
        name.push(".pvault");
        PathBuf::from(name)
    });
    if !args.force && output.exists() {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let container = seal(config, input, args, quiet).await?;
    write_output(&output, &container, args.force).await?;

    info!(input = %input.display(), output = %output.display(), "encrypted");
    println!("{} → {} ({})", input.display(), output.display(), fmt_bytes(container.len() as u64));
    Ok(())
}

// ── `pixvault decrypt` ────────────────────────────────────────────────────────

async fn open(
    config: &PvConfig,
    container: &[u8],
    output: Option<&Path>,
    args: &OpenArgs,
    quiet: bool,
) -> Result<PathBuf> {
    let parsed = parse_container(container).context("not a pixvault container")?;
    let password = opening_password(args, &parsed.metadata)?;

    let engine = Engine::from_config(config).context("starting engine")?;
    let (run, pb) = run_options("decrypt", quiet)?;
    let result = engine
        .decrypt_container(container, password.as_ref(), &run)
        .await;
    finish(pb);
    engine.shutdown().await;

    let decrypted = result.context("decrypting container")?;

    let path = restore_path(output, &decrypted.filename);
    write_output(&path, &decrypted.plaintext, args.force).await?;
    println!(
        "{} ({}, {})",
        path.display(),
        decrypted.mime_type,
        fmt_bytes(decrypted.plaintext.len() as u64)
    );
    Ok(path)
}

async fn cmd_decrypt(
    config: &PvConfig,
    container_path: &Path,
    output: Option<&Path>,
    args: &OpenArgs,
    quiet: bool,
) -> Result<()> {
    let container = tokio::fs::read(container_path)
        .await
        .with_context(|| format!("reading {}", container_path.display()))?;
    let path = open(config, &container, output, args, quiet).await?;
    info!(container = %container_path.display(), output = %path.display(), "decrypted");
    Ok(())
}

// ── `pixvault hide` ───────────────────────────────────────────────────────────

async fn cmd_hide(
    config: &PvConfig,
    input: &Path,
    cover_path: &Path,
    output: &Path,
    args: &SealArgs,
    quiet: bool,
) -> Result<()> {
    if !args.force && output.exists() {
        anyhow::bail!("{} already exists (use --force to overwrite)", output.display());
    }
    let cover = load_image(cover_path)?;
    let capacity = pv_stego::capacity(cover.width(), cover.height());

    let container = seal(config, input, args, quiet).await?;
    anyhow::ensure!(
        container.len() <= capacity,
        "container is {} but {} ({}x{}) can hide at most {}",
        fmt_bytes(container.len() as u64),
        cover_path.display(),
        cover.width(),
        cover.height(),
        fmt_bytes(capacity as u64)
    );

    let engine = Engine::from_config(config).context("starting engine")?;
    let stego = engine
        .embed_container(cover, &container, &RunOptions::default())
        .await
        .context("embedding container")?;
    engine.shutdown().await;

    let png = pv_stego::encode_png(&stego).context("encoding PNG")?;
    write_output(output, &png, args.force).await?;

    info!(input = %input.display(), cover = %cover_path.display(), output = %output.display(), "hidden");
    println!(
        "{} hidden in {} ({} of {} used)",
        input.display(),
        output.display(),
        fmt_bytes(container.len() as u64),
        fmt_bytes(capacity as u64)
    );
    Ok(())
}

// ── `pixvault reveal` ─────────────────────────────────────────────────────────

async fn cmd_reveal(
    config: &PvConfig,
    image_path: &Path,
    output: Option<&Path>,
    container_only: bool,
    args: &OpenArgs,
    quiet: bool,
) -> Result<()> {
    let stego = load_image(image_path)?;
    let engine = Engine::from_config(config).context("starting engine")?;
    let container = engine
        .reveal_container(&stego, &RunOptions::default())
        .await
        .with_context(|| format!("no container found in {}", image_path.display()))?;
    engine.shutdown().await;

    if container_only {
        let path = output.map(Path::to_path_buf).unwrap_or_else(|| {
            let mut name = OsString::from(image_path.as_os_str());
            name.push(".pvault");
            PathBuf::from(name)
        });
        write_output(&path, &container, args.force).await?;
        println!("{} ({})", path.display(), fmt_bytes(container.len() as u64));
        return Ok(());
    }

    let path = open(config, &container, output, args, quiet).await?;
    info!(image = %image_path.display(), output = %path.display(), "revealed");
    Ok(())
}

// ── `pixvault capacity` ───────────────────────────────────────────────────────

async fn cmd_capacity(image_path: &Path) -> Result<()> {
    let image = load_image(image_path)?;
    let capacity = pv_stego::capacity(image.width(), image.height());
    println!(
        "{}: {}x{}, capacity {} bytes ({})",
        image_path.display(),
        image.width(),
        image.height(),
        capacity,
        fmt_bytes(capacity as u64)
    );
    Ok(())
}

// ── `pixvault inspect` ────────────────────────────────────────────────────────

async fn cmd_inspect(config: &PvConfig, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let (container, source) = if parse_container(&bytes).is_ok() {
        (bytes, "container file")
    } else {
        let stego = pv_stego::decode_image(&bytes)
            .with_context(|| format!("{} is neither a container nor an image", path.display()))?;
        let engine = Engine::from_config(config).context("starting engine")?;
        let container = engine
            .reveal_container(&stego, &RunOptions::default())
            .await
            .with_context(|| format!("no container found in {}", path.display()))?;
        engine.shutdown().await;
        (container, "hidden in image")
    };

    let parsed = parse_container(&container).context("not a pixvault container")?;
    let meta = &parsed.metadata;
    let tier = match meta.tier() {
        SecurityTier::Password => "password",
        SecurityTier::EmbeddedKey => "embedded key (no password)",
    };

    println!("{} ({source})", path.display());
    println!("  version:    {}", meta.version);
    println!("  filename:   {}", meta.filename);
    println!("  mime type:  {}", meta.mime_type);
    println!("  protection: {tier}");
    println!("  chunks:     {} x {}", meta.chunks_count, fmt_bytes(meta.chunk_size));
    if let Some(size) = meta.original_size {
        println!("  plaintext:  {}", fmt_bytes(size));
    }
    println!("  container:  {}", fmt_bytes(container.len() as u64));
    println!("  created:    {} ms since epoch", meta.timestamp);
    Ok(())
}

// ── `pixvault config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &PvConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
