//! CLI entry point for `inmail`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use inmail::config::{Config, DecoderConfig};
use inmail::export::{attachment, summary};
use inmail::Message;

#[derive(Parser)]
#[command(
    name = "inmail",
    version,
    about = "Decode inbound RFC 5322 / MIME messages",
    after_help = "Use '-' as FILE to read a message from stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Override the multipart nesting limit
    #[arg(long, value_name = "N", global = true)]
    max_depth: Option<usize>,

    /// Do not guess the charset of bodies that declare none
    #[arg(long, global = true)]
    no_detect: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a message and print its headers and body
    Decode {
        /// Message file, or '-' for stdin
        #[arg(value_name = "FILE")]
        path: PathBuf,
        /// Print a JSON summary instead of text
        #[arg(long)]
        json: bool,
    },
    /// Write the attachments of a message to a directory
    Attachments {
        #[arg(value_name = "FILE")]
        path: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also write inline (Content-ID) files
        #[arg(long)]
        embedded: bool,
    },
    /// Decode every message under the given paths and report failures
    Check {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = inmail::config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let mut decoder = config.decoder.clone();
    if let Some(depth) = cli.max_depth {
        decoder.max_depth = depth;
    }
    if cli.no_detect {
        decoder.detect_charset = false;
    }

    match cli.command {
        Commands::Decode { path, json } => cmd_decode(&path, json, &decoder),
        Commands::Attachments {
            path,
            output,
            embedded,
        } => cmd_attachments(&path, output, embedded, &config, &decoder),
        Commands::Check { paths } => cmd_check(&paths, &decoder),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = inmail::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "inmail.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Read a message from a file, or from stdin for `-`.
fn read_message(path: &Path, decoder: &DecoderConfig) -> anyhow::Result<Message> {
    if path == Path::new("-") {
        let mut raw = Vec::new();
        std::io::stdin().read_to_end(&mut raw)?;
        return Ok(inmail::decode_with(&raw, decoder)?);
    }
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(inmail::decode_file(path, decoder)?)
}

/// Decode one message and print it.
fn cmd_decode(path: &Path, json: bool, decoder: &DecoderConfig) -> anyhow::Result<()> {
    let message = read_message(path, decoder)?;
    if json {
        let view = summary::MessageSummary::from(&message);
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print!("{}", summary::render_text(&message));
    }
    Ok(())
}

/// Extract attachments of one message.
fn cmd_attachments(
    path: &Path,
    output: Option<PathBuf>,
    embedded: bool,
    config: &Config,
    decoder: &DecoderConfig,
) -> anyhow::Result<()> {
    let output = output
        .or_else(|| config.export.default_output_dir.clone())
        .ok_or_else(|| anyhow::anyhow!("No output directory given (use -o DIR)"))?;
    let message = read_message(path, decoder)?;

    let include_embedded = embedded || config.export.include_embedded;
    let paths = attachment::export_attachments(&message, &output, include_embedded)?;

    use humansize::{format_size, BINARY};
    let total: u64 = paths
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();
    println!(
        "Extracted {} file(s) ({}) to {}",
        paths.len(),
        format_size(total, BINARY),
        output.display()
    );
    Ok(())
}

/// Collect message files: plain files as given, `.eml` files inside directories.
fn collect_messages(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
                })
                .collect();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            anyhow::bail!("File not found: {}", path.display());
        }
    }
    Ok(files)
}

/// Decode a batch of messages and report which ones would be rejected.
fn cmd_check(paths: &[PathBuf], decoder: &DecoderConfig) -> anyhow::Result<()> {
    let files = collect_messages(paths)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Checking [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut failures = Vec::new();
    for file in &files {
        if let Err(e) = inmail::decode_file(file, decoder) {
            failures.push((file, e));
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    for (file, err) in &failures {
        println!("FAIL  {}: {err}", file.display());
    }
    println!(
        "{} message(s) checked in {:.2?}, {} failed",
        files.len(),
        start.elapsed(),
        failures.len()
    );

    if !failures.is_empty() {
        anyhow::bail!("{} message(s) could not be decoded", failures.len());
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "inmail", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
