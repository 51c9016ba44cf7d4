//! Clip a saved AI chat page into a Markdown note
//!
//! # Usage
//!
//! ```bash
//! # Print the whole conversation as a note
//! chat-clip --url https://chatgpt.com/c/abc --input page.html
//!
//! # Last 5 messages, saved into a vault
//! chat-clip --url https://claude.ai/chat/xyz --input - --mode lastN --count 5 --vault ~/Notes
//! ```

use std::io::Read;
use std::path::PathBuf;

use clipper_core::payload::SelectionSpec;
use clipper_core::{CaptureMode, ClipRequest, Clipper, Config, SaveResponse};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command line options
#[derive(Debug, Default)]
struct Args {
    url: Option<String>,
    input: Option<String>,
    mode: Option<CaptureMode>,
    count: Option<usize>,
    target: Option<usize>,
    select: Option<String>,
    title: Option<String>,
    vault: Option<PathBuf>,
    config_path: Option<PathBuf>,
    write_config: bool,
}

/// Parse command line arguments
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("chat-clip v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--url" | "-u" => {
                parsed.url = value;
                i += 1;
            }
            "--input" | "-i" => {
                parsed.input = value;
                i += 1;
            }
            "--mode" | "-m" => {
                match value.as_deref().and_then(CaptureMode::parse) {
                    Some(mode) => parsed.mode = Some(mode),
                    None => usage_error("--mode expects single, selection, lastN or full"),
                }
                i += 1;
            }
            "--count" | "-n" => {
                match value.as_deref().and_then(|v| v.parse().ok()) {
                    Some(count) => parsed.count = Some(count),
                    None => usage_error("--count expects a number"),
                }
                i += 1;
            }
            "--target" => {
                match value.as_deref().and_then(|v| v.parse().ok()) {
                    Some(target) => parsed.target = Some(target),
                    None => usage_error("--target expects a message index"),
                }
                i += 1;
            }
            "--select" => {
                parsed.select = value;
                i += 1;
            }
            "--title" => {
                parsed.title = value;
                i += 1;
            }
            "--vault" => {
                parsed.vault = value.map(PathBuf::from);
                i += 1;
            }
            "--config" | "-c" => {
                parsed.config_path = value.map(PathBuf::from);
                i += 1;
            }
            "--write-config" => parsed.write_config = true,
            other => usage_error(&format!("Unknown argument: {}", other)),
        }
        i += 1;
    }

    parsed
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    eprintln!("Use --help for usage information.");
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"chat-clip - Save AI chat conversations as Markdown notes

USAGE:
    chat-clip --url <URL> [OPTIONS]
    chat-clip --write-config [--vault <DIR>] [--config <PATH>]

OPTIONS:
    -h, --help              Show this help message
    -v, --version           Show version
    -u, --url <URL>         Page URL (selects ChatGPT, Claude or Gemini rules)
    -i, --input <FILE|->    Saved page HTML (default: stdin)
    -m, --mode <MODE>       single, selection, lastN or full (default: from preferences)
    -n, --count <N>         Messages for lastN mode (default: 30)
    --target <INDEX>        Message index for single mode (default: last)
    --select <CSS>          Selection range covering the matching elements
    --title <TITLE>         Note title (default: page title)
    --vault <DIR>           Save into this vault instead of printing
    -c, --config <PATH>     Path to configuration file
    --write-config          Write the effective configuration (with --vault
                            applied) to the config path and exit

OUTPUT:
    Without a vault the note is printed to stdout. With a vault the save
    result is printed as JSON. Logs go to stderr (RUST_LOG overrides the
    configured level).
"#
    );
}

fn read_input(input: Option<&str>) -> std::io::Result<String> {
    match input {
        None | Some("-") => {
            let mut html = String::new();
            std::io::stdin().read_to_string(&mut html)?;
            Ok(html)
        }
        Some(path) => std::fs::read_to_string(path),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    // Initialize logging on stderr before the config is read; stdout carries the note
    let env_level = std::env::var("RUST_LOG").ok();
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(env_level.as_deref().unwrap_or("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config_path {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };
    if env_level.is_none() {
        if let Err(e) = filter_handle.reload(EnvFilter::new(&config.general.log_level)) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    if let Some(vault) = &args.vault {
        config.vault.path = Some(vault.clone());
    }

    if args.write_config {
        let path = args.config_path.clone().unwrap_or_else(Config::default_config_path);
        config.save_to_path(path.clone())?;
        println!("{}", path.display());
        return Ok(());
    }

    let Some(url) = args.url.clone() else {
        usage_error("--url is required");
    };
    let html = read_input(args.input.as_deref())?;

    let mut request = ClipRequest::new(url, html);
    request.mode = args.mode;
    request.count = args.count;
    request.target = args.target;
    request.title = args.title.clone();
    if let Some(css) = &args.select {
        request.selection = Some(SelectionSpec::Selector(css.clone()));
        request.mode.get_or_insert(CaptureMode::Selection);
    }

    let clipper = Clipper::new(config);

    if clipper.config().vault.path.is_none() {
        match clipper.clip(&request).await? {
            Some(note) => {
                info!("Clipped {} message(s) as {}", note.message_count, note.filename);
                println!("{}", note.content);
            }
            None => eprintln!("Nothing to save"),
        }
        return Ok(());
    }

    let transports = clipper.configured_transports();
    let response = match clipper.clip_and_save(&request, &transports).await {
        Ok(Some((_, saved))) => SaveResponse::saved(&saved),
        Ok(None) => SaveResponse::nothing_to_save(),
        Err(e) => {
            error!("Clip failed: {}", e);
            SaveResponse::clip_failed(&e, "en")
        }
    };
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
