use std::env;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use lookbook_contracts::config::{
    build_generation_payload, platform_presets, ConfigStore, ItemDraft, OutputUpdate, Section,
    ShootConfig,
};
use lookbook_contracts::console::{parse_command, BuilderCommand, ItemSpec, BUILDER_HELP};
use lookbook_contracts::events::EventWriter;
use lookbook_engine::{
    BatchObserver, BatchPhase, BatchRunner, DryrunBackend, HttpBackend, PhotoshootBackend,
    QuickUpdateRequest, Uploader, DEFAULT_UPLOAD_FOLDER,
};

#[derive(Debug, Parser)]
#[command(name = "lookbook", version, about = "AI photoshoot configuration builder")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a fresh default configuration file
    Init(InitArgs),
    /// Interactive configuration builder
    Build(BuildArgs),
    /// Print the payload the backend would receive
    Preview(PreviewArgs),
    /// Run a generation batch from a configuration file
    Generate(GenerateArgs),
    /// Single-prompt quick update
    Quick(QuickArgs),
    /// Upload a reference image and print its public URL
    Upload(UploadArgs),
}

#[derive(Debug, Parser)]
struct InitArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Parser)]
struct BuildArgs {
    /// Start from an existing configuration file instead of a fresh one
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    quick_url: Option<String>,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct PreviewArgs {
    #[arg(long)]
    config: PathBuf,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    config: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    api_url: Option<String>,
    #[arg(long)]
    dryrun: bool,
    /// Download/decode results into this directory
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct QuickArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long = "image-url")]
    image_urls: Vec<String>,
    #[arg(long, default_value = "4:5")]
    aspect_ratio: String,
    #[arg(long, default_value = "4K")]
    resolution: String,
    #[arg(long)]
    quick_url: Option<String>,
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct UploadArgs {
    #[arg(long)]
    file: PathBuf,
    #[arg(long, default_value = DEFAULT_UPLOAD_FOLDER)]
    folder: String,
    #[arg(long)]
    permit_url: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lookbook error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init(args) => run_init(args),
        Command::Build(args) => run_build(args),
        Command::Preview(args) => run_preview(args),
        Command::Generate(args) => run_generate(args),
        Command::Quick(args) => run_quick(args),
        Command::Upload(args) => run_upload(args),
    }
}

fn run_init(args: InitArgs) -> Result<i32> {
    if args.out.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            args.out.display()
        );
    }
    let config = ShootConfig::new();
    save_config(&args.out, &config)?;
    println!(
        "Wrote default configuration (job {}) to {}",
        config.meta.job_id,
        args.out.display()
    );
    Ok(0)
}

fn run_preview(args: PreviewArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let payload = build_generation_payload(&config);
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(0)
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let backend = resolve_backend(args.dryrun, args.api_url, None)?;
    let events = args
        .events
        .map(|path| EventWriter::new(path, config.meta.job_id.clone()));

    let (code, images) = drive_batch(backend.as_ref(), events.as_ref(), &config)?;
    if let Some(dir) = args.save_dir {
        if !images.is_empty() {
            report_saved(&save_references(&dir, &images, "photoshoot"));
        }
    }
    Ok(code)
}

fn run_quick(args: QuickArgs) -> Result<i32> {
    let backend = resolve_backend(args.dryrun, None, args.quick_url)?;
    let request = QuickUpdateRequest {
        prompt: args.prompt,
        image_urls: args.image_urls,
        aspect_ratio: args.aspect_ratio,
        resolution: args.resolution,
    };
    let image = backend.quick_update(&request)?;
    println!("{image}");
    if let Some(dir) = args.save_dir {
        report_saved(&save_references(&dir, &[image], "quick-update"));
    }
    Ok(0)
}

fn run_upload(args: UploadArgs) -> Result<i32> {
    let uploader = match args.permit_url {
        Some(url) => Uploader::new(url),
        None => Uploader::from_env()?,
    };
    let url = uploader.upload_file(&args.file, &args.folder)?;
    println!("{url}");
    Ok(0)
}

fn run_build(args: BuildArgs) -> Result<i32> {
    let mut store = match &args.config {
        Some(path) if path.exists() => ConfigStore::from_config(load_config(path)?),
        _ => ConfigStore::new(),
    };
    println!(
        "Lookbook builder started (job {}). Type /help for commands.",
        store.config().meta.job_id
    );

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_command(&line) {
            BuilderCommand::Noop => {}
            BuilderCommand::Help => {
                for entry in BUILDER_HELP {
                    println!("{entry}");
                }
            }
            BuilderCommand::Show => print_summary(store.config()),
            BuilderCommand::Payload => {
                let payload = build_generation_payload(store.config());
                match serde_json::to_string_pretty(&payload) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(err) => println!("Payload preview failed: {err}"),
                }
            }
            BuilderCommand::Reset => {
                store.reset();
                println!(
                    "Configuration reset (new job {}).",
                    store.config().meta.job_id
                );
            }
            BuilderCommand::Quit => break,
            BuilderCommand::Save { path } => match save_config(Path::new(&path), store.config()) {
                Ok(()) => println!("Saved configuration to {path}"),
                Err(err) => println!("Save failed: {err:#}"),
            },
            BuilderCommand::Load { path } => match load_config(Path::new(&path)) {
                Ok(config) => {
                    println!("Loaded {} (job {}).", path, config.meta.job_id);
                    store = ConfigStore::from_config(config);
                }
                Err(err) => println!("Load failed: {err:#}"),
            },
            BuilderCommand::Count { value } => {
                store.update_output(OutputUpdate {
                    count: Some(value),
                    ..OutputUpdate::default()
                });
                println!("Image count set to {value}");
            }
            BuilderCommand::Quality { value } => {
                store.update_output(OutputUpdate {
                    quality: Some(value),
                    ..OutputUpdate::default()
                });
                println!("Quality set to {}", value.label());
            }
            BuilderCommand::Variety { value } => {
                store.update_output(OutputUpdate {
                    batch_variety: Some(value),
                    ..OutputUpdate::default()
                });
                println!("Batch variety set to {}", value.label());
            }
            BuilderCommand::Preset { name } => match OutputUpdate::for_preset(&name) {
                Some(update) => {
                    let ratio = update.aspect_ratio.clone().unwrap_or_default();
                    store.update_output(update);
                    println!("Platform preset set ({ratio}).");
                }
                None => {
                    let names: Vec<&str> = platform_presets().into_keys().collect();
                    println!("Unknown preset. Options: {}", names.join(", "));
                }
            },
            BuilderCommand::Add(spec) => {
                let section = spec.section;
                let kind = spec.kind;
                let draft = draft_from_spec(*spec);
                let id = store.add_item(section, draft);
                println!("Added {kind} to {section} ({id})");
            }
            BuilderCommand::Remove { section, id } => {
                store.remove_item(section, &id);
                println!("Removed {id} from {section}");
            }
            BuilderCommand::Generate => {
                match resolve_backend(args.dryrun, args.api_url.clone(), args.quick_url.clone()) {
                    Ok(backend) => {
                        let events = args.events.clone().map(|path| {
                            EventWriter::new(path, store.config().meta.job_id.clone())
                        });
                        match drive_batch(backend.as_ref(), events.as_ref(), store.config()) {
                            Ok(_) => {}
                            Err(err) => println!("{err:#}"),
                        }
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            BuilderCommand::Quick { prompt } => {
                match resolve_backend(args.dryrun, args.api_url.clone(), args.quick_url.clone()) {
                    Ok(backend) => {
                        let output = &store.config().output;
                        let request = QuickUpdateRequest {
                            prompt,
                            image_urls: Vec::new(),
                            aspect_ratio: output.aspect_ratio.clone(),
                            resolution: output.quality.label().to_string(),
                        };
                        match backend.quick_update(&request) {
                            Ok(image) => println!("{image}"),
                            Err(err) => println!("Quick update failed: {err:#}"),
                        }
                    }
                    Err(err) => println!("{err:#}"),
                }
            }
            BuilderCommand::Unknown { command } => {
                println!("Unknown command /{command}. Type /help for the list.");
            }
            BuilderCommand::Invalid { message } => println!("{message}"),
        }
    }

    Ok(0)
}

/// Runs one batch, printing progress and partial results as they land.
/// Returns the process exit code (0 complete, 1 failed) and every reference
/// produced before the batch ended.
fn drive_batch(
    backend: &dyn PhotoshootBackend,
    events: Option<&EventWriter>,
    config: &ShootConfig,
) -> Result<(i32, Vec<String>)> {
    let mut runner = BatchRunner::new(backend);
    if let Some(events) = events {
        runner = runner.with_events(events);
    }

    let mut observer = PrintObserver;
    let outcome = runner.run(config, &mut observer)?;

    let code = match &outcome.failure {
        Some(failure) => {
            eprintln!(
                "Batch failed at image {} of {}: {}",
                failure.iteration, config.output.count, failure.message
            );
            if !outcome.images.is_empty() {
                eprintln!("Keeping {} completed image(s).", outcome.images.len());
            }
            1
        }
        None => {
            println!("Batch complete: {} image(s).", outcome.images.len());
            0
        }
    };
    Ok((code, outcome.images))
}

struct PrintObserver;

impl BatchObserver for PrintObserver {
    fn on_phase(&mut self, phase: &BatchPhase) {
        if let BatchPhase::Generating { current, total } = phase {
            println!("Generating {current} of {total}...");
        }
    }

    fn on_image(&mut self, reference: &str) {
        println!("  + {reference}");
    }
}

fn draft_from_spec(spec: ItemSpec) -> ItemDraft {
    ItemDraft {
        kind: spec.kind,
        text: spec.text,
        strength: spec.strength,
        reference_image_url: spec.image,
        reference_image_urls: spec.angles,
    }
}

fn print_summary(config: &ShootConfig) {
    println!("Job {}", config.meta.job_id);
    for section in Section::ALL {
        let items = config.section(section);
        println!("{} ({} item{})", section, items.len(), plural(items.len()));
        for (index, item) in items.iter().enumerate() {
            let text = if item.text.trim().is_empty() {
                "No description"
            } else {
                item.text.as_str()
            };
            println!(
                "  {}. [{}] {} ({} image(s))  id={}",
                index + 1,
                item.kind,
                text,
                item.image_count(),
                item.id
            );
        }
    }
    let output = &config.output;
    println!(
        "output: count={} quality={} variety={} ratio={} preset={}",
        output.count,
        output.quality.label(),
        output.batch_variety.label(),
        output.aspect_ratio,
        output.platform_preset
    );
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn resolve_backend(
    dryrun: bool,
    api_url: Option<String>,
    quick_url: Option<String>,
) -> Result<Box<dyn PhotoshootBackend>> {
    if dryrun {
        return Ok(Box::new(DryrunBackend::new()));
    }
    let api_url = api_url.or_else(|| env_non_empty("LOOKBOOK_API_URL"));
    let quick_url = quick_url.or_else(|| env_non_empty("LOOKBOOK_QUICK_API_URL"));
    if api_url.is_none() && quick_url.is_none() {
        bail!("No backend configured; pass --api-url/--quick-url, set LOOKBOOK_API_URL, or use --dryrun");
    }
    Ok(Box::new(HttpBackend::new(api_url, quick_url)))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn load_config(path: &Path) -> Result<ShootConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading configuration ({})", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid configuration JSON ({})", path.display()))
}

fn save_config(path: &Path, config: &ShootConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// Saves generated references to disk: `http(s)` URLs are downloaded,
/// `data:` URLs are decoded, anything else is left as-is and reported.
fn save_references(dir: &Path, references: &[String], stem: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut saved = Vec::new();
    for (index, reference) in references.iter().enumerate() {
        let (bytes, extension) = if reference.starts_with("data:") {
            decode_data_url(reference)?
        } else if reference.starts_with("http://") || reference.starts_with("https://") {
            (download_bytes(reference)?, extension_from_url(reference))
        } else {
            println!("Skipping unsupported reference scheme: {reference}");
            continue;
        };
        let path = dir.join(format!("{stem}-{}.{extension}", index + 1));
        fs::write(&path, bytes)
            .with_context(|| format!("failed writing {}", path.display()))?;
        saved.push(path);
    }
    Ok(saved)
}

fn report_saved(result: &Result<Vec<PathBuf>>) {
    match result {
        Ok(paths) => {
            for path in paths {
                println!("Saved {}", path.display());
            }
        }
        Err(err) => eprintln!("Saving results failed: {err:#}"),
    }
}

fn download_bytes(url: &str) -> Result<Vec<u8>> {
    let response = reqwest::blocking::get(url)
        .with_context(|| format!("failed downloading result ({url})"))?;
    if !response.status().is_success() {
        bail!("result download failed ({})", response.status());
    }
    Ok(response
        .bytes()
        .context("failed reading result bytes")?
        .to_vec())
}

fn decode_data_url(raw: &str) -> Result<(Vec<u8>, &'static str)> {
    let Some((header, payload)) = raw.split_once(',') else {
        bail!("malformed data URL");
    };
    if !header.ends_with(";base64") {
        bail!("unsupported data URL encoding (expected base64)");
    }
    let mime = header
        .trim_start_matches("data:")
        .trim_end_matches(";base64");
    let extension = match mime {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    };
    let bytes = BASE64
        .decode(payload.as_bytes())
        .context("data URL base64 decode failed")?;
    Ok((bytes, extension))
}

fn extension_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "jpg",
        Some("webp") => "webp",
        Some("gif") => "gif",
        _ => "png",
    }
}
