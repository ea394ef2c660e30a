use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use lumina_contracts::ambient::{AmbientProjectDiscovery, ProjectDiscovery};
use lumina_contracts::request::{apply_prompt_modifiers, GenerationRequest};
use lumina_contracts::resolve::{resolve_config, CliOverrides, ResolvedConfig};
use lumina_contracts::settings::{
    default_output_dir, init_config, user_env_file, InitOutcome, Settings,
};
use lumina_contracts::ConfigError;
use lumina_engine::{ClientFactory, HttpClientFactory, ImageGenerator};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const QUIET_DEPENDENCIES: &str = "reqwest=warn,hyper=warn,hyper_util=warn,rustls=warn";

const AFTER_HELP: &str = "\
Examples:
  lumina init
  lumina -p \"A futuristic city on Mars\"
  lumina -p \"Make it look like a painting\" -i photo.jpg
  lumina -p \"A cat\" --style \"Cyberpunk\" --variation \"Neon lighting\"
  lumina -p \"A landscape\" --aspect-ratio 16:9 --image-size 4K
  echo \"A cyberpunk street food vendor\" | lumina
  lumina -p \"A robot\" --count 4";

#[derive(Debug, Parser)]
#[command(
    name = "lumina",
    version,
    about = "Generate images with Gemini from the command line",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    generate: GenerateArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize configuration.
    Init,
}

#[derive(Debug, Clone, Default, Args)]
struct GenerateArgs {
    /// Text prompt. Required unless piping stdin.
    #[arg(short, long)]
    prompt: Option<String>,
    /// Reference image for editing or composition. Repeatable.
    #[arg(short, long = "image")]
    images: Vec<PathBuf>,
    /// Number of images to generate.
    #[arg(
        short = 'n',
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    count: u32,
    /// Artistic style to apply. Repeatable.
    #[arg(long = "style")]
    styles: Vec<String>,
    /// Visual variation to apply. Repeatable.
    #[arg(long = "variation")]
    variations: Vec<String>,
    /// Directory to save output. Defaults to ~/Pictures/Lumina_Generated.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Specific filename for the output image, e.g. result.png.
    #[arg(short, long)]
    filename: Option<String>,
    /// Google AI Studio API key (overrides env).
    #[arg(long)]
    api_key: Option<String>,
    /// GCP project id (overrides env).
    #[arg(long)]
    project_id: Option<String>,
    /// GCP location (default: us-central1).
    #[arg(long)]
    location: Option<String>,
    /// Model name (default: gemini-3-pro-image-preview).
    #[arg(long)]
    model_name: Option<String>,
    /// Aspect ratio: 1:1, 16:9, 9:16, 4:3, 3:4.
    #[arg(long)]
    aspect_ratio: Option<String>,
    /// Image resolution: 1K, 2K, 4K.
    #[arg(long)]
    image_size: Option<String>,
    /// Items to exclude from the image.
    #[arg(long)]
    negative_prompt: Option<String>,
    /// Random seed. Accepted but not sent to the provider.
    #[arg(long)]
    seed: Option<i64>,
}

impl GenerateArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_key: self.api_key.clone(),
            project_id: self.project_id.clone(),
            location: self.location.clone(),
            model_name: self.model_name.clone(),
            output_dir: self.output_dir.clone(),
            aspect_ratio: self.aspect_ratio.clone(),
            image_size: self.image_size.clone(),
        }
    }
}

fn main() {
    std::process::exit(exit_code(run()));
}

fn exit_code(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "Error:".bold().red());
            1
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(Command::Init) = cli.command {
        return Ok(run_init());
    }

    let stdin = io::stdin();
    let piped = (!stdin.is_terminal()).then(|| stdin.lock());
    run_generate(
        &cli.generate,
        piped,
        Settings::load,
        &AmbientProjectDiscovery,
        Box::new(HttpClientFactory),
    )
}

fn run_generate<R, L>(
    args: &GenerateArgs,
    stdin: Option<R>,
    load_settings: L,
    discovery: &dyn ProjectDiscovery,
    factory: Box<dyn ClientFactory>,
) -> Result<i32>
where
    R: Read,
    L: FnOnce() -> Result<Settings, ConfigError>,
{
    let Some(prompt) = read_prompt(args.prompt.as_deref(), stdin)? else {
        println!("{}", "No command or prompt provided.".yellow());
        println!(
            "Use {} or pipe text via stdin.\nRun {} for usage.",
            "--prompt".bold(),
            "lumina --help".bold()
        );
        return Ok(0);
    };

    let settings = load_settings()?;
    let resolved = match resolve_config(&args.overrides(), &settings, discovery) {
        Ok(resolved) => resolved,
        Err(ConfigError::MissingAuth) => {
            eprintln!(
                "{} Provide either --api-key (or API_KEY in env)\n\
                 OR --project-id (or PROJECT_ID/ADC).",
                "Authentication missing.".bold().red()
            );
            return Ok(1);
        }
        Err(err) => return Err(err.into()),
    };

    let request = build_request(args, &prompt, &resolved, &settings);
    debug!("Using Authentication: {}", resolved.auth);
    debug!("Model: {}", resolved.model_name);
    debug!("Full Prompt: {}", request.prompt);

    let mut generator = ImageGenerator::from_auth(&resolved.model_name, &resolved.auth, factory);
    let files = generator.generate(&request)?;

    println!(
        "{}",
        format!("Successfully generated {} images.", files.len())
            .bold()
            .green()
    );
    for file in &files {
        println!("  - {}", file.display());
    }
    Ok(0)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},{QUIET_DEPENDENCIES}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run_init() -> i32 {
    let Some(env_file) = user_env_file() else {
        eprintln!(
            "{}",
            "Failed to initialize configuration: home directory not found".red()
        );
        return 1;
    };
    match init_config(&env_file, &default_output_dir()) {
        Ok(InitOutcome::AlreadyExists(path)) => {
            println!(
                "{}",
                format!("Configuration already exists at {}", path.display()).yellow()
            );
            0
        }
        Ok(InitOutcome::Created(path)) => {
            println!(
                "{}",
                format!("Initialized configuration at {}", path.display()).green()
            );
            println!("Please edit this file to add your API_KEY or PROJECT_ID.");
            0
        }
        Err(err) => {
            eprintln!(
                "{}",
                format!("Failed to initialize configuration: {err:#}").red()
            );
            1
        }
    }
}

/// The `--prompt` value, or trimmed stdin when it is piped.
fn read_prompt<R: Read>(flag: Option<&str>, stdin: Option<R>) -> Result<Option<String>> {
    if let Some(prompt) = flag.filter(|value| !value.trim().is_empty()) {
        return Ok(Some(prompt.to_string()));
    }
    let Some(mut stdin) = stdin else {
        return Ok(None);
    };
    let mut buffer = String::new();
    stdin
        .read_to_string(&mut buffer)
        .context("failed to read prompt from stdin")?;
    let prompt = buffer.trim();
    if prompt.is_empty() {
        return Ok(None);
    }
    debug!("Reading prompt from stdin...");
    Ok(Some(prompt.to_string()))
}

fn build_request(
    args: &GenerateArgs,
    prompt: &str,
    resolved: &ResolvedConfig,
    settings: &Settings,
) -> GenerationRequest {
    let mut request =
        GenerationRequest::new(apply_prompt_modifiers(prompt, &args.styles, &args.variations));
    request.reference_images = args.images.clone();
    request.count = args.count;
    request.aspect_ratio = resolved.aspect_ratio.clone();
    request.image_size = resolved.image_size.clone();
    request.negative_prompt = args.negative_prompt.clone();
    request.person_generation = settings.person_generation;
    request.safety_filter_level = Some(settings.safety_filter_level.clone());
    request.add_watermark = settings.add_watermark;
    request.seed = args.seed;
    request.output_dir = resolved.output_dir.clone();
    request.filename = args.filename.clone();
    request
}
