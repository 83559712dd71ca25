//! agent-codegen command line entry point
//!
//! Runs the generation pipeline for one agent specification, prints the run
//! result as JSON on stdout and optionally writes the generated project.
//! `serve` exposes the same pipeline over HTTP.

use agent_codegen::config::PipelineConfig;
use agent_codegen::llm::{LlmGenerationService, LlmProvider};
use agent_codegen::observability::init_default_logging;
use agent_codegen::output::write_generated_files;
use agent_codegen::pipeline::Orchestrator;
use agent_codegen::progress::TracingProgressReporter;
use agent_codegen::request::Request;
use agent_codegen::server::CodegenServer;
use clap::{Parser, Subcommand};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Generate runnable agent projects from agent specifications
#[derive(Parser)]
#[command(name = "agent-codegen")]
#[command(about = "Generate runnable agent projects from agent specifications")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for one request
    Generate {
        /// Request JSON file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output directory (defaults to output.directory from the configuration)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Print the run result without writing files
        #[arg(long)]
        no_write: bool,
    },
    /// Serve the pipeline over HTTP
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,

        /// Output directory (defaults to output.directory from the configuration)
        #[arg(short, long, value_name = "DIR", env = "AGENT_OUTPUT_DIR")]
        out: Option<PathBuf>,

        /// Keep generated projects in memory only
        #[arg(long)]
        no_write: bool,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting agent-codegen v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Generate {
            input,
            out,
            no_write,
        } => generate(config, input, out, no_write).await,
        Commands::Serve {
            host,
            port,
            out,
            no_write,
        } => serve(config, SocketAddr::new(host, port), out, no_write).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Command failed: {}", e);
            process::exit(1);
        }
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(PipelineConfig::load_from_file(path)?);
    }

    for path_str in ["agent-codegen.toml", "config/agent-codegen.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(PipelineConfig::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults");
    let config = PipelineConfig::default();
    config.validate()?;
    Ok(config)
}

/// Provider factory for creating LLM providers from configuration
struct LlmProviderFactory;

impl LlmProviderFactory {
    fn create_provider(
        config: &PipelineConfig,
    ) -> Result<Arc<dyn LlmProvider>, Box<dyn std::error::Error>> {
        use agent_codegen::llm::providers::{
            AnthropicConfig, AnthropicProvider, OpenAiConfig, OpenAiProvider,
        };

        let api_key = config.get_llm_api_key()?;
        let timeout = config.generation.request_timeout();

        match config.llm.provider.as_str() {
            "openai" => {
                let mut openai_config = OpenAiConfig {
                    api_key,
                    timeout,
                    ..Default::default()
                };
                if let Some(base_url) = &config.llm.base_url {
                    openai_config.base_url = base_url.clone();
                }
                Ok(Arc::new(OpenAiProvider::new(openai_config)?))
            }
            "anthropic" => {
                let mut anthropic_config = AnthropicConfig {
                    api_key,
                    timeout,
                    ..Default::default()
                };
                if let Some(base_url) = &config.llm.base_url {
                    anthropic_config.base_url = base_url.clone();
                }
                Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
            }
            provider => Err(format!("Unsupported LLM provider: {provider}").into()),
        }
    }
}

/// Returns whether the run succeeded
async fn generate(
    config: PipelineConfig,
    input: PathBuf,
    out: Option<PathBuf>,
    no_write: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let request = Request::load_from_file(&input)?;
    let provider = LlmProviderFactory::create_provider(&config)?;
    let service = Arc::new(LlmGenerationService::from_config(provider, &config.llm));

    let out_dir = out.unwrap_or_else(|| PathBuf::from(&config.output.directory));
    let verbosity = config.pipeline.progress_verbosity;
    let orchestrator = Orchestrator::new(config, service);

    let run = orchestrator.start(request);
    let reporter = TracingProgressReporter::new(verbosity).spawn(&run.progress());

    let canceller = run.canceller();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling run");
            canceller.cancel();
        }
    });

    let result = run.execute().await;
    if let Err(e) = reporter.await {
        warn!("Progress reporter stopped abnormally: {}", e);
    }

    if !no_write && !result.generated_files.is_empty() {
        let written =
            write_generated_files(&result.generated_files, &out_dir, &result.pipeline_id).await?;
        info!("Project written to {}", written.display());
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_success())
}

async fn serve(
    config: PipelineConfig,
    addr: SocketAddr,
    out: Option<PathBuf>,
    no_write: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let provider = LlmProviderFactory::create_provider(&config)?;
    let service = Arc::new(LlmGenerationService::from_config(provider, &config.llm));

    let out_dir = out.unwrap_or_else(|| PathBuf::from(&config.output.directory));
    let output_dir = (!no_write).then_some(out_dir);
    let server = Arc::new(CodegenServer::new(
        Orchestrator::new(config, service),
        output_dir,
    ));

    server.run(addr).await?;
    Ok(true)
}

fn handle_config_command(
    config: PipelineConfig,
    show: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    info!("Configuration validation complete");
    Ok(true)
}
