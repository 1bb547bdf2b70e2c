use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use futures_util::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vkllama::cli::ChatRepl;
use vkllama::config::VkllamaConfig;
use vkllama::llm::{GenerationRequest, InferenceBackend, OllamaBackend};
use vkllama::server::{self, ServeConfig};
use vkllama::session::Session;
use vkllama::transcript::Message;

#[derive(Parser)]
#[command(name = "vkllama")]
#[command(about = "Local LLM chat front end speaking the Ollama JSON API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server address (default: from .vkllama.toml or http://localhost:11435)
    #[arg(short = 'a', long, env = "VKLLAMA_ADDRESS", global = true)]
    address: Option<String>,

    /// Model to use (default: from .vkllama.toml)
    #[arg(short = 'm', long, env = "VKLLAMA_MODEL", global = true)]
    model: Option<String>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one prompt against the server
    Run {
        /// Seed for reproducible generation (random if omitted)
        #[arg(long)]
        seed: Option<u32>,
        /// Stream output as it is generated
        #[arg(short, long)]
        stream: bool,
        /// Enable iterative reasoning on models that support it
        #[arg(short = 't', long)]
        think: bool,
        /// Prompt for the model
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    /// Interactive chat session
    Chat {
        /// System prompt for the session
        #[arg(long)]
        system: Option<String>,
        /// Context window size
        #[arg(long)]
        ctx: Option<u32>,
        /// Seed for reproducible generation (random if omitted)
        #[arg(long)]
        seed: Option<u32>,
    },
    /// List models available on the server
    List,
    /// Start the Ollama-compatible HTTP server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,
        /// Bind port
        #[arg(short = 'p', long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
        .into()
    });
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = VkllamaConfig::load()?;
    let address = cli.address.unwrap_or_else(|| config.llm.address.clone());
    let model = cli.model.unwrap_or_else(|| config.llm.model.clone());

    match cli.command {
        Commands::Run {
            seed,
            stream,
            think,
            prompt,
        } => {
            let backend = OllamaBackend::new(&address);
            let request = GenerationRequest {
                model,
                messages: vec![Message::user(prompt.join(" "))],
                seed: Some(seed.unwrap_or_else(rand::random)),
                stream,
                num_ctx: Some(config.llm.num_ctx),
                num_predict: None,
                temperature: None,
                think: think.then_some(true),
            };
            run_prompt(&backend, request).await?;
        }
        Commands::Chat { system, ctx, seed } => {
            let backend = OllamaBackend::new(&address);
            let mut session = Session::new(
                model,
                ctx.unwrap_or(config.llm.num_ctx),
                seed.unwrap_or_else(rand::random),
            );
            if let Some(prompt) = system {
                session.transcript.set_system(prompt);
            }
            ChatRepl::new(session, Box::new(backend)).run().await?;
        }
        Commands::List => {
            let backend = OllamaBackend::new(&address);
            let models = backend.models().await?;
            println!("NAME\tID\tSIZE\tMODIFIED");
            for m in models {
                println!(
                    "{}\t{}\t{:.1} GB\t{}",
                    m.name,
                    m.digest,
                    m.size as f64 / (1024.0 * 1024.0 * 1024.0),
                    m.modified_at
                );
            }
        }
        Commands::Serve { host, port } => {
            let backend = Arc::new(OllamaBackend::new(&config.serve.upstream));
            let serve_config = ServeConfig {
                host: host.unwrap_or_else(|| config.serve.host.clone()),
                port: port.unwrap_or(config.serve.port),
                default_model: model,
                models: config.models.clone(),
            };
            server::serve(serve_config, backend).await?;
        }
    }

    Ok(())
}

async fn run_prompt(backend: &OllamaBackend, request: GenerationRequest) -> Result<()> {
    if request.stream {
        let mut fragments = backend.stream(request).await?;
        let mut stdout = std::io::stdout();
        while let Some(fragment) = fragments.next().await {
            print!("{}", fragment?);
            stdout.flush()?;
        }
        println!();
    } else {
        let answer = backend.generate(request).await?;
        println!("{}", answer);
    }
    Ok(())
}
