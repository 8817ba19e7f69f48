//! trackrag - CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use trackrag::{
    cli::{Args, Commands, Verbosity},
    config::Config,
    knowledge::KnowledgeStore,
    orchestrator::{FallbackOrchestrator, Route},
    rag::TrackPrompt,
    service::{self, AppState, RagServiceClient},
    streaming::{ClientTimeouts, OllamaClient},
    types::{GenerationRequest, GenerationResponse, Metadata, Track},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load()?,
    };
    args.apply_overrides(&mut config);

    match &args.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            run_server(&config).await?;
        }
        Commands::Generate {
            prompt,
            track,
            top_k,
            model,
            no_rag,
            stream,
        } => {
            let track = match track {
                Some(name) if !*no_rag => Some(Track::parse(name)?),
                _ => None,
            };
            let model = model.clone().unwrap_or_else(|| config.models.default.clone());
            let mut request = GenerationRequest::new(model, prompt.clone()).streaming(*stream);
            if let Some(track) = track {
                request = request.with_track(track);
                request.top_k = Some(top_k.unwrap_or(config.generation.top_k));
            }
            run_generate(&args, &config, request).await?;
        }
        Commands::Learn {
            track,
            title,
            description,
            difficulty,
            goals,
            no_rag,
            stream,
        } => {
            let prompt = TrackPrompt::new(Track::parse(track)?, title.clone(), difficulty.clone())
                .with_description(description.clone())
                .with_goals(goals.clone());
            if *stream {
                let model = config
                    .models
                    .fallback
                    .clone()
                    .unwrap_or_else(|| config.models.default.clone());
                stream_direct(&config, &prompt.request(&model, false).streaming(true)).await?;
            } else {
                run_learn(&args, &config, &prompt, !*no_rag).await?;
            }
        }
        Commands::Quiz {
            content,
            file,
            model,
        } => {
            let content = read_content(content, file)?;
            let model = model.clone().unwrap_or_else(|| config.models.default.clone());
            run_quiz(&args, &config, &content, &model).await?;
        }
        Commands::Add {
            track,
            content,
            file,
            meta,
            local,
        } => {
            let content = read_content(content, file)?;
            let mut metadata = Metadata::new();
            for (key, value) in meta {
                metadata.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
            add_document(&config, Track::parse(track)?, &content, metadata, *local).await?;
        }
        Commands::Clear { track, local } => {
            clear_track(&config, Track::parse(track)?, *local).await?;
        }
        Commands::Models => {
            list_models(&config).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn ollama_client(config: &Config) -> Result<OllamaClient> {
    Ok(
        OllamaClient::with_config(&config.backends.ollama_url, &config.models.default)?
            .with_options(config.generation.options())
            .with_timeouts(ClientTimeouts {
                probe: config.timeouts.probe(),
                single_shot: config.timeouts.single_shot(),
                stream: config.timeouts.stream(),
            }),
    )
}

fn rag_client(config: &Config) -> Result<RagServiceClient> {
    Ok(
        RagServiceClient::with_config(&config.backends.rag_url)?.with_timeouts(ClientTimeouts {
            probe: config.timeouts.rag_probe(),
            single_shot: config.timeouts.single_shot(),
            stream: config.timeouts.stream(),
        }),
    )
}

/// The service on the configured URL, if it answers its health check
async fn running_service(config: &Config) -> Result<Option<RagServiceClient>> {
    let client = rag_client(config)?;
    match client.health().await {
        Ok(report) if report.is_reachable() => Ok(Some(client)),
        Ok(report) => {
            debug!(status = %report.status, "RAG service not usable, writing locally");
            Ok(None)
        }
        Err(e) => {
            debug!(error = %e, "RAG service not running, writing locally");
            Ok(None)
        }
    }
}

fn read_content(content: &Option<String>, file: &Option<PathBuf>) -> Result<String> {
    match (content, file) {
        (Some(content), _) => Ok(content.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        (None, None) => anyhow::bail!("Either --content or --file is required"),
    }
}

fn orchestrator(config: &Config, explicit_model: bool) -> Result<FallbackOrchestrator> {
    let rag = Arc::new(rag_client(config)?);

    let mut orchestrator =
        FallbackOrchestrator::new(rag.clone()).with_fallback(Arc::new(ollama_client(config)?));
    if config.generation.health_gate {
        orchestrator = orchestrator.with_gate(rag);
    }
    if !explicit_model {
        if let Some(model) = &config.models.fallback {
            orchestrator = orchestrator.with_fallback_model(model.clone());
        }
    }
    Ok(orchestrator)
}

fn spinner(verbosity: Verbosity, message: &str) -> Option<ProgressBar> {
    if !verbosity.show_progress() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

async fn run_server(config: &Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    service::serve(listener, state).await?;
    Ok(())
}

async fn run_generate(args: &Args, config: &Config, request: GenerationRequest) -> Result<()> {
    // Incremental printing only on the direct path; the augmented path
    // answers with one object.
    if request.stream && request.track.is_none() {
        return stream_direct(config, &request).await;
    }

    let explicit_model = matches!(&args.command, Commands::Generate { model: Some(_), .. });
    let orchestrator = orchestrator(config, explicit_model)?;

    let pb = spinner(args.verbosity(), "Generating...");
    let outcome = orchestrator.generate_traced(&request).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let outcome = outcome?;

    if matches!(args.verbosity(), Verbosity::Verbose | Verbosity::VeryVerbose) {
        let route = match outcome.route {
            Route::Augmented => "augmented".green(),
            Route::Direct => "direct".yellow(),
        };
        let states: Vec<String> = outcome.states.iter().map(|s| s.to_string()).collect();
        eprintln!("{} {} ({})", "route:".dimmed(), route, states.join(" → ").dimmed());
    }

    print_response(&outcome.response);
    Ok(())
}

async fn stream_direct(config: &Config, request: &GenerationRequest) -> Result<()> {
    let client = ollama_client(config)?;
    let mut fragments = client.generate_stream(request).await?;

    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        print!("{}", fragment.response);
        stdout.flush()?;
        if fragment.done {
            break;
        }
    }
    println!();
    Ok(())
}

async fn run_learn(
    args: &Args,
    config: &Config,
    prompt: &TrackPrompt,
    use_rag: bool,
) -> Result<()> {
    let orchestrator = orchestrator(config, false)?;

    let pb = spinner(
        args.verbosity(),
        &format!("Creating {} module: {}", prompt.track, prompt.title),
    );
    let content = orchestrator
        .generate_track_content(prompt, &config.models.default, use_rag)
        .await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    println!("{}", content?);
    Ok(())
}

async fn run_quiz(args: &Args, config: &Config, content: &str, model: &str) -> Result<()> {
    let orchestrator = orchestrator(config, true)?;

    let pb = spinner(args.verbosity(), "Writing a question...");
    let quiz = orchestrator.generate_quiz(content, model).await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let quiz = quiz?;

    println!("{}", quiz.question.bold());
    for (i, option) in quiz.options.iter().enumerate() {
        println!("  {}. {}", (b'A' + i as u8) as char, option);
    }
    println!();
    println!("{} {}", "Answer:".green(), quiz.correct_option());
    println!("{}", quiz.explanation.dimmed());
    Ok(())
}

fn print_response(response: &GenerationResponse) {
    println!("{}", response.response);

    if let Some(sources) = &response.sources {
        println!();
        println!("{}", format!("📚 Sources ({})", sources.len()).bold());
        for (i, source) in sources.iter().enumerate() {
            let title = source
                .metadata
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or("Untitled");
            println!("  {}. {} {}", i + 1, title.cyan(), source.content.dimmed());
        }
    }
}

fn local_store(config: &Config) -> Result<KnowledgeStore> {
    Ok(KnowledgeStore::from_config(&config.store, config.timeouts.store())?)
}

async fn add_document(
    config: &Config,
    track: Track,
    content: &str,
    metadata: Metadata,
    local: bool,
) -> Result<()> {
    let service = if local { None } else { running_service(config).await? };

    let id = match service {
        Some(client) => {
            info!(url = %client.base_url(), "Adding through the RAG service");
            client.add_document(track, content, metadata).await?.document_id
        }
        None => local_store(config)?.add(track, content, metadata).await?,
    };
    println!("{} Added {} to {}", "✓".green(), id.bold(), track);
    Ok(())
}

async fn clear_track(config: &Config, track: Track, local: bool) -> Result<()> {
    let service = if local { None } else { running_service(config).await? };

    match service {
        Some(client) => {
            info!(url = %client.base_url(), "Clearing through the RAG service");
            client.clear_collection(track).await?;
        }
        None => local_store(config)?.clear(track).await?,
    }
    println!("{} Cleared collection '{}'", "✓".green(), track);
    Ok(())
}

async fn list_models(config: &Config) -> Result<()> {
    let client = ollama_client(config)?;

    match client.list_models().await {
        Ok(models) if models.is_empty() => {
            println!("No models installed.");
            println!("\nPull a model with:");
            println!("  ollama pull {}", config.models.default);
        }
        Ok(models) => {
            println!("Available models:");
            for model in models {
                let size = format!("({:.1} GB)", model.size_gb());
                println!("  • {} {}", model.name, size.dimmed());
            }
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red(), e);
            eprintln!("\nIs Ollama running? Start with: ollama serve");
            std::process::exit(1);
        }
    }

    Ok(())
}
