//! thumb-streamer - On-demand thumbnail cache.
//!
//! This binary starts the HTTP server or generates a single derivative.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use thumb_streamer::{
    config::{Cli, Command, GenerateConfig, GenerationArgs, ServeConfig},
    create_http_client, create_router,
    error::{GenerateError, ServerError},
    master::{JsonMetadataStore, MasterResolver, MetadataStore},
    parse_size_spec,
    pipeline::Pipeline,
    server::{ResponseStreamer, RouterConfig},
    thumbnail::{ImageCodec, ThumbnailGenerator},
    HttpUpstream,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Generate(config) => run_generate(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    match serve(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: ServeConfig) -> Result<(), ServerError> {
    config.validate().map_err(ServerError::Config)?;

    print_banner();

    let generation = &config.generation;
    info!("Configuration:");
    info!("  Upload dir: {}", generation.upload_dir.display());
    info!("  Upload prefix: {}", config.upload_prefix);
    info!("  Manifest: {}", generation.manifest.display());
    info!(
        "  Sizes: {} named, policy {}",
        generation.sizes.len(),
        generation.size_policy.as_str()
    );
    for editor in &generation.editors {
        info!("  Editor: {}", editor);
    }
    if config.loop_secret.is_some() {
        info!("  Loop marker: keyed ({})", config.loop_token);
    } else {
        info!("  Loop marker: sentinel ({})", config.loop_token);
    }

    let router = build_router(&config).await?;

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/sizes", addr);
    info!(
        "    curl -o out.jpg http://{}{}/<dir>/<name>-150x150.jpg",
        addr, config.upload_prefix
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Wire the store, the self-request client and the pipeline into a router.
async fn build_router(config: &ServeConfig) -> Result<axum::Router, ServerError> {
    let store = JsonMetadataStore::load(&config.generation.manifest).await?;
    if store.is_empty() {
        warn!("  Manifest lists no masters, every miss will pass through");
    } else {
        info!("  Registered masters: {}", store.len());
    }

    let client = create_http_client(config.connect_timeout(), config.request_timeout())
        .map_err(|e| ServerError::Client(e.to_string()))?;
    let upstream = Arc::new(HttpUpstream::new(client));
    let guard = config.loop_guard();
    let self_origin = config.self_origin().map_err(ServerError::Config)?;
    info!("  Self origin: {}", self_origin);

    let pipeline = Pipeline::new(
        MasterResolver::new(upstream.clone(), Arc::new(store), guard.clone()),
        build_generator(&config.generation),
        ResponseStreamer::new(upstream),
        guard,
    );

    let mut router_config =
        RouterConfig::new(&config.upload_prefix, &config.generation.upload_dir, self_origin)
            .with_trust_forwarded_proto(config.trust_forwarded_proto)
            .with_tracing(!config.no_tracing);
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    Ok(create_router(pipeline, router_config))
}

/// Generator with the default codec, one codec per editor and the size policy.
fn build_generator(args: &GenerationArgs) -> ThumbnailGenerator {
    let codec: Arc<dyn ImageCodec> = Arc::new(args.codec());
    let generator = ThumbnailGenerator::new(&args.upload_dir, codec)
        .with_sizes(Arc::new(args.size_registry()), args.size_policy);

    args.editor_codecs()
        .into_iter()
        .fold(generator, |generator, (id, codec)| {
            generator.with_editor(id, Arc::new(codec))
        })
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("▀█▀ █ █ █ █ █▀▄▀█ █▄▄   █▀ ▀█▀ █▀█ █▀▀ ▄▀█ █▀▄▀█ █▀▀ █▀█");
    info!(" █  █▀█ █▄█ █ ▀ █ █▄█   ▄█  █  █▀▄ ██▄ █▀█ █ ▀ █ ██▄ █▀▄");
    info!("");
    info!("                         v{}", version);
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "thumb_streamer=debug,tower_http=debug"
    } else {
        "thumb_streamer=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Generate Command
// =============================================================================

async fn run_generate(config: GenerateConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let path = config.relative_path();

    let Some(spec) = parse_size_spec(path) else {
        eprintln!("Error: '{}' is not a derivative path (<name>[-e<id>]-WxH.<ext>)", path);
        return ExitCode::FAILURE;
    };
    let Some(master) = spec.master_path(path) else {
        eprintln!("Error: cannot derive the master of '{}'", path);
        return ExitCode::FAILURE;
    };

    let store = match JsonMetadataStore::load(&config.generation.manifest).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match store.attachment_id(&master).await {
        Ok(Some(id)) if !id.is_empty() => {}
        Ok(_) => {
            eprintln!("Error: master '{}' is not a registered asset", master);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let generator = build_generator(&config.generation);
    let thumbnail = match generator.generate(&master, &spec).await {
        Ok(thumbnail) => thumbnail,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let GenerateError::SizeNotAllowed { .. } = e {
                eprintln!();
                eprintln!("Tip: register the box with --size <name>=WxH or use --size-policy any");
            }
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        let json = serde_json::json!({
            "master": master,
            "path": thumbnail.relative_path,
            "file_name": thumbnail.file_name,
            "width": thumbnail.width,
            "height": thumbnail.height,
            "mime_type": thumbnail.mime_type,
        });
        match serde_json::to_string_pretty(&json) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", thumbnail.relative_path);
    }

    ExitCode::SUCCESS
}
