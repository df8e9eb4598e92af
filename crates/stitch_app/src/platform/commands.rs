use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use stitch_core::Msg;
use stitch_engine::{
    ensure_output_dir, loopback_url, relay_router, AtomicFileWriter, EngineEvent, EngineLoader,
    FfmpegFactory, OutputResource, ProgressSink, RelayFetcher, RelayServer, RelayState,
    StitchPipeline, StitchSource,
};
use stitch_logging::{stitch_debug, stitch_info, stitch_warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use super::cli::{parse_source, ServeArgs, StitchArgs};
use super::config::AppConfig;
use super::effects::{map_source, EffectRunner};
use super::http::server_router;
use super::session::App;

/// Run the relay and session API until Ctrl-C.
pub async fn serve(config: AppConfig, args: ServeArgs) -> anyhow::Result<()> {
    let addr = args.bind.unwrap_or(config.bind);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    let relay_base = loopback_url(listener.local_addr()?)?;

    let fetch_settings = config.fetch_settings();
    let relay = RelayState::new(&fetch_settings).context("building relay client")?;
    let fetcher = RelayFetcher::new(relay_base, fetch_settings)?;
    let loader = Arc::new(EngineLoader::new(Arc::new(FfmpegFactory::new(
        config.ffmpeg_settings(),
    ))));

    let cancel = CancellationToken::new();
    let runner = EffectRunner::new(
        loader.clone(),
        Arc::new(StitchPipeline::new(Arc::new(fetcher))),
        cancel.clone(),
    );
    let app = App::new(runner);

    let server = RelayServer::start(listener, server_router(app.clone(), relay))?;
    stitch_info!("Listening on {}", server.local_addr());
    app.dispatch(Msg::LoadEngineRequested);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    stitch_info!("Shutting down, engine {:?}", loader.status());
    cancel.cancel();
    server.shutdown().await;
    Ok(())
}

/// Stitch the given sources once through an in-process relay and write the result.
pub async fn stitch(mut config: AppConfig, args: StitchArgs) -> anyhow::Result<()> {
    if let Some(program) = args.ffmpeg {
        config.ffmpeg_program = program;
    }
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_output_dir(parent)?;
    }

    let fetch_settings = config.fetch_settings();
    let relay = RelayState::new(&fetch_settings).context("building relay client")?;
    let server = RelayServer::bind(SocketAddr::from(([127, 0, 0, 1], 0)), relay_router(relay))
        .await
        .context("starting relay")?;
    stitch_debug!("Relay listening on {}", server.local_addr());

    let sources: Vec<StitchSource> = args
        .sources
        .iter()
        .map(|raw| map_source(parse_source(raw)))
        .collect();

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stitch_warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        }
    });

    let result = run_once(&config, server.base_url()?, &sources, &cancel).await;
    interrupt.abort();
    server.shutdown().await;

    let output = result?;
    let path = AtomicFileWriter::write(&args.out, &output.bytes)?;
    stitch_info!(
        "Wrote {} bytes from {} sources to {:?}",
        output.byte_len(),
        sources.len(),
        path
    );
    println!("{}", path.display());
    Ok(())
}

async fn run_once(
    config: &AppConfig,
    relay_base: url::Url,
    sources: &[StitchSource],
    cancel: &CancellationToken,
) -> anyhow::Result<OutputResource> {
    let fetcher = RelayFetcher::new(relay_base, config.fetch_settings())?;
    let pipeline = StitchPipeline::new(Arc::new(fetcher));
    let loader = EngineLoader::new(Arc::new(FfmpegFactory::new(config.ffmpeg_settings())));
    let engine = loader.load().await?;
    let output = pipeline
        .run(engine.as_ref(), 1, sources, &LogSink, cancel)
        .await?;
    Ok(output)
}

struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(progress) => match (progress.index, progress.bytes) {
                (Some(index), Some(bytes)) => {
                    stitch_info!("{:?} source {}: {} bytes", progress.stage, index + 1, bytes)
                }
                _ => stitch_info!("{:?}", progress.stage),
            },
            EngineEvent::DurationRead { index, duration, .. } => {
                stitch_info!("source {} plays for {:.2}s", index + 1, duration.as_secs_f64())
            }
        }
    }
}
