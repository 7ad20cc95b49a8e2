use std::{process, sync::Arc};

use postlist::{
    application::{
        chrome::ChromeService,
        error::AppError,
        feed::{CardSettings, FeedService},
        session::FeedSessions,
    },
    config,
    infra::{
        error::InfraError,
        graphql::GraphqlPostsSource,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Check(_) => run_check(settings).await,
    }
}

fn build_feed_service(settings: &config::Settings) -> Result<FeedService, AppError> {
    let source = GraphqlPostsSource::from_settings(&settings.api)?;
    let sessions = FeedSessions::new(settings.feed.max_sessions, settings.feed.session_idle);
    let cards = CardSettings {
        post_path_prefix: settings.site.post_path_prefix.clone(),
        image_src: settings.site.card_image_src.clone(),
    };

    Ok(FeedService::new(
        Arc::new(source),
        Arc::new(sessions),
        settings.feed.page_limit,
        cards,
    ))
}

async fn run_check(settings: config::Settings) -> Result<(), AppError> {
    let feed = build_feed_service(&settings)?;
    info!(
        target = "postlist::check",
        endpoint = %settings.api.endpoint,
        page_limit = settings.feed.page_limit.get(),
        "configuration is valid; probing API"
    );

    feed.probe().await?;
    info!(target = "postlist::check", "API responded to the posts query");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let feed = Arc::new(build_feed_service(&settings)?);
    let chrome = Arc::new(ChromeService::new(&settings.site));
    let shutdown = CancellationToken::new();

    let sweeper = {
        let sessions = feed.sessions().clone();
        let every = settings.feed.sweep_interval;
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sessions.sweep_every(every, shutdown).await })
    };

    let router = http::build_router(HttpState {
        feed: feed.clone(),
        chrome,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "postlist::serve",
        addr = %settings.server.addr,
        endpoint = %settings.api.endpoint,
        "listening"
    );

    let server_shutdown = shutdown.clone();
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await });
    let mut server_task = tokio::spawn(async move { server.await });

    let result = tokio::select! {
        joined = &mut server_task => {
            shutdown.cancel();
            flatten_server_result(joined)
        }
        _ = shutdown_signal() => {
            info!(target = "postlist::serve", "shutdown signal received");
            shutdown.cancel();
            feed.sessions().close_all();

            match tokio::time::timeout(settings.server.graceful_shutdown, &mut server_task).await {
                Ok(joined) => flatten_server_result(joined),
                Err(_) => {
                    warn!(
                        target = "postlist::serve",
                        timeout_secs = settings.server.graceful_shutdown.as_secs(),
                        "graceful shutdown timed out; aborting open connections"
                    );
                    server_task.abort();
                    Ok(())
                }
            }
        }
    };

    feed.sessions().close_all();
    if let Err(err) = sweeper.await {
        warn!(target = "postlist::serve", error = %err, "session sweeper ended abnormally");
    }

    result
}

fn flatten_server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(err) => {
                warn!(
                    target = "postlist::serve",
                    error = %err,
                    "failed to install SIGTERM handler; listening for Ctrl-C only"
                );
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(target = "postlist::serve", error = %err, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "postlist::serve", error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
