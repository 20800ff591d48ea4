use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{MemoryStorage, Monitor, WorkerBuilder, WorkerFactoryFn},
};
use cachewire::{
    application::{
        error::AppError,
        jobs::{process_notification_job, JobWorkerContext},
        notifications::NotificationService,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, ApiState, ApiToken},
        telemetry, InvalidationEmitter, TokenSigner,
    },
    relay::{self, RelayState, RoomRegistry},
    store::MemoryBackend,
};
use cachewire_api_types::NotificationEvent;
use tokio::task::JoinHandle;
use tracing::{dispatcher, error, info, Dispatch, Level};
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
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    settings
        .validate_for_serve()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;
    let addr = settings
        .server
        .addr()
        .map_err(|err| AppError::from(InfraError::configuration(err.to_string())))?;

    let signing_secret = settings
        .relay
        .signing_secret
        .as_deref()
        .ok_or_else(|| AppError::from(InfraError::configuration("relay signing secret missing")))?;
    let signer = Arc::new(
        TokenSigner::new(signing_secret, settings.relay.token_ttl()).map_err(AppError::from)?,
    );
    let registry = Arc::new(RoomRegistry::new(settings.relay.room_capacity.get()));

    // the emitter publishes to the relay's own ingress unless pointed
    // elsewhere
    let ingress = settings
        .relay
        .ingress_url
        .clone()
        .unwrap_or_else(|| format!("http://{addr}"));
    let emitter =
        InvalidationEmitter::new(&ingress, Arc::clone(&signer), settings.relay.emit_timeout())
            .map_err(AppError::from)?;

    let backend = Arc::new(MemoryBackend::new());
    let notifications = Arc::new(NotificationService::new(
        backend,
        emitter,
        settings.store.retention(),
    ));

    let queue: MemoryStorage<NotificationEvent> = MemoryStorage::new();
    let job_context = JobWorkerContext {
        notifications: Arc::clone(&notifications),
    };
    let monitor_handle = spawn_job_monitor(queue.clone(), job_context, &settings.jobs);

    let api_token = settings
        .api
        .token
        .as_deref()
        .ok_or_else(|| AppError::from(InfraError::configuration("api token missing")))?;
    let api_state = ApiState {
        notifications,
        queue,
        token: ApiToken::new(api_token),
    };
    let relay_state = RelayState { registry, signer };

    let app = relay::router(relay_state).merge(http::router(api_state));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "cachewire::serve",
        %addr,
        ingress,
        "cachewire listening"
    );

    let result = axum::serve(listener, app.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

fn spawn_job_monitor(
    queue: MemoryStorage<NotificationEvent>,
    context: JobWorkerContext,
    jobs: &config::JobsSettings,
) -> JoinHandle<()> {
    let concurrency = jobs.notification_concurrency.get() as usize;

    let notifications_worker = WorkerBuilder::new("notifications-worker")
        .concurrency(concurrency)
        .data(context)
        .backend(queue)
        .build_fn(process_notification_job);

    let monitor = Monitor::new().register(notifications_worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}
