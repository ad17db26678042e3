use crate::cli::ServeArgs;
use crate::infra::{AppState, LogNotifier};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hospital_saas::config::AppConfig;
use hospital_saas::error::AppError;
use hospital_saas::events::ChannelBroadcaster;
use hospital_saas::store::MemoryStore;
use hospital_saas::tasks::{run_scheduler, ScheduledTasks};
use hospital_saas::telemetry;
use hospital_saas::workflows::HospitalServices;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::default());
    let notifier = Arc::new(LogNotifier);
    let broadcaster = Arc::new(ChannelBroadcaster::default());
    let services = HospitalServices::new(
        store.clone(),
        config.hospital.clone(),
        notifier.clone(),
        broadcaster,
    );

    if !args.no_scheduler {
        let tasks = Arc::new(ScheduledTasks::new(
            store,
            services.appointments.clone(),
            notifier,
            config.hospital.clone(),
        ));
        tokio::spawn(run_scheduler(tasks, config.scheduler.tick));
    }

    let app = with_service_routes(&services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hospital service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
