use herd_alerts::classifier::{DisabledClassifier, GeminiClassifier, PriorityClassifier};
use herd_alerts::clock::{Clock, SystemClock};
use herd_alerts::config::Config;
use herd_alerts::gateway::DatabaseGateway;
use herd_alerts::metrics::{MetricsSink, PrometheusSink, RecordingSink};
use herd_alerts::migrator::Migrator;
use herd_alerts::rules::{
    ClinicalEvaluator, ManagementEvaluator, ProductionEvaluator, ReproductionEvaluator,
    SanitaryEvaluator,
};
use herd_alerts::scheduler::{Scheduler, SchedulerConfig};
use herd_alerts::store::AlertStore;
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    herd_alerts::telemetry::init_telemetry("herd-alerts-scheduler")?;

    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();
    tokio::spawn(serve_metrics(config.metrics_addr, metric_handle, prometheus_layer));

    // Database Connection
    let mut opts = ConnectOptions::new(config.database_url.clone());
    opts.sqlx_logging(false);
    let db = Database::connect(opts).await?;
    if config.run_migrations {
        Migrator::up(&db, None).await?;
        tracing::info!("Migrations applied");
    }
    herd_alerts::metrics::init_metrics(&db).await;

    let classifier: Arc<dyn PriorityClassifier> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiClassifier::new(
            key.clone(),
            config.gemini_model.clone(),
            config.classifier_timeout,
        )?),
        None => {
            tracing::warn!("GEMINI_API_KEY not set, unset severities default to MEDIUM");
            Arc::new(DisabledClassifier)
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.farm_offset));
    let gateway = Arc::new(DatabaseGateway::new(db.clone()));
    let store = Arc::new(AlertStore::new(
        db.clone(),
        classifier,
        config.classifier_timeout,
        clock.clone(),
    ));

    let sink: Arc<dyn MetricsSink> = if config.run_once {
        Arc::new(RecordingSink::default())
    } else {
        Arc::new(PrometheusSink)
    };

    let scheduler = Scheduler::new(
        gateway.clone(),
        clock.clone(),
        sink,
        SchedulerConfig {
            evaluation_timeout: config.evaluation_timeout,
            property_concurrency: config.property_concurrency,
        },
    )
    .register(Arc::new(SanitaryEvaluator::new(
        gateway.clone(),
        store.clone(),
        clock.clone(),
    )))
    .register(Arc::new(ReproductionEvaluator::new(
        gateway.clone(),
        store.clone(),
        clock.clone(),
    )))
    .register(Arc::new(ProductionEvaluator::new(
        gateway.clone(),
        store.clone(),
        clock.clone(),
    )))
    .register(Arc::new(ManagementEvaluator::new(
        gateway.clone(),
        gateway.clone(),
        store.clone(),
        clock.clone(),
    )))
    .register(Arc::new(ClinicalEvaluator::new(gateway, store, clock)));

    if config.run_once {
        tracing::info!("Running every trigger once");
        for report in scheduler.run_all_once().await {
            tracing::info!(
                rule = %report.rule,
                total_alerts = report.total_alerts,
                failed = report.failed_properties(),
                "{}",
                serde_json::to_string(&report)?
            );
        }
        herd_alerts::telemetry::shutdown_telemetry();
        return Ok(());
    }

    let token = CancellationToken::new();
    let running = tokio::spawn(Arc::new(scheduler).run(token.clone()));

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutting down scheduler"),
        Err(err) => tracing::error!("Unable to listen for shutdown signal: {}", err),
    }
    token.cancel();
    running.await?;
    herd_alerts::telemetry::shutdown_telemetry();
    Ok(())
}

async fn serve_metrics(
    addr: SocketAddr,
    handle: PrometheusHandle,
    layer: axum_prometheus::PrometheusMetricLayer<'static>,
) {
    let app = axum::Router::new()
        .route(
            "/metrics",
            axum::routing::get(|| async move { handle.render() }),
        )
        .layer(layer);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("Metrics server listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Metrics server stopped: {}", e);
    }
}
