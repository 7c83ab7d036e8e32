use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Request, Response,
    fairing::{Fairing, Info, Kind},
};
use std::time::Instant;
use tonic::metadata::{MetadataMap, MetadataValue};
use tracing::{field::Empty, info_span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const HONEYCOMB_ENDPOINT: &str = "https://api.honeycomb.io:443";

pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "OpenTelemetry",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().path().to_string();

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.status_code = Empty,
            http.duration_ms = Empty,
            error = Empty,
            error.type = Empty,
            error.message = Empty,
        );

        request.local_cache(|| (span, Instant::now()));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let (span, start_time) = request.local_cache(|| (info_span!("http_request"), Instant::now()));

        let duration = start_time.elapsed();
        let status = response.status().code;

        span.record("http.status_code", status);
        span.record("http.duration_ms", duration.as_millis() as i64);

        let _entered = span.enter();
        tracing::info!(
            status,
            duration_ms = duration.as_millis() as u64,
            "Completed {} {}",
            request.method(),
            request.uri().path()
        );
    }
}

fn resource() -> Resource {
    let environment = if cfg!(debug_assertions) {
        "develop"
    } else {
        "production"
    };

    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn init_tracer_provider(api_key: &str) -> anyhow::Result<SdkTracerProvider> {
    let mut metadata = MetadataMap::new();
    metadata.insert("x-honeycomb-team", MetadataValue::try_from(api_key)?);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(HONEYCOMB_ENDPOINT)
        .with_tls_config(tonic::transport::ClientTlsConfig::new().with_native_roots())
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build())
}

/// Flushes and shuts the exporter down when dropped.
pub struct OtelGuard {
    tracer_provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shut down tracer provider: {:?}", err);
        }
    }
}

/// Installs the global subscriber: `RUST_LOG` filter (default `info`) and the
/// fmt layer, plus span export to Honeycomb when `HONEYCOMB_API_KEY` is set.
/// Keep the returned guard alive for the life of the process.
pub fn init_tracing() -> anyhow::Result<Option<OtelGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let api_key = dotenvy::var("HONEYCOMB_API_KEY")
        .ok()
        .filter(|key| !key.trim().is_empty());

    match api_key {
        Some(api_key) => {
            let tracer_provider = init_tracer_provider(&api_key)?;
            let tracer = tracer_provider.tracer(env!("CARGO_PKG_NAME"));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(OpenTelemetryLayer::new(tracer))
                .try_init()?;

            tracing::info!("Exporting traces to Honeycomb");
            Ok(Some(OtelGuard { tracer_provider }))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;

            tracing::debug!("HONEYCOMB_API_KEY not set, trace export disabled");
            Ok(None)
        }
    }
}
