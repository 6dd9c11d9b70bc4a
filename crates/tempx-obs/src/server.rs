//! Health and metrics endpoint

use crate::{ObsResult, Telemetry};
use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, StatusCode},
    routing::get,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::net::TcpListener;

pub struct HealthState {
    ready: AtomicBool,
    telemetry: Telemetry,
}

impl HealthState {
    pub fn new(telemetry: Telemetry) -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(false),
            telemetry,
        })
    }

    pub fn set_ready(&self, is_ready: bool) {
        self.ready.store(is_ready, Ordering::Relaxed);
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the router on `bind` until `shutdown` resolves
pub async fn serve<F>(bind: SocketAddr, state: Arc<HealthState>, shutdown: F) -> ObsResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "Metrics server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn readyz(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> ([(HeaderName, HeaderValue); 1], String) {
    let header = (
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    ([header], state.telemetry.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_path(app: &Router, uri: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn health_ready_metrics_endpoints() {
        let telemetry = Telemetry::new().unwrap();
        let counter = telemetry
            .meter("test")
            .u64_counter("tempx_datapoints_uploaded_total")
            .init();
        counter.add(5, &[]);

        let state = HealthState::new(telemetry);
        let app = router(Arc::clone(&state));

        assert_eq!(get_path(&app, "/healthz").await.status(), StatusCode::OK);
        assert_eq!(
            get_path(&app, "/readyz").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.set_ready(true);
        assert_eq!(get_path(&app, "/readyz").await.status(), StatusCode::OK);

        let res = get_path(&app, "/metrics").await;
        assert_eq!(res.status(), StatusCode::OK);
        let ct = res.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(ct.starts_with("text/plain"));
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("tempx_datapoints_uploaded"));
    }
}
