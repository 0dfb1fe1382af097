//! Control plane backed by the remote vLLM control API

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument};

use super::ControlPlane;
use crate::runtime::{LifecycleAction, RuntimeKey};
use crate::Error;

const ADAPTER: &str = "http";

#[derive(Serialize)]
struct ActionRequest<'a> {
    model: &'a str,
}

/// Calls `POST {endpoint}/v1/{action}` with `{"model": ...}`
#[derive(Clone, Debug)]
pub struct HttpControlPlane {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpControlPlane {
    /// Create an adapter for the control API at `endpoint`
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create an adapter reusing an existing HTTP client
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL of the control API
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, action: LifecycleAction, key: &RuntimeKey) -> Result<(), Error> {
        let url = format!("{}/v1/{}", self.endpoint, action);
        debug!(url = %url, model = %key.model, "calling control API");

        let response = self
            .client
            .post(&url)
            .json(&ActionRequest { model: &key.model })
            .send()
            .await
            .map_err(|e| Error::adapter_with_source(ADAPTER, format!("POST {url} failed"), e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::not_found(&key.runtime_name, &key.namespace));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::adapter(
                ADAPTER,
                format!("POST {url} returned {status}: {body}"),
            ));
        }

        info!(%action, model = %key.model, "control API accepted request");
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn start(&self, key: &RuntimeKey) -> Result<(), Error> {
        self.call(LifecycleAction::Start, key).await
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn stop(&self, key: &RuntimeKey) -> Result<(), Error> {
        self.call(LifecycleAction::Stop, key).await
    }

    #[instrument(skip(self, key), fields(key = %key))]
    async fn update(&self, key: &RuntimeKey) -> Result<(), Error> {
        self.call(LifecycleAction::Update, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    type Captured = Arc<Mutex<Vec<(String, Value)>>>;

    /// Spawn a control API answering every call with `status`
    async fn control_api(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();

        let app = Router::new()
            .route(
                "/v1/:action",
                post(
                    move |State(seen): State<Captured>,
                          Path(action): Path<String>,
                          Json(body): Json<Value>| async move {
                        seen.lock().unwrap().push((action, body));
                        status
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), captured)
    }

    fn key() -> RuntimeKey {
        RuntimeKey::new("ns1", "rt1", "llama")
    }

    #[tokio::test]
    async fn posts_model_to_action_path() {
        let (endpoint, captured) = control_api(StatusCode::OK).await;
        let cp = HttpControlPlane::new(format!("{endpoint}/"));

        cp.start(&key()).await.unwrap();
        cp.stop(&key()).await.unwrap();
        cp.update(&key()).await.unwrap();

        let calls = captured.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("start".to_string(), json!({"model": "llama"})),
                ("stop".to_string(), json!({"model": "llama"})),
                ("update".to_string(), json!({"model": "llama"})),
            ]
        );
    }

    #[tokio::test]
    async fn not_found_response_maps_to_not_found() {
        let (endpoint, _) = control_api(StatusCode::NOT_FOUND).await;
        let err = HttpControlPlane::new(endpoint)
            .stop(&key())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn server_error_maps_to_adapter_error() {
        let (endpoint, _) = control_api(StatusCode::INTERNAL_SERVER_ERROR).await;
        let err = HttpControlPlane::new(endpoint)
            .start(&key())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Adapter { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn transport_failure_preserves_cause() {
        use std::error::Error as _;

        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpControlPlane::new(format!("http://{addr}"))
            .start(&key())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Adapter { .. }));
        assert!(err.source().is_some());
    }
}
