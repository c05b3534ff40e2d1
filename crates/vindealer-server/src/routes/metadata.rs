use crate::state::AppState;
use axum::{
    extract::State,
    response::{Html, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use vindealer::providers::configs::ProviderId;
use vindealer::providers::factory::ProviderDescriptor;

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersResponse {
    default_provider: ProviderId,
    providers: Vec<ProviderDescriptor>,
}

async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        default_provider: ProviderId::default(),
        providers: state.gateway.descriptors(),
    })
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/providers", get(list_providers))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::{nhtsa_server, state_with, ScriptedProvider};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_metadata_endpoints() {
        let nhtsa = nhtsa_server().await;
        let app = routes(state_with(Arc::new(ScriptedProvider::new(vec![])), &nhtsa));

        let (status, body) = get_body(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({"status": "ok"}));

        let (status, body) = get_body(app.clone(), "/api/providers").await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["defaultProvider"], "gemini");
        assert_eq!(
            value["providers"],
            json!([{"id": "gemini", "name": "Gemini 1.5 Pro", "model": "scripted"}])
        );

        let (status, body) = get_body(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("/api/chat"));
        assert!(page.contains("/api/providers"));
    }
}
