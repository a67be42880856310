use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::services::AppServices;

pub async fn healthcheck(Extension(services): Extension<Arc<AppServices>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "available",
        "system_info": {
            "environment": services.environment,
            "version": env!("CARGO_PKG_VERSION"),
        },
    }))
}
