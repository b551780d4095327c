use axum::Json;
use serde::Serialize;

use crate::utils::{ApiResponse, success_to_api_response};

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub service: &'static str,
    pub status: &'static str,
}

pub async fn root() -> Json<ApiResponse<ServiceStatus>> {
    success_to_api_response(ServiceStatus {
        service: "otters alarm service",
        status: "running",
    })
}

pub async fn health() -> Json<ApiResponse<ServiceStatus>> {
    success_to_api_response(ServiceStatus {
        service: "alarm",
        status: "healthy",
    })
}
