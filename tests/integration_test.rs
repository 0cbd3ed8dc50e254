// tests/integration_test.rs
#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test, App, ResponseError};
    use billing_manager::api::routes;
    use billing_manager::error::BillingError;

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test::init_service(App::new().configure(routes::configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/health")
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "billing-manager");
    }

    #[actix_web::test]
    async fn test_unknown_route_is_404() {
        let app = test::init_service(App::new().configure(routes::configure)).await;

        let req = test::TestRequest::get()
            .uri("/api/v1/nope")
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 404);
    }

    #[actix_web::test]
    async fn test_error_status_codes() {
        assert_eq!(BillingError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(BillingError::Duplicate.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            BillingError::InsufficientBalance {
                required: 100,
                available: 10
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            BillingError::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BillingError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_error_body_hides_internal_detail() {
        let resp = BillingError::Internal("connection refused to 10.0.0.5".to_string())
            .error_response();
        let body = actix_web::body::to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal_error");
        assert_eq!(json["message"], "internal error");
    }
}
