// src/api/routes.rs
use actix_web::web;

use crate::api::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .route("/accounts", web::post().to(handlers::create_account))
            .route("/accounts", web::get().to(handlers::list_accounts))
            .route("/accounts/{id}", web::get().to(handlers::get_account))
            .route("/accounts/{id}", web::put().to(handlers::update_account))
            .route("/accounts/{id}", web::delete().to(handlers::delete_account))
            .route(
                "/accounts/{id}/plan",
                web::put().to(handlers::update_account_plan),
            )
            .route(
                "/accounts/{id}/payment",
                web::put().to(handlers::update_account_payment),
            )
            .route(
                "/accounts/customer/{customer_id}",
                web::get().to(handlers::get_account_by_customer),
            )
            .route(
                "/accounts/{id}/balance/add",
                web::post().to(handlers::add_balance),
            )
            .route(
                "/accounts/{id}/balance/subtract",
                web::post().to(handlers::subtract_balance),
            )
            .route(
                "/accounts/{id}/tokens/add",
                web::post().to(handlers::add_account_tokens),
            )
            .route(
                "/accounts/{id}/tokens/subtract",
                web::post().to(handlers::subtract_account_tokens),
            )
            .route(
                "/accounts/{id}/is_valid_balance",
                web::post().to(handlers::is_valid_balance),
            )
            .route(
                "/accounts/{id}/is_valid_resource_limit",
                web::post().to(handlers::is_valid_resource_limit),
            )
            .route(
                "/accounts/{id}/allowance",
                web::get().to(handlers::get_current_allowance),
            )
            .route(
                "/accounts/{id}/allowances",
                web::get().to(handlers::list_allowances),
            )
            .route("/allowances/{id}", web::get().to(handlers::get_allowance))
            .route(
                "/allowances/{id}/tokens/add",
                web::post().to(handlers::add_allowance_tokens),
            )
            .route(
                "/allowances/{id}/tokens/subtract",
                web::post().to(handlers::subtract_allowance_tokens),
            )
            .route("/billings", web::get().to(handlers::list_billings))
            .route("/billings/{id}", web::get().to(handlers::get_billing))
            .route("/events", web::post().to(handlers::receive_event)),
    );
}
