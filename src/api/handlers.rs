// src/api/handlers.rs
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    BalanceRequest, CreateAccountRequest, HealthResponse, ListQuery, TokensRequest,
    UpdateAccountRequest, UpdatePaymentRequest, UpdatePlanRequest, ValidBalanceRequest,
    ValidBalanceResponse, ValidResourceLimitRequest, ValidResourceLimitResponse,
};
use crate::services::{AccountService, AllowanceEngine, BillingService};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 500;

fn page_limit(query: &ListQuery) -> i64 {
    query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

fn page_token(query: &ListQuery) -> Result<Option<DateTime<Utc>>, BillingError> {
    match &query.token {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| BillingError::Validation("invalid page token".to_string())),
    }
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: "billing-manager".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ==================== Accounts ====================

pub async fn create_account(
    req: web::Json<CreateAccountRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts
        .create(
            req.customer_id,
            &req.name,
            &req.detail,
            req.plan_type.unwrap_or(crate::models::PlanType::Free),
            req.payment_type.unwrap_or(crate::models::PaymentType::None),
            req.payment_method
                .unwrap_or(crate::models::PaymentMethod::None),
        )
        .await?;
    Ok(HttpResponse::Created().json(account))
}

pub async fn get_account(
    path: web::Path<Uuid>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts.get(&path).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn get_account_by_customer(
    path: web::Path<Uuid>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts.get_by_customer_id(&path).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn list_accounts(
    query: web::Query<ListQuery>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let token = page_token(&query)?;
    let result = accounts.list(page_limit(&query), token).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn update_account(
    path: web::Path<Uuid>,
    req: web::Json<UpdateAccountRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts.update_info(&path, &req.name, &req.detail).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn update_account_plan(
    path: web::Path<Uuid>,
    req: web::Json<UpdatePlanRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts.update_plan(&path, req.plan_type).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn update_account_payment(
    path: web::Path<Uuid>,
    req: web::Json<UpdatePaymentRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts
        .update_payment(&path, req.payment_type, req.payment_method)
        .await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn delete_account(
    path: web::Path<Uuid>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let account = accounts.delete(&path).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn is_valid_resource_limit(
    path: web::Path<Uuid>,
    req: web::Json<ValidResourceLimitRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let valid = accounts
        .is_valid_resource_limit(&path, req.resource_type)
        .await?;
    Ok(HttpResponse::Ok().json(ValidResourceLimitResponse { valid }))
}

pub async fn add_balance(
    path: web::Path<Uuid>,
    req: web::Json<BalanceRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let (account, _) = accounts.add_balance(&path, req.amount).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn subtract_balance(
    path: web::Path<Uuid>,
    req: web::Json<BalanceRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let (account, _) = accounts.subtract_balance(&path, req.amount).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn add_account_tokens(
    path: web::Path<Uuid>,
    req: web::Json<TokensRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let (account, _) = accounts.add_tokens(&path, req.amount).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn subtract_account_tokens(
    path: web::Path<Uuid>,
    req: web::Json<TokensRequest>,
    accounts: web::Data<Arc<AccountService>>,
) -> Result<HttpResponse, BillingError> {
    let (account, _) = accounts.subtract_tokens(&path, req.amount).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn is_valid_balance(
    path: web::Path<Uuid>,
    req: web::Json<ValidBalanceRequest>,
    billing: web::Data<Arc<BillingService>>,
) -> Result<HttpResponse, BillingError> {
    let valid = billing
        .is_valid_balance(&path, req.reference_type, req.count)
        .await?;
    Ok(HttpResponse::Ok().json(ValidBalanceResponse { valid }))
}

// ==================== Allowances ====================

pub async fn get_allowance(
    path: web::Path<Uuid>,
    allowances: web::Data<Arc<AllowanceEngine>>,
) -> Result<HttpResponse, BillingError> {
    let allowance = allowances.get(&path).await?;
    Ok(HttpResponse::Ok().json(allowance))
}

pub async fn get_current_allowance(
    path: web::Path<Uuid>,
    allowances: web::Data<Arc<AllowanceEngine>>,
) -> Result<HttpResponse, BillingError> {
    let allowance = allowances.get_current(&path).await?;
    Ok(HttpResponse::Ok().json(allowance))
}

pub async fn list_allowances(
    path: web::Path<Uuid>,
    query: web::Query<ListQuery>,
    allowances: web::Data<Arc<AllowanceEngine>>,
) -> Result<HttpResponse, BillingError> {
    let token = page_token(&query)?;
    let result = allowances.list(&path, page_limit(&query), token).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn add_allowance_tokens(
    path: web::Path<Uuid>,
    req: web::Json<TokensRequest>,
    allowances: web::Data<Arc<AllowanceEngine>>,
) -> Result<HttpResponse, BillingError> {
    let allowance = allowances.add_tokens(&path, req.amount).await?;
    Ok(HttpResponse::Ok().json(allowance))
}

pub async fn subtract_allowance_tokens(
    path: web::Path<Uuid>,
    req: web::Json<TokensRequest>,
    allowances: web::Data<Arc<AllowanceEngine>>,
) -> Result<HttpResponse, BillingError> {
    let allowance = allowances.subtract_tokens(&path, req.amount).await?;
    Ok(HttpResponse::Ok().json(allowance))
}

// ==================== Billings ====================

pub async fn get_billing(
    path: web::Path<Uuid>,
    billing: web::Data<Arc<BillingService>>,
) -> Result<HttpResponse, BillingError> {
    let result = billing.get(&path).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn list_billings(
    query: web::Query<ListQuery>,
    billing: web::Data<Arc<BillingService>>,
) -> Result<HttpResponse, BillingError> {
    let token = page_token(&query)?;
    let result = billing
        .list(query.customer_id, query.account_id, page_limit(&query), token)
        .await?;
    Ok(HttpResponse::Ok().json(result))
}

// ==================== Events ====================

/// Inbound event ingestion. Always 202: failures are captured by the
/// durability layer and retried, never bounced to the publisher.
pub async fn receive_event(
    req: web::Json<crate::events::Event>,
    handler: web::Data<Arc<crate::events::EventHandler>>,
) -> Result<HttpResponse, BillingError> {
    handler.handle(&req).await;
    Ok(HttpResponse::Accepted().finish())
}
