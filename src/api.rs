//! http api

use crate::{auth::AuthedUser, ledger::Source, AppState, Error, Result};
use actix_web::{get, post, web, HttpResponse, Responder, Scope};
use serde::{Deserialize, Serialize};
use serde_aux::prelude::deserialize_number_from_string;
use serde_json::json;
pub const CARGO_PKG_VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

fn version() -> String {
    CARGO_PKG_VERSION.map(ToOwned::to_owned).unwrap_or_default()
}

pub fn scope() -> Scope {
    web::scope("/v1")
        .service(info)
        .service(create_event)
        .service(join_event)
        .service(create_card)
        .service(get_card)
        .service(initiate_contribution)
        .service(authorize_contribution)
        .service(confirm_contribution)
        .service(webhook)
}

#[get("/info")]
pub async fn info(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(json!({
        "version": version(),
        "processor": {
            "issuer": state.service.issuer().name(),
            "charges": state.service.charges().name(),
        },
        "fee": state.setting.fee,
    })))
}

#[post("/events")]
pub async fn create_event(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> Result<impl Responder, Error> {
    let event = state.service.create_event(&user.username).await?;
    Ok(web::Json(json!({
        "event": {
            "id": event.id,
            "host": event.host,
            "created_at": event.created_at,
        }
    })))
}

#[post("/events/{id}/join")]
pub async fn join_event(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let joined = state
        .service
        .join_event(path.into_inner(), &user.username)
        .await?;
    Ok(web::Json(json!({ "joined": joined })))
}

/// Issue the event card, or return the existing one.
#[post("/events/{id}/card")]
pub async fn create_card(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let event_id = path.into_inner();
    let created = state
        .service
        .get_or_create_card(event_id, &user.username)
        .await?;
    let card = state.service.get_card(event_id, &user.username).await?;
    Ok(web::Json(json!({
        "created": created.created,
        "card": card,
    })))
}

#[get("/events/{id}/card")]
pub async fn get_card(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
) -> Result<impl Responder, Error> {
    let card = state
        .service
        .get_card(path.into_inner(), &user.username)
        .await?;
    Ok(web::Json(json!({ "card": card })))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateReq {
    /// gross amount in cents
    #[serde(deserialize_with = "deserialize_number_from_string")]
    amount: i64,
}

#[post("/events/{id}/contributions")]
pub async fn initiate_contribution(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
    data: web::Json<InitiateReq>,
) -> Result<impl Responder, Error> {
    let fee = &state.setting.fee;
    let initiated = state
        .service
        .initiate_contribution(path.into_inner(), &user.username, data.amount, fee)
        .await?;
    let c = &initiated.contribution;
    Ok(web::Json(json!({
        "contribution_id": c.id,
        "reference": c.reference,
        "client_secret": initiated.client_secret,
        "amount": c.gross_amount,
        "fee": initiated.fee,
        "net_amount": initiated.net_amount,
        "fee_pct": c.fee_bps as f64 / 100.0,
        "currency": fee.currency,
    })))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeReq {
    payment_method: String,
}

#[post("/contributions/{reference}/authorize")]
pub async fn authorize_contribution(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<String>,
    data: web::Json<AuthorizeReq>,
) -> Result<impl Responder, Error> {
    let commit = state
        .service
        .authorize_contribution(&path, &user.username, &data.payment_method)
        .await?;
    let card = state
        .service
        .get_card(commit.contribution.event_id, &user.username)
        .await?;
    Ok(web::Json(json!({
        "status": "committed",
        "reference": commit.contribution.reference,
        "card": card,
    })))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmReq {
    reference: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    amount: i64,
}

/// Client reported success. Safe to repeat.
#[post("/events/{id}/contributions/confirm")]
pub async fn confirm_contribution(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
    data: web::Json<ConfirmReq>,
) -> Result<impl Responder, Error> {
    let event_id = path.into_inner();
    let commit = state
        .service
        .confirm_contribution(
            &data.reference,
            event_id,
            &user.username,
            data.amount,
            Source::Client,
        )
        .await?;
    let card = state.service.get_card(event_id, &user.username).await?;
    Ok(web::Json(json!({
        "status": "committed",
        "reference": commit.contribution.reference,
        "card": card,
    })))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookReq {
    reference: String,
}

/// Processor notification. Only the reference is read, the outcome comes
/// from the processor.
#[post("/webhook")]
pub async fn webhook(
    state: web::Data<AppState>,
    data: web::Json<WebhookReq>,
) -> Result<impl Responder, Error> {
    let commit = state.service.handle_notification(&data.reference).await?;
    Ok(web::Json(json!({
        "status": "committed",
        "reference": commit.contribution.reference,
        "credited": commit.credited,
    })))
}
