#![allow(unused)]

use actix_http::{body::MessageBody, header::AUTHORIZATION, Method, Request};
use actix_web::{
    dev::{Service, ServiceResponse},
    test::{call_service, read_body_json, TestRequest},
};
use anyhow::Result;
use card_gateway::Sandbox;
use eventfund::{auth::JwtToken, setting::Setting, AppState};
use migration::{Migrator, MigratorTrait};
use serde_json::Value;
use tempfile::{Builder, TempDir};

pub const SECRET: &str = "test";

/// App state on the sandbox processor and a fresh in-memory database.
pub async fn create_test_state() -> Result<(AppState, Sandbox)> {
    create_test_state_with(Setting::default()).await
}

pub async fn create_test_state_with(mut setting: Setting) -> Result<(AppState, Sandbox)> {
    setting.db_url = "sqlite::memory:".to_owned();
    build_state(setting).await
}

/// App state on a sqlite file, the pool opens several connections so
/// transactions really overlap. The database lives as long as the dir.
pub async fn create_file_test_state() -> Result<(AppState, Sandbox, TempDir)> {
    let dir = Builder::new().prefix("eventfund-test").tempdir()?;
    let mut setting = Setting::default();
    setting.db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("eventfund.sqlite").display()
    );
    let (state, sandbox) = build_state(setting).await?;
    Ok((state, sandbox, dir))
}

async fn build_state(mut setting: Setting) -> Result<(AppState, Sandbox)> {
    setting.auth.secret = SECRET.to_owned();
    let sandbox = Sandbox::new();
    let state =
        AppState::with_processor(setting, Box::new(sandbox.clone()), Box::new(sandbox.clone()))
            .await?;
    Migrator::fresh(state.service.db()).await?;
    Ok((state, sandbox))
}

pub fn token(username: &str) -> Result<String> {
    Ok(JwtToken::generate(username, 3600, SECRET.as_bytes())?)
}

pub fn auth_get(path: &str, token: &String) -> TestRequest {
    TestRequest::with_uri(path).insert_header((AUTHORIZATION, format!("Bearer {}", token)))
}

pub fn get(path: &str) -> TestRequest {
    TestRequest::with_uri(path)
}

pub fn auth_post(path: &str, token: &String, data: Value) -> TestRequest {
    TestRequest::with_uri(path)
        .method(Method::POST)
        .set_json(data)
        .insert_header((AUTHORIZATION, format!("Bearer {}", token)))
}

pub fn post(path: &str, data: Value) -> TestRequest {
    TestRequest::with_uri(path)
        .method(Method::POST)
        .set_json(data)
}

pub async fn json<B>(res: ServiceResponse<B>) -> Value
where
    B: MessageBody,
{
    assert_eq!(
        res.headers().get(actix_http::header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    read_body_json::<Value, _>(res).await
}

/// Send a request, returning the json body and status code.
pub async fn call<S, B>(req: TestRequest, app: &S) -> (Value, u16)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let res = call_service(app, req.to_request()).await;
    let status = res.status().as_u16();
    (json(res).await, status)
}
