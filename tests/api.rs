use actix_rt::time::sleep;
use actix_web::{test::init_service, web};
use anyhow::Result;
use card_gateway::sandbox::{PM_DECLINE, PM_SUCCEED};
use eventfund::create_web_app;
use serde_json::json;
use std::time::Duration;
use util::{auth_get, auth_post, call, create_test_state, get, post, token};

mod util;

#[actix_rt::test]
async fn info() -> Result<()> {
    let (state, _) = create_test_state().await?;
    let app = init_service(create_web_app(web::Data::new(state))).await;
    sleep(Duration::from_millis(50)).await;

    let (val, status) = call(get("/v1/info"), &app).await;
    assert_eq!(status, 200);
    assert!(val["version"].is_string());
    assert_eq!(val["processor"]["issuer"], json!("sandbox"));
    assert_eq!(val["fee"]["contribution_pct"], json!(1.0));
    Ok(())
}

#[actix_rt::test]
async fn auth() -> Result<()> {
    let (state, _) = create_test_state().await?;
    let app = init_service(create_web_app(web::Data::new(state))).await;

    let (val, status) = call(post("/v1/events", json!({})), &app).await;
    assert_eq!(status, 401);
    assert_eq!(val["code"], json!("unauthorized"));

    let bad = "not.a.token".to_owned();
    let (_, status) = call(auth_post("/v1/events", &bad, json!({})), &app).await;
    assert_eq!(status, 401);

    let forged = eventfund::auth::JwtToken::generate("alice", 3600, b"other")?;
    let (_, status) = call(auth_get("/v1/events/123456/card", &forged), &app).await;
    assert_eq!(status, 401);
    Ok(())
}

#[actix_rt::test]
async fn contribution_flow() -> Result<()> {
    let (state, sandbox) = create_test_state().await?;
    let app = init_service(create_web_app(web::Data::new(state))).await;
    let host = token("hana")?;
    let alice = token("alice")?;
    let bob = token("bob")?;

    let (val, status) = call(auth_post("/v1/events", &host, json!({})), &app).await;
    assert_eq!(status, 200);
    assert_eq!(val["event"]["host"], json!("hana"));
    let id = val["event"]["id"].as_i64().unwrap();

    let join = format!("/v1/events/{}/join", id);
    let (val, _) = call(auth_post(&join, &alice, json!({})), &app).await;
    assert_eq!(val["joined"], json!(true));
    let (val, _) = call(auth_post(&join, &alice, json!({})), &app).await;
    assert_eq!(val["joined"], json!(false));

    let card_path = format!("/v1/events/{}/card", id);

    // members can't issue the card
    let (val, status) = call(auth_post(&card_path, &alice, json!({})), &app).await;
    assert_eq!(status, 401);
    assert_eq!(val["code"], json!("unauthorized"));
    let (val, status) = call(auth_get(&card_path, &alice), &app).await;
    assert_eq!(status, 404);
    assert_eq!(val["code"], json!("not_found"));

    let (val, status) = call(auth_post(&card_path, &host, json!({})), &app).await;
    assert_eq!(status, 200);
    assert_eq!(val["created"], json!(true));
    assert_eq!(val["card"]["balance"], json!(0));
    assert!(val["card"]["card_number"].is_string());
    let number = val["card"]["card_number"].clone();

    let (val, _) = call(auth_post(&card_path, &host, json!({})), &app).await;
    assert_eq!(val["created"], json!(false));
    assert_eq!(val["card"]["card_number"], number);
    assert_eq!(sandbox.issued(), 1);

    // redacted for alice
    let (val, status) = call(auth_get(&card_path, &alice), &app).await;
    assert_eq!(status, 200);
    assert_eq!(val["card"]["can_view_secrets"], json!(false));
    assert!(val["card"].get("card_number").is_none());
    assert!(val["card"].get("cvv").is_none());

    // outsiders see nothing
    let (val, status) = call(auth_get(&card_path, &bob), &app).await;
    assert_eq!(status, 403);
    assert_eq!(val["code"], json!("not_a_member"));

    let contributions = format!("/v1/events/{}/contributions", id);
    let (val, status) = call(auth_post(&contributions, &alice, json!({"amount": 0})), &app).await;
    assert_eq!(status, 400);
    assert_eq!(val["code"], json!("invalid_amount"));

    // amount as a string is accepted
    let (val, status) =
        call(auth_post(&contributions, &alice, json!({"amount": "2000"})), &app).await;
    assert_eq!(status, 200);
    assert_eq!(val["amount"], json!(2000));
    assert_eq!(val["fee"], json!(20));
    assert_eq!(val["net_amount"], json!(1980));
    assert_eq!(val["fee_pct"], json!(1.0));
    let reference = val["reference"].as_str().unwrap().to_owned();
    assert!(val["client_secret"]
        .as_str()
        .unwrap()
        .starts_with(&reference));

    let confirm = format!("/v1/events/{}/contributions/confirm", id);
    // not authorized yet
    let (val, status) = call(
        auth_post(&confirm, &alice, json!({"reference": reference, "amount": 2000})),
        &app,
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(val["code"], json!("contribution_pending"));

    let authorize = format!("/v1/contributions/{}/authorize", reference);
    let (val, status) = call(
        auth_post(&authorize, &alice, json!({"payment_method": PM_SUCCEED})),
        &app,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(val["status"], json!("committed"));
    assert_eq!(val["card"]["balance"], json!(1980));
    assert_eq!(val["card"]["can_view_secrets"], json!(true));
    assert_eq!(val["card"]["card_number"], number);

    // duplicate deliveries
    for _ in 0..2 {
        let (val, status) = call(
            auth_post(&confirm, &alice, json!({"reference": reference, "amount": 2000})),
            &app,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(val["card"]["balance"], json!(1980));
        assert_eq!(val["card"]["contribution_count"], json!(1));

        let (val, status) = call(post("/v1/webhook", json!({"reference": reference})), &app).await;
        assert_eq!(status, 200);
        assert_eq!(val["credited"], json!(false));
    }

    let (val, status) = call(
        auth_post(&confirm, &alice, json!({"reference": reference, "amount": 1})),
        &app,
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(val["code"], json!("amount_mismatch"));

    let (val, status) = call(
        auth_post(&confirm, &alice, json!({"reference": "pi_missing", "amount": 2000})),
        &app,
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(val["code"], json!("unknown_reference"));

    let (val, _) = call(auth_get(&card_path, &host), &app).await;
    let history = val["card"]["contributions"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["username"], json!("alice"));
    assert_eq!(history[0]["amount"], json!(2000));
    Ok(())
}

#[actix_rt::test]
async fn declined_and_unavailable() -> Result<()> {
    let (state, sandbox) = create_test_state().await?;
    let app = init_service(create_web_app(web::Data::new(state))).await;
    let host = token("hana")?;

    let (val, _) = call(auth_post("/v1/events", &host, json!({})), &app).await;
    let id = val["event"]["id"].as_i64().unwrap();
    call(auth_post(&format!("/v1/events/{}/card", id), &host, json!({})), &app).await;

    let contributions = format!("/v1/events/{}/contributions", id);
    let (val, _) = call(auth_post(&contributions, &host, json!({"amount": 500})), &app).await;
    let reference = val["reference"].as_str().unwrap().to_owned();
    let authorize = format!("/v1/contributions/{}/authorize", reference);

    sandbox.set_down(true);
    let (val, status) = call(
        auth_post(&authorize, &host, json!({"payment_method": PM_SUCCEED})),
        &app,
    )
    .await;
    assert_eq!(status, 503);
    assert_eq!(val["code"], json!("gateway_unavailable"));

    sandbox.set_down(false);
    let (val, status) = call(
        auth_post(&authorize, &host, json!({"payment_method": PM_DECLINE})),
        &app,
    )
    .await;
    assert_eq!(status, 402);
    assert_eq!(val["code"], json!("contribution_failed"));

    let (val, status) = call(post("/v1/webhook", json!({"reference": reference})), &app).await;
    assert_eq!(status, 402);
    assert_eq!(val["code"], json!("contribution_failed"));

    let (val, status) = call(post("/v1/webhook", json!({"reference": "pi_missing"})), &app).await;
    assert_eq!(status, 404);
    assert_eq!(val["code"], json!("unknown_reference"));
    Ok(())
}
