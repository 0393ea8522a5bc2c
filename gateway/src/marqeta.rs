//! marqeta core api v3, card issuance

use crate::{check_status, processor::*, Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct Marqeta {
    client: Client,
    url: String,
    username: String,
    password: String,
    card_product_token: String,
}

#[derive(Deserialize)]
struct UserRes {
    token: String,
}

#[derive(Deserialize)]
struct CardRes {
    token: String,
    pan: Option<String>,
    cvv_number: Option<String>,
    expiration: Option<String>,
}

impl Marqeta {
    pub fn connect(
        url: String,
        username: String,
        password: String,
        card_product_token: String,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url: url.trim_end_matches('/').to_owned(),
            username,
            password,
            card_product_token,
        })
    }

    async fn create_user(&self, label: &str) -> Result<String> {
        let res = self
            .client
            .post(format!("{}/users", self.url))
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "first_name": "Event",
                "last_name": label,
            }))
            .send()
            .await?;
        let user: UserRes = check_status(res).await?.json().await?;
        Ok(user.token)
    }
}

#[async_trait::async_trait]
impl CardIssuer for Marqeta {
    fn name(&self) -> &str {
        "marqeta"
    }

    async fn issue_card(&self, label: &str) -> Result<IssuedCard> {
        let user_token = self.create_user(label).await?;
        let res = self
            .client
            .post(format!(
                "{}/cards?show_cvv_number=true&show_pan=true",
                self.url
            ))
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "user_token": user_token,
                "card_product_token": self.card_product_token,
            }))
            .send()
            .await?;
        let card: CardRes = check_status(res).await?.json().await?;
        debug!(token = card.token, "marqeta card created");

        Ok(IssuedCard {
            number: card
                .pan
                .ok_or_else(|| Error::Invalid("missing pan".to_owned()))?,
            cvv: card
                .cvv_number
                .ok_or_else(|| Error::Invalid("missing cvv".to_owned()))?,
            expiration: card
                .expiration
                .ok_or_else(|| Error::Invalid("missing expiration".to_owned()))?,
            token: card.token,
        })
    }
}
