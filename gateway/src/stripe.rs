//! stripe payment intents api

use crate::{check_status, processor::*, Result};
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};

#[derive(Clone, Debug)]
pub struct Stripe {
    client: Client,
    url: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct LastError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntent {
    id: String,
    amount: i64,
    status: String,
    created: u64,
    client_secret: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    last_payment_error: Option<LastError>,
}

#[derive(Deserialize)]
struct PaymentIntentList {
    data: Vec<PaymentIntent>,
    has_more: bool,
}

impl From<PaymentIntent> for Charge {
    fn from(pi: PaymentIntent) -> Self {
        let status = match pi.status.as_str() {
            "succeeded" => ChargeStatus::Succeeded,
            "canceled" => ChargeStatus::Failed,
            // a declined attempt returns the intent to requires_payment_method
            "requires_payment_method" if pi.last_payment_error.is_some() => ChargeStatus::Failed,
            _ => ChargeStatus::Pending,
        };
        Self {
            reference: pi.id,
            amount: pi.amount,
            status,
            created_at: pi.created,
            event_id: pi.metadata.get("event_id").and_then(|s| s.parse().ok()),
            username: pi.metadata.get("username").cloned(),
            message: pi.last_payment_error.and_then(|e| e.message),
        }
    }
}

impl Stripe {
    pub fn connect(url: String, secret_key: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            url: url.trim_end_matches('/').to_owned(),
            secret_key,
        })
    }

    async fn post(&self, path: &str, form: &[(&str, String)]) -> Result<PaymentIntent> {
        let res = self
            .client
            .post(format!("{}{}", self.url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }
}

#[async_trait::async_trait]
impl Charges for Stripe {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn prepare(&self, req: ChargeRequest) -> Result<PreparedCharge> {
        let pi = self
            .post(
                "/v1/payment_intents",
                &[
                    ("amount", req.amount.to_string()),
                    ("currency", req.currency),
                    ("metadata[event_id]", req.event_id.to_string()),
                    ("metadata[username]", req.username),
                    ("payment_method_types[]", "card".to_owned()),
                ],
            )
            .await?;
        Ok(PreparedCharge {
            client_secret: pi.client_secret.unwrap_or_default(),
            reference: pi.id,
        })
    }

    async fn confirm(&self, reference: &str, payment_method: &str) -> Result<Charge> {
        let pi = self
            .post(
                &format!("/v1/payment_intents/{}/confirm", reference),
                &[("payment_method", payment_method.to_owned())],
            )
            .await?;
        Ok(pi.into())
    }

    async fn lookup(&self, reference: &str) -> Result<Charge> {
        let res = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let pi: PaymentIntent = check_status(res).await?.json().await?;
        Ok(pi.into())
    }

    async fn list(&self, from_time: u64) -> Result<Vec<Charge>> {
        let mut charges = vec![];
        let mut starting_after: Option<String> = None;
        loop {
            let mut query = vec![
                ("created[gte]", from_time.to_string()),
                ("limit", "100".to_owned()),
            ];
            if let Some(after) = &starting_after {
                query.push(("starting_after", after.clone()));
            }
            let res = self
                .client
                .get(format!("{}/v1/payment_intents", self.url))
                .bearer_auth(&self.secret_key)
                .query(&query)
                .send()
                .await?;
            let page: PaymentIntentList = check_status(res).await?.json().await?;
            starting_after = page.data.last().map(|pi| pi.id.clone());
            charges.extend(page.data.into_iter().map(Charge::from));
            if !page.has_more || starting_after.is_none() {
                break;
            }
        }
        Ok(charges)
    }

    async fn cancel(&self, reference: &str) -> Result<Charge> {
        match self
            .post(&format!("/v1/payment_intents/{}/cancel", reference), &[])
            .await
        {
            Ok(pi) => Ok(pi.into()),
            // a succeeded intent can't be canceled, report what the processor has
            Err(crate::Error::Rejected(_)) => self.lookup(reference).await,
            Err(e) => Err(e),
        }
    }
}
