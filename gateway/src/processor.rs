use crate::Result;
use serde::{Deserialize, Serialize};

/// Virtual card minted by an issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedCard {
    /// processor card token
    pub token: String,
    /// primary account number
    pub number: String,
    /// MMYY
    pub expiration: String,
    pub cvv: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// created or in flight, the final outcome is not known yet
    Pending,
    Succeeded,
    Failed,
}

/// Charge as seen by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// processor reference, unique per charge
    pub reference: String,
    /// minor units
    pub amount: i64,
    pub status: ChargeStatus,
    /// processor creation time, unix seconds
    pub created_at: u64,
    pub event_id: Option<i64>,
    pub username: Option<String>,
    /// decline reason when failed
    pub message: Option<String>,
}

/// A prepared charge waiting for the contributor's authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedCharge {
    pub reference: String,
    /// handed to the client to authorize the charge
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// minor units
    pub amount: i64,
    pub currency: String,
    pub event_id: i64,
    pub username: String,
}

/// Mints virtual cards.
#[async_trait::async_trait]
pub trait CardIssuer {
    fn name(&self) -> &str;

    /// Issue a new virtual card. `label` identifies the card holder at the processor.
    async fn issue_card(&self, label: &str) -> Result<IssuedCard>;
}

/// Contribution charges.
#[async_trait::async_trait]
pub trait Charges {
    fn name(&self) -> &str;

    async fn prepare(&self, req: ChargeRequest) -> Result<PreparedCharge>;

    /// Confirm a prepared charge with a client authorized payment method.
    async fn confirm(&self, reference: &str, payment_method: &str) -> Result<Charge>;

    async fn lookup(&self, reference: &str) -> Result<Charge>;

    /// Charges created at or after `from_time`.
    async fn list(&self, from_time: u64) -> Result<Vec<Charge>>;

    /// Cancel a charge that has not completed. Returns the final charge,
    /// which may be `Succeeded` if the processor completed it first.
    async fn cancel(&self, reference: &str) -> Result<Charge>;
}
