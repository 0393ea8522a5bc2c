//! In-process processor for local development and tests.
//!
//! Issues cards and processes charges in memory. Payment methods follow the
//! test token convention: `pm_card_visa` succeeds, `pm_card_chargeDeclined`
//! is declined and `pm_card_processing` stays in flight until settled with
//! [`Sandbox::settle`].

use crate::{processor::*, Error, Result};
use parking_lot::Mutex;
use rand::{Rng, RngCore};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tracing::debug;

pub const PM_SUCCEED: &str = "pm_card_visa";
pub const PM_DECLINE: &str = "pm_card_chargeDeclined";
pub const PM_PROCESSING: &str = "pm_card_processing";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn rand_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Default)]
struct Inner {
    charges: Mutex<HashMap<String, Charge>>,
    latency: Mutex<Option<Duration>>,
    /// every call fails with Unavailable before reaching the processor
    down: AtomicBool,
    /// calls reach the processor but the response is lost
    drop_responses: AtomicBool,
    reject_issuance: AtomicBool,
    issued: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct Sandbox {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("charges", &self.inner.charges.lock().len())
            .field("issued", &self.issued())
            .finish()
    }
}

impl Sandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, for exercising timeouts.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock() = latency;
    }

    pub fn set_down(&self, down: bool) {
        self.inner.down.store(down, Ordering::SeqCst);
    }

    pub fn set_drop_responses(&self, drop: bool) {
        self.inner.drop_responses.store(drop, Ordering::SeqCst);
    }

    pub fn set_reject_issuance(&self, reject: bool) {
        self.inner.reject_issuance.store(reject, Ordering::SeqCst);
    }

    /// Number of cards issued so far.
    pub fn issued(&self) -> usize {
        self.inner.issued.load(Ordering::SeqCst)
    }

    /// Complete an in flight charge.
    pub fn settle(&self, reference: &str, status: ChargeStatus) -> Result<Charge> {
        let mut charges = self.inner.charges.lock();
        let charge = charges.get_mut(reference).ok_or(Error::ChargeNotFound)?;
        if charge.status == ChargeStatus::Pending {
            charge.status = status;
        }
        Ok(charge.clone())
    }

    pub fn charge(&self, reference: &str) -> Option<Charge> {
        self.inner.charges.lock().get(reference).cloned()
    }

    async fn enter(&self) -> Result<()> {
        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.inner.down.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("sandbox is down".to_owned()));
        }
        Ok(())
    }

    fn leave<T>(&self, res: T) -> Result<T> {
        if self.inner.drop_responses.load(Ordering::SeqCst) {
            Err(Error::Unavailable("connection reset".to_owned()))
        } else {
            Ok(res)
        }
    }
}

#[async_trait::async_trait]
impl CardIssuer for Sandbox {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn issue_card(&self, label: &str) -> Result<IssuedCard> {
        self.enter().await?;
        if self.inner.reject_issuance.load(Ordering::SeqCst) {
            return Err(Error::Rejected("card product disabled".to_owned()));
        }
        self.inner.issued.fetch_add(1, Ordering::SeqCst);
        let mut rng = rand::thread_rng();
        let number = format!("4111{:012}", rng.gen_range(0..1_000_000_000_000u64));
        let card = IssuedCard {
            token: format!("card_{}", rand_hex(12)),
            number,
            expiration: format!("{:02}{:02}", rng.gen_range(1..=12), 30),
            cvv: format!("{:03}", rng.gen_range(0..1000)),
        };
        debug!(label, token = card.token, "sandbox card issued");
        self.leave(card)
    }
}

#[async_trait::async_trait]
impl Charges for Sandbox {
    fn name(&self) -> &str {
        "sandbox"
    }

    async fn prepare(&self, req: ChargeRequest) -> Result<PreparedCharge> {
        self.enter().await?;
        if req.amount <= 0 {
            return Err(Error::Rejected("amount must be positive".to_owned()));
        }
        let reference = format!("pi_{}", rand_hex(12));
        let charge = Charge {
            reference: reference.clone(),
            amount: req.amount,
            status: ChargeStatus::Pending,
            created_at: now(),
            event_id: Some(req.event_id),
            username: Some(req.username),
            message: None,
        };
        self.inner.charges.lock().insert(reference.clone(), charge);
        self.leave(PreparedCharge {
            client_secret: format!("{}_secret_{}", reference, rand_hex(8)),
            reference,
        })
    }

    async fn confirm(&self, reference: &str, payment_method: &str) -> Result<Charge> {
        self.enter().await?;
        let charge = {
            let mut charges = self.inner.charges.lock();
            let charge = charges.get_mut(reference).ok_or(Error::ChargeNotFound)?;
            if charge.status == ChargeStatus::Pending {
                match payment_method {
                    PM_DECLINE => {
                        charge.status = ChargeStatus::Failed;
                        charge.message = Some("Your card was declined.".to_owned());
                    }
                    PM_PROCESSING => {}
                    _ => charge.status = ChargeStatus::Succeeded,
                }
            }
            charge.clone()
        };
        self.leave(charge)
    }

    async fn lookup(&self, reference: &str) -> Result<Charge> {
        self.enter().await?;
        let charge = self.charge(reference).ok_or(Error::ChargeNotFound)?;
        self.leave(charge)
    }

    async fn list(&self, from_time: u64) -> Result<Vec<Charge>> {
        self.enter().await?;
        let mut list = self
            .inner
            .charges
            .lock()
            .values()
            .filter(|c| c.created_at >= from_time)
            .cloned()
            .collect::<Vec<_>>();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        self.leave(list)
    }

    async fn cancel(&self, reference: &str) -> Result<Charge> {
        self.enter().await?;
        let charge = {
            let mut charges = self.inner.charges.lock();
            let charge = charges.get_mut(reference).ok_or(Error::ChargeNotFound)?;
            if charge.status == ChargeStatus::Pending {
                charge.status = ChargeStatus::Failed;
                charge.message = Some("canceled".to_owned());
            }
            charge.clone()
        };
        self.leave(charge)
    }
}
