use crate::{
    gate::{self, Access, CardView},
    ledger::{self, Commit, Source},
    lock::EventLocks,
    now,
    setting::Fee,
    Error, Result,
};
use card_gateway::processor::{Charge, ChargeRequest, ChargeStatus, IssuedCard};
use card_gateway::{CardIssuer, Charges};
use entity::{card, contribution, event, member};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbConn, EntityTrait, NotSet, PaginatorTrait, QueryFilter, Set,
};
use std::{collections::HashSet, future::Future, time::Duration};
use tracing::{debug, error, info, warn};

/// Card returned by create, `created` is false when the event already had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCard {
    pub card: card::Model,
    pub created: bool,
}

/// A pending contribution and what the client needs to authorize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initiated {
    pub contribution: contribution::Model,
    pub client_secret: String,
    /// quoted fee, charged on commit
    pub fee: i64,
    pub net_amount: i64,
}

/// Event funding service
pub struct Service {
    issuer: Box<dyn CardIssuer + Sync + Send>,
    charges: Box<dyn Charges + Sync + Send>,
    conn: DbConn,
    timeout: Duration,
    locks: EventLocks,
}

impl Service {
    pub fn new(
        issuer: Box<dyn CardIssuer + Sync + Send>,
        charges: Box<dyn Charges + Sync + Send>,
        conn: DbConn,
        timeout: Duration,
    ) -> Self {
        Self {
            issuer,
            charges,
            conn,
            timeout,
            locks: EventLocks::default(),
        }
    }

    pub fn issuer(&self) -> &(dyn CardIssuer + Sync + Send) {
        self.issuer.as_ref()
    }

    pub fn charges(&self) -> &(dyn Charges + Sync + Send) {
        self.charges.as_ref()
    }

    pub fn db(&self) -> &DbConn {
        &self.conn
    }

    /// Bound a processor call. A timeout says nothing about whether the
    /// processor acted, so it is reported as unavailable.
    async fn gateway<T, F>(&self, fut: F) -> card_gateway::Result<T>
    where
        F: Future<Output = card_gateway::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(card_gateway::Error::Unavailable(format!(
                "no response in {:?}",
                self.timeout
            ))),
        }
    }

    // events

    pub async fn get_event(&self, event_id: i64) -> Result<Option<event::Model>> {
        Ok(event::Entity::find_by_id(event_id).one(self.db()).await?)
    }

    pub async fn create_event(&self, host: &str) -> Result<event::Model> {
        loop {
            let id: i64 = rand::thread_rng().gen_range(100_000..1_000_000);
            if self.get_event(id).await?.is_some() {
                continue;
            }
            let res = event::ActiveModel {
                id: Set(id),
                host: Set(host.to_owned()),
                created_at: Set(now() as i64),
            }
            .insert(self.db())
            .await;
            match res {
                Ok(event) => {
                    info!(event_id = event.id, host, "event created");
                    return Ok(event);
                }
                Err(e) => {
                    // taken in between, pick another
                    if self.get_event(id).await?.is_none() {
                        return Err(e.into());
                    }
                }
            }
        }
    }

    /// Add a member, returns false if the user already belongs to the event.
    pub async fn join_event(&self, event_id: i64, username: &str) -> Result<bool> {
        let event = self
            .get_event(event_id)
            .await?
            .ok_or(Error::NotFound("event"))?;
        if event.host == username || self.is_member(event_id, username).await? {
            return Ok(false);
        }
        let res = member::ActiveModel {
            id: NotSet,
            event_id: Set(event_id),
            username: Set(username.to_owned()),
            created_at: Set(now() as i64),
        }
        .insert(self.db())
        .await;
        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                if self.is_member(event_id, username).await? {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    pub async fn is_host(&self, event_id: i64, username: &str) -> Result<bool> {
        Ok(self
            .get_event(event_id)
            .await?
            .map(|e| e.host == username)
            .unwrap_or_default())
    }

    pub async fn is_member(&self, event_id: i64, username: &str) -> Result<bool> {
        let count = member::Entity::find()
            .filter(member::Column::EventId.eq(event_id))
            .filter(member::Column::Username.eq(username))
            .count(self.db())
            .await?;
        Ok(count > 0)
    }

    /// The event, if `username` is its host or a member.
    async fn member_event(&self, event_id: i64, username: &str) -> Result<event::Model> {
        let event = self
            .get_event(event_id)
            .await?
            .ok_or(Error::NotFound("event"))?;
        if event.host == username || self.is_member(event_id, username).await? {
            Ok(event)
        } else {
            Err(Error::NotAMember)
        }
    }

    // card registry

    pub async fn request_card_issuance(&self, event_id: i64) -> Result<IssuedCard> {
        let label = event_id.to_string();
        match self.gateway(self.issuer.issue_card(&label)).await {
            Ok(card) => Ok(card),
            Err(e) => {
                warn!(event_id, error = e.to_string(), "card issuance failed");
                Err(e.into())
            }
        }
    }

    /// Return the event card, issuing it on the host's first request.
    pub async fn get_or_create_card(&self, event_id: i64, username: &str) -> Result<CreatedCard> {
        let event = self.member_event(event_id, username).await?;
        if let Some(card) = ledger::get_card(self.db(), event_id).await? {
            return Ok(CreatedCard {
                card,
                created: false,
            });
        }
        if event.host != username {
            return Err(Error::Unauthorized);
        }

        let _guard = self.locks.lock(event_id).await;
        // a concurrent request may have won
        if let Some(card) = ledger::get_card(self.db(), event_id).await? {
            return Ok(CreatedCard {
                card,
                created: false,
            });
        }

        let issued = self.request_card_issuance(event_id).await?;
        let time = now() as i64;
        let res = card::ActiveModel {
            id: NotSet,
            event_id: Set(event_id),
            token: Set(issued.token),
            issuer: Set(self.issuer.name().to_owned()),
            card_number: Set(issued.number),
            expiration: Set(issued.expiration),
            cvv: Set(issued.cvv),
            balance: Set(0),
            total_contributions: Set(0),
            contribution_count: Set(0),
            created_by: Set(username.to_owned()),
            created_at: Set(time),
            updated_at: Set(time),
        }
        .insert(self.db())
        .await;

        match res {
            Ok(card) => {
                info!(event_id, token = card.token, "event card created");
                Ok(CreatedCard {
                    card,
                    created: true,
                })
            }
            // another process holds the unique event_id, first writer wins
            Err(e) => match ledger::get_card(self.db(), event_id).await? {
                Some(card) => {
                    warn!(event_id, "card created elsewhere, issued card discarded");
                    Ok(CreatedCard {
                        card,
                        created: false,
                    })
                }
                None => Err(e.into()),
            },
        }
    }

    /// Card view for a member, secrets filtered by the access gate.
    pub async fn get_card(&self, event_id: i64, viewer: &str) -> Result<CardView> {
        let event = self.member_event(event_id, viewer).await?;
        let card = ledger::get_card(self.db(), event_id)
            .await?
            .ok_or(Error::NotFound("card"))?;
        let access = Access::resolve(self.db(), &event, viewer).await?;
        let history = ledger::history(self.db(), event_id).await?;
        Ok(gate::render_card(&card, access, &history))
    }

    pub async fn can_view_secrets(&self, event_id: i64, viewer: &str) -> Result<bool> {
        let event = self
            .get_event(event_id)
            .await?
            .ok_or(Error::NotFound("event"))?;
        gate::can_view_secrets(self.db(), &event, viewer).await
    }

    // contributions

    pub async fn initiate_contribution(
        &self,
        event_id: i64,
        username: &str,
        amount: i64,
        fee: &Fee,
    ) -> Result<Initiated> {
        if !fee.allows(amount) {
            return Err(Error::InvalidAmount);
        }
        self.member_event(event_id, username).await?;
        if ledger::get_card(self.db(), event_id).await?.is_none() {
            return Err(Error::NotFound("card"));
        }
        let bps = fee.bps();
        let (fee_amount, net_amount) = Fee::cal(amount, bps);

        let prepared = self
            .gateway(self.charges.prepare(ChargeRequest {
                amount,
                currency: fee.currency.clone(),
                event_id,
                username: username.to_owned(),
            }))
            .await?;

        let contribution =
            ledger::initiate(self.db(), event_id, username, amount, bps, prepared.reference)
                .await?;
        info!(
            event_id,
            username,
            amount,
            reference = contribution.reference,
            "contribution initiated"
        );
        Ok(Initiated {
            contribution,
            client_secret: prepared.client_secret,
            fee: fee_amount,
            net_amount,
        })
    }

    /// Confirm a prepared charge with the contributor's payment method.
    pub async fn authorize_contribution(
        &self,
        reference: &str,
        username: &str,
        payment_method: &str,
    ) -> Result<Commit> {
        let entry = ledger::get_by_reference(self.db(), reference)
            .await?
            .ok_or(Error::UnknownReference)?;
        if entry.username != username {
            return Err(Error::Unauthorized);
        }
        match self
            .gateway(self.charges.confirm(reference, payment_method))
            .await
        {
            Ok(charge) => self.on_confirmation(&charge, Source::Client).await,
            // the charge may still have gone through, the entry stays
            // pending for a retry or the sweep
            Err(e) if e.is_transient() => Err(e.into()),
            Err(e) => {
                ledger::mark_failed(self.db(), reference, &e.to_string(), Source::Client).await?;
                Err(e.into())
            }
        }
    }

    /// Apply a charge outcome reported by the processor. Every confirmation
    /// path ends here.
    pub async fn on_confirmation(&self, charge: &Charge, source: Source) -> Result<Commit> {
        let entry = ledger::get_by_reference(self.db(), &charge.reference)
            .await?
            .ok_or(Error::UnknownReference)?;
        match charge.status {
            ChargeStatus::Succeeded => {
                let event_id = charge.event_id.unwrap_or(entry.event_id);
                let username = charge.username.as_deref().unwrap_or(&entry.username);
                let _guard = self.locks.lock(entry.event_id).await;
                ledger::commit(
                    self.db(),
                    &charge.reference,
                    event_id,
                    username,
                    charge.amount,
                    source,
                )
                .await
            }
            ChargeStatus::Failed => {
                let message = charge.message.clone().unwrap_or_else(|| "declined".to_owned());
                let entry =
                    ledger::mark_failed(self.db(), &charge.reference, &message, source).await?;
                match entry.status {
                    // resolved earlier, report the committed result
                    contribution::Status::Committed => {
                        let card = ledger::get_card(self.db(), entry.event_id)
                            .await?
                            .ok_or(Error::NotFound("card"))?;
                        error!(
                            reference = charge.reference,
                            "processor reports failure for a committed contribution"
                        );
                        Ok(Commit {
                            contribution: entry,
                            card,
                            credited: false,
                        })
                    }
                    _ => Err(Error::ContributionFailed(entry.message)),
                }
            }
            ChargeStatus::Pending => Err(Error::ContributionPending),
        }
    }

    /// Confirmation reported by the contributor's client. Safe to repeat.
    ///
    /// The claim is checked against the pending entry, then the outcome is
    /// read from the processor.
    pub async fn confirm_contribution(
        &self,
        reference: &str,
        event_id: i64,
        username: &str,
        amount: i64,
        source: Source,
    ) -> Result<Commit> {
        let entry = ledger::get_by_reference(self.db(), reference)
            .await?
            .ok_or(Error::UnknownReference)?;
        match entry.status {
            contribution::Status::Committed => {
                // duplicate, no processor round trip
                let _guard = self.locks.lock(entry.event_id).await;
                return ledger::commit(self.db(), reference, event_id, username, amount, source)
                    .await;
            }
            contribution::Status::Failed => {
                return Err(Error::ContributionFailed(entry.message));
            }
            contribution::Status::Pending => {}
        }
        if entry.event_id != event_id || entry.username != username || entry.gross_amount != amount
        {
            return Err(Error::AmountMismatch(format!(
                "{} {} {} does not match the contribution",
                event_id, username, amount
            )));
        }

        let charge = self.lookup_charge(reference).await?;
        if charge.amount != entry.gross_amount {
            return Err(Error::AmountMismatch(format!(
                "processor amount {} expected {}",
                charge.amount, entry.gross_amount
            )));
        }
        self.on_confirmation(&charge, source).await
    }

    /// Processor notification, only the reference is taken from the payload.
    pub async fn handle_notification(&self, reference: &str) -> Result<Commit> {
        if ledger::get_by_reference(self.db(), reference)
            .await?
            .is_none()
        {
            return Err(Error::UnknownReference);
        }
        let charge = self.lookup_charge(reference).await?;
        self.on_confirmation(&charge, Source::Webhook).await
    }

    async fn lookup_charge(&self, reference: &str) -> Result<Charge> {
        match self.gateway(self.charges.lookup(reference)).await {
            Ok(charge) => Ok(charge),
            Err(card_gateway::Error::ChargeNotFound) => Err(Error::UnknownReference),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn audit_card(&self, event_id: i64) -> Result<card::Model> {
        ledger::audit(self.db(), event_id).await
    }

    // reconciliation

    /// Resolve pending contributions against the processor.
    ///
    /// Pending charges older than `pending_window` are canceled at the
    /// processor, and resolved by what the processor answers.
    pub async fn sync_contributions(&self, pending_window: Duration) -> Result<usize> {
        let time = now();
        let expire_before = time.saturating_sub(pending_window.as_secs());
        let entries = ledger::pending(self.db(), time).await?;

        let mut updated = 0;
        let mut touched = HashSet::new();
        for entry in entries.iter() {
            let expired = (entry.created_at as u64) <= expire_before;
            let charge = match self.gateway(self.charges.lookup(&entry.reference)).await {
                Ok(charge) => charge,
                Err(card_gateway::Error::ChargeNotFound) => {
                    if expired {
                        ledger::mark_failed(
                            self.db(),
                            &entry.reference,
                            "charge not found",
                            Source::Sync,
                        )
                        .await?;
                        updated += 1;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(
                        reference = entry.reference,
                        error = e.to_string(),
                        "failed to look up charge"
                    );
                    continue;
                }
            };

            let charge = if charge.status == ChargeStatus::Pending && expired {
                match self.gateway(self.charges.cancel(&entry.reference)).await {
                    Ok(charge) => charge,
                    Err(e) => {
                        warn!(
                            reference = entry.reference,
                            error = e.to_string(),
                            "failed to cancel charge"
                        );
                        continue;
                    }
                }
            } else {
                charge
            };

            if charge.status == ChargeStatus::Pending {
                continue;
            }
            match self.on_confirmation(&charge, Source::Sync).await {
                Ok(_) | Err(Error::ContributionFailed(_)) => {
                    updated += 1;
                    touched.insert(entry.event_id);
                }
                Err(e) => self.unresolved(&entry.reference, e).await?,
            }
        }

        for event_id in touched {
            if let Err(e) = self.audit_card(event_id).await {
                error!(event_id, error = e.to_string(), "card audit failed");
            }
        }
        Ok(updated)
    }

    /// Pick up processor charges created since `from_time` whose confirmation
    /// never arrived.
    pub async fn sync_processor(&self, from_time: u64) -> Result<usize> {
        let charges = self.gateway(self.charges.list(from_time)).await?;
        let mut updated = 0;
        for charge in charges.iter() {
            if charge.status == ChargeStatus::Pending {
                continue;
            }
            let entry = ledger::get_by_reference(self.db(), &charge.reference).await?;
            match entry {
                Some(entry) if entry.status == contribution::Status::Pending => {
                    match self.on_confirmation(charge, Source::Sync).await {
                        Ok(_) | Err(Error::ContributionFailed(_)) => updated += 1,
                        Err(e) => self.unresolved(&charge.reference, e).await?,
                    }
                }
                _ => {}
            }
        }
        Ok(updated)
    }

    /// A sweep could not resolve a pending contribution. A processor outcome
    /// that disagrees with the entry is flagged on the entry and logged once,
    /// the entry stays pending for an operator.
    async fn unresolved(&self, reference: &str, err: Error) -> Result<()> {
        match err {
            Error::AmountMismatch(reason) => {
                let message = format!("unresolved: {}", reason);
                if ledger::flag(self.db(), reference, &message).await? {
                    error!(
                        reference,
                        reason = %reason,
                        "processor charge disagrees with contribution"
                    );
                } else {
                    debug!(reference, "contribution still flagged");
                }
            }
            e => {
                error!(
                    reference,
                    error = e.to_string(),
                    "failed to resolve contribution"
                );
            }
        }
        Ok(())
    }

    /// Run both sweeps forever.
    pub async fn sync(&self, interval: Duration, pending_window: Duration, lookback: Duration) {
        loop {
            match self.sync_processor(now().saturating_sub(lookback.as_secs())).await {
                Ok(n) if n > 0 => info!("synced {} contributions from processor", n),
                Ok(_) => {}
                Err(e) => error!(error = e.to_string(), "processor sync failed"),
            }
            match self.sync_contributions(pending_window).await {
                Ok(n) if n > 0 => info!("resolved {} pending contributions", n),
                Ok(_) => {}
                Err(e) => error!(error = e.to_string(), "contribution sync failed"),
            }
            tokio::time::sleep(interval).await;
        }
    }
}
