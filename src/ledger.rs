//! Contribution ledger.
//!
//! Entries are written once as pending and resolved once. The commit that
//! moves an entry to committed also credits the owning card, in the same
//! transaction, guarded by `status = pending`. Whoever flips the status
//! credits the card, every other delivery of the same reference reads the
//! result back.

use crate::{now, setting::Fee, Error, Result};
use entity::{card, contribution};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbConn, EntityTrait, NotSet,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, warn};

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub contribution: contribution::Model,
    pub card: card::Model,
    /// false when the reference had been committed before
    pub credited: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// the contributor's client reported success
    Client,
    /// processor notification
    Webhook,
    /// reconciliation sweep
    Sync,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Client => "client",
            Source::Webhook => "webhook",
            Source::Sync => "sync",
        }
    }
}

pub async fn get_by_reference<C: ConnectionTrait>(
    conn: &C,
    reference: &str,
) -> Result<Option<contribution::Model>> {
    Ok(contribution::Entity::find()
        .filter(contribution::Column::Reference.eq(reference))
        .one(conn)
        .await?)
}

pub async fn get_card<C: ConnectionTrait>(conn: &C, event_id: i64) -> Result<Option<card::Model>> {
    Ok(card::Entity::find()
        .filter(card::Column::EventId.eq(event_id))
        .one(conn)
        .await?)
}

/// Record a pending contribution for a charge the processor has prepared.
pub async fn initiate(
    conn: &DbConn,
    event_id: i64,
    username: &str,
    gross_amount: i64,
    fee_bps: i32,
    reference: String,
) -> Result<contribution::Model> {
    if gross_amount <= 0 {
        return Err(Error::InvalidAmount);
    }
    let time = now() as i64;
    let model = contribution::ActiveModel {
        id: NotSet,
        event_id: Set(event_id),
        username: Set(username.to_owned()),
        reference: Set(reference),
        status: Set(contribution::Status::Pending),
        gross_amount: Set(gross_amount),
        fee_bps: Set(fee_bps),
        fee: Set(0),
        net_amount: Set(0),
        source: Set("".to_owned()),
        message: Set("".to_owned()),
        created_at: Set(time),
        committed_at: Set(0),
        updated_at: Set(time),
    };
    Ok(model.insert(conn).await?)
}

/// Commit the contribution identified by `reference` and credit its card.
///
/// Idempotent on `reference`. The event, contributor and gross amount must
/// match the pending entry.
pub async fn commit(
    conn: &DbConn,
    reference: &str,
    event_id: i64,
    username: &str,
    gross_amount: i64,
    source: Source,
) -> Result<Commit> {
    let entry = get_by_reference(conn, reference)
        .await?
        .ok_or(Error::UnknownReference)?;
    check_match(&entry, event_id, username, gross_amount)?;

    let mut credited = false;
    if entry.status == contribution::Status::Pending {
        let (fee, net) = Fee::cal(entry.gross_amount, entry.fee_bps);
        let time = now() as i64;

        let txn = conn.begin().await?;
        let res = contribution::Entity::update_many()
            .set(contribution::ActiveModel {
                status: Set(contribution::Status::Committed),
                fee: Set(fee),
                net_amount: Set(net),
                source: Set(source.as_str().to_owned()),
                committed_at: Set(time),
                updated_at: Set(time),
                ..Default::default()
            })
            .filter(contribution::Column::Id.eq(entry.id))
            .filter(contribution::Column::Status.eq(contribution::Status::Pending))
            .exec(&txn)
            .await?;

        if res.rows_affected == 1 {
            let res = card::Entity::update_many()
                .col_expr(
                    card::Column::Balance,
                    Expr::col(card::Column::Balance).add(net),
                )
                .col_expr(
                    card::Column::TotalContributions,
                    Expr::col(card::Column::TotalContributions).add(entry.gross_amount),
                )
                .col_expr(
                    card::Column::ContributionCount,
                    Expr::col(card::Column::ContributionCount).add(1),
                )
                .col_expr(card::Column::UpdatedAt, Expr::value(time))
                .filter(card::Column::EventId.eq(entry.event_id))
                .exec(&txn)
                .await?;
            if res.rows_affected != 1 {
                // dropping the transaction rolls the status back
                return Err(Error::NotFound("card"));
            }
            txn.commit().await?;
            credited = true;
            info!(
                event_id = entry.event_id,
                reference,
                username = entry.username,
                net,
                source = source.as_str(),
                "contribution committed"
            );
        } else {
            // another delivery resolved it first
            txn.rollback().await?;
        }
    }

    let contribution = get_by_reference(conn, reference)
        .await?
        .ok_or(Error::UnknownReference)?;
    match contribution.status {
        contribution::Status::Committed => {
            let card = get_card(conn, contribution.event_id)
                .await?
                .ok_or(Error::NotFound("card"))?;
            Ok(Commit {
                contribution,
                card,
                credited,
            })
        }
        contribution::Status::Failed => Err(Error::ContributionFailed(contribution.message)),
        contribution::Status::Pending => Err(Error::Str("contribution still pending after commit")),
    }
}

fn check_match(
    entry: &contribution::Model,
    event_id: i64,
    username: &str,
    gross_amount: i64,
) -> Result<()> {
    if entry.event_id != event_id {
        return Err(Error::AmountMismatch(format!(
            "event {} expected {}",
            event_id, entry.event_id
        )));
    }
    if entry.username != username {
        return Err(Error::AmountMismatch(format!(
            "contributor {} expected {}",
            username, entry.username
        )));
    }
    if entry.gross_amount != gross_amount {
        return Err(Error::AmountMismatch(format!(
            "amount {} expected {}",
            gross_amount, entry.gross_amount
        )));
    }
    Ok(())
}

/// Move a pending contribution to failed. No-op once resolved.
pub async fn mark_failed(
    conn: &DbConn,
    reference: &str,
    message: &str,
    source: Source,
) -> Result<contribution::Model> {
    let res = contribution::Entity::update_many()
        .set(contribution::ActiveModel {
            status: Set(contribution::Status::Failed),
            message: Set(message.to_owned()),
            source: Set(source.as_str().to_owned()),
            updated_at: Set(now() as i64),
            ..Default::default()
        })
        .filter(contribution::Column::Reference.eq(reference))
        .filter(contribution::Column::Status.eq(contribution::Status::Pending))
        .exec(conn)
        .await?;
    if res.rows_affected == 1 {
        warn!(
            reference,
            reason = message,
            source = source.as_str(),
            "contribution failed"
        );
    }
    get_by_reference(conn, reference)
        .await?
        .ok_or(Error::UnknownReference)
}

/// Record why a pending contribution can't be resolved. The entry stays
/// pending, only the first flag is kept. Returns whether this call set it.
pub async fn flag(conn: &DbConn, reference: &str, message: &str) -> Result<bool> {
    let res = contribution::Entity::update_many()
        .set(contribution::ActiveModel {
            message: Set(message.to_owned()),
            updated_at: Set(now() as i64),
            ..Default::default()
        })
        .filter(contribution::Column::Reference.eq(reference))
        .filter(contribution::Column::Status.eq(contribution::Status::Pending))
        .filter(contribution::Column::Message.eq(""))
        .exec(conn)
        .await?;
    Ok(res.rows_affected == 1)
}

/// Pending contributions created at or before `created_before`, oldest first.
pub async fn pending(conn: &DbConn, created_before: u64) -> Result<Vec<contribution::Model>> {
    Ok(contribution::Entity::find()
        .filter(contribution::Column::Status.eq(contribution::Status::Pending))
        .filter(contribution::Column::CreatedAt.lte(created_before as i64))
        .order_by_asc(contribution::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Committed contributions of an event, newest first.
pub async fn history(conn: &DbConn, event_id: i64) -> Result<Vec<contribution::Model>> {
    Ok(contribution::Entity::find()
        .filter(contribution::Column::EventId.eq(event_id))
        .filter(contribution::Column::Status.eq(contribution::Status::Committed))
        .order_by_desc(contribution::Column::CommittedAt)
        .order_by_desc(contribution::Column::Id)
        .all(conn)
        .await?)
}

pub async fn has_committed(conn: &DbConn, event_id: i64, username: &str) -> Result<bool> {
    let count = contribution::Entity::find()
        .filter(contribution::Column::EventId.eq(event_id))
        .filter(contribution::Column::Username.eq(username))
        .filter(contribution::Column::Status.eq(contribution::Status::Committed))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Recompute the card totals from committed entries and compare with the card.
pub async fn audit(conn: &DbConn, event_id: i64) -> Result<card::Model> {
    let txn = conn.begin().await?;
    let card = get_card(&txn, event_id)
        .await?
        .ok_or(Error::NotFound("card"))?;
    let committed = contribution::Entity::find()
        .filter(contribution::Column::EventId.eq(event_id))
        .filter(contribution::Column::Status.eq(contribution::Status::Committed))
        .all(&txn)
        .await?;
    txn.commit().await?;

    let balance: i64 = committed.iter().map(|c| c.net_amount).sum();
    let total: i64 = committed.iter().map(|c| c.gross_amount).sum();
    if balance != card.balance
        || total != card.total_contributions
        || committed.len() as i64 != card.contribution_count
    {
        return Err(Error::Inconsistent(event_id));
    }
    Ok(card)
}
