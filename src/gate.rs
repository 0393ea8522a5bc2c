//! Access gate for card secrets.
//!
//! The host and every member with a committed contribution may see the card
//! number, expiration and cvv. Access is resolved from the ledger on each
//! read and never cached.

use crate::{ledger, Result};
use entity::{card, contribution, event};
use sea_orm::DbConn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Access {
    pub is_host: bool,
    /// viewer has at least one committed contribution
    pub contributed: bool,
}

impl Access {
    pub async fn resolve(conn: &DbConn, event: &event::Model, viewer: &str) -> Result<Self> {
        Ok(Self {
            is_host: event.host == viewer,
            contributed: ledger::has_committed(conn, event.id, viewer).await?,
        })
    }

    pub fn can_view_secrets(&self) -> bool {
        self.is_host || self.contributed
    }
}

pub async fn can_view_secrets(conn: &DbConn, event: &event::Model, viewer: &str) -> Result<bool> {
    Ok(Access::resolve(conn, event, viewer).await?.can_view_secrets())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionView {
    pub username: String,
    /// gross
    pub amount: i64,
    pub net_amount: i64,
    pub committed_at: i64,
}

impl From<&contribution::Model> for ContributionView {
    fn from(c: &contribution::Model) -> Self {
        Self {
            username: c.username.clone(),
            amount: c.gross_amount,
            net_amount: c.net_amount,
            committed_at: c.committed_at,
        }
    }
}

/// Card as shown to one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardView {
    pub event_id: i64,
    pub balance: i64,
    pub total_contributions: i64,
    pub contribution_count: i64,
    pub user_contributed: bool,
    pub can_view_secrets: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    pub contributions: Vec<ContributionView>,
    pub created_at: i64,
}

pub fn render_card(card: &card::Model, access: Access, history: &[contribution::Model]) -> CardView {
    let allowed = access.can_view_secrets();
    let secret = |s: &String| allowed.then(|| s.clone());
    CardView {
        event_id: card.event_id,
        balance: card.balance,
        total_contributions: card.total_contributions,
        contribution_count: card.contribution_count,
        user_contributed: access.contributed,
        can_view_secrets: allowed,
        card_number: secret(&card.card_number),
        expiration: secret(&card.expiration),
        cvv: secret(&card.cvv),
        contributions: history.iter().map(ContributionView::from).collect(),
        created_at: card.created_at,
    }
}
