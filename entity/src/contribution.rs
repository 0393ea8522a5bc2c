use sea_orm::entity::prelude::*;

#[derive(EnumIter, DeriveActiveEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum Status {
    Pending = 0,
    Committed = 1,
    Failed = 2,
}

/// Contribution ledger entry. Append only, the status moves once from
/// pending to committed or failed.

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "contributions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub event_id: i64,

    pub username: String,

    /// processor charge reference, the idempotency key
    #[sea_orm(unique)]
    pub reference: String,

    pub status: Status,

    /// authorized amount, minor units
    pub gross_amount: i64,
    /// fee rate in basis points, captured when the contribution is initiated
    pub fee_bps: i32,
    /// set on commit
    pub fee: i64,
    /// set on commit
    pub net_amount: i64,

    /// path that resolved the entry: client, webhook, sync
    pub source: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    /// data create time
    pub created_at: i64,
    /// commit time, 0 until committed
    pub committed_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
