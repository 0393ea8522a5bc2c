use sea_orm::entity::prelude::*;

/// Virtual funding card, one per event.
///
/// `balance`, `total_contributions` and `contribution_count` are maintained
/// only by the ledger commit, inside the same transaction that commits the
/// contribution.

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "event_cards")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub event_id: i64,

    /// processor card token
    pub token: String,
    /// issuer name
    pub issuer: String,

    pub card_number: String,
    pub expiration: String,
    pub cvv: String,

    /// sum of committed net amounts, minor units
    pub balance: i64,
    /// sum of committed gross amounts, minor units
    pub total_contributions: i64,
    pub contribution_count: i64,

    pub created_by: String,

    /// data create time
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
