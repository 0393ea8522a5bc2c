use entity::card;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let table = Table::create()
            .table(card::Entity)
            .if_not_exists()
            .col(
                ColumnDef::new(card::Column::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(
                ColumnDef::new(card::Column::EventId)
                    .big_integer()
                    .not_null(),
            )
            .col(ColumnDef::new(card::Column::Token).string_len(100).not_null())
            .col(ColumnDef::new(card::Column::Issuer).string_len(20).not_null())
            .col(
                ColumnDef::new(card::Column::CardNumber)
                    .string_len(32)
                    .not_null(),
            )
            .col(
                ColumnDef::new(card::Column::Expiration)
                    .string_len(10)
                    .not_null(),
            )
            .col(ColumnDef::new(card::Column::Cvv).string_len(8).not_null())
            .col(
                ColumnDef::new(card::Column::Balance)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(card::Column::TotalContributions)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(card::Column::ContributionCount)
                    .big_integer()
                    .not_null()
                    .default(0),
            )
            .col(
                ColumnDef::new(card::Column::CreatedBy)
                    .string_len(100)
                    .not_null(),
            )
            .col(
                ColumnDef::new(card::Column::CreatedAt)
                    .big_integer()
                    .not_null(),
            )
            .col(
                ColumnDef::new(card::Column::UpdatedAt)
                    .big_integer()
                    .not_null(),
            )
            .to_owned();

        manager.create_table(table).await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_card_event_id")
                    .col(card::Column::EventId)
                    .table(card::Entity)
                    .unique()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_card_event_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(card::Entity).to_owned())
            .await
    }
}
