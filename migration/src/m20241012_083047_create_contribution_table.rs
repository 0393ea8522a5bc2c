use entity::contribution;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(contribution::Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(contribution::Column::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::EventId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::Username)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::Reference)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::Status)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::GrossAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::FeeBps)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::Fee)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::NetAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::Source)
                            .string()
                            .not_null()
                            .default("".to_owned()),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::Message)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::CommittedAt)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(contribution::Column::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_contribution_reference")
                    .col(contribution::Column::Reference)
                    .table(contribution::Entity)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_contribution_event_id")
                    .col(contribution::Column::EventId)
                    .table(contribution::Entity)
                    .to_owned(),
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_contribution_reference").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_contribution_event_id").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(contribution::Entity).to_owned())
            .await
    }
}
