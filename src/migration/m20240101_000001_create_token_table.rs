use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PortalToken::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PortalToken::Slot).text().not_null().primary_key())
                    .col(ColumnDef::new(PortalToken::Token).text().not_null())
                    .col(
                        ColumnDef::new(PortalToken::ExpiryDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PortalToken::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PortalToken::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PortalToken {
    Table,
    Slot,
    Token,
    ExpiryDate,
    UpdatedAt,
}
