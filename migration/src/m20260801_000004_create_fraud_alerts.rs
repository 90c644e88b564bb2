use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FraudAlerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FraudAlerts::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FraudAlerts::ListingId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudAlerts::Severity)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(ColumnDef::new(FraudAlerts::Reason).string().not_null())
                    .col(
                        ColumnDef::new(FraudAlerts::ReferencePrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudAlerts::ObservedPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FraudAlerts::DeviationPercent)
                            .integer()
                            .not_null(),
                    )
                    // Set only on party-escalation alerts; null marks a listing alert
                    .col(
                        ColumnDef::new(FraudAlerts::ResponsiblePartyId)
                            .string_len(36)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(FraudAlerts::IsRead)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(FraudAlerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // Per-listing cleanup and dashboard filtering
        manager
            .create_index(
                Index::create()
                    .name("idx_fraud_alerts_listing_id")
                    .table(FraudAlerts::Table)
                    .col(FraudAlerts::ListingId)
                    .to_owned(),
            )
            .await?;

        // Escalation dedup: latest party alert per day
        manager
            .create_index(
                Index::create()
                    .name("idx_fraud_alerts_party_time")
                    .table(FraudAlerts::Table)
                    .col(FraudAlerts::ResponsiblePartyId)
                    .col((FraudAlerts::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fraud_alerts_is_read")
                    .table(FraudAlerts::Table)
                    .col(FraudAlerts::IsRead)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FraudAlerts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum FraudAlerts {
    Table,
    Id,
    ListingId,
    Severity,
    Reason,
    ReferencePrice,
    ObservedPrice,
    DeviationPercent,
    ResponsiblePartyId,
    IsRead,
    CreatedAt,
}
