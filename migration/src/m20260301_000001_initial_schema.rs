use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create consents table
        manager
            .create_table(
                Table::create()
                    .table(Consent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Consent::ConsentId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Consent::ClientId).string().not_null())
                    .col(ColumnDef::new(Consent::Receipt).text().not_null())
                    .col(ColumnDef::new(Consent::ConsentType).string().not_null())
                    .col(
                        ColumnDef::new(Consent::ConsentFrequency)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Consent::ValidityPeriod)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Consent::RecurringIndicator)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Consent::CurrentStatus).string().not_null())
                    .col(ColumnDef::new(Consent::CreatedTime).big_integer().not_null())
                    .col(ColumnDef::new(Consent::UpdatedTime).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // Indexes for the search filters used by admin retrieval and the expiry scan
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_client")
                    .table(Consent::Table)
                    .col(Consent::ClientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_status")
                    .table(Consent::Table)
                    .col(Consent::CurrentStatus)
                    .to_owned(),
            )
            .await?;

        // Create consent authorization resources table
        manager
            .create_table(
                Table::create()
                    .table(Authorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Authorization::AuthorizationId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Authorization::ConsentId).string().not_null())
                    .col(
                        ColumnDef::new(Authorization::AuthorizationType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Authorization::UserId).string())
                    .col(
                        ColumnDef::new(Authorization::AuthorizationStatus)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Authorization::UpdatedTime)
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
                    .name("idx_authorization_consent")
                    .table(Authorization::Table)
                    .col(Authorization::ConsentId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_authorization_user")
                    .table(Authorization::Table)
                    .col(Authorization::UserId)
                    .to_owned(),
            )
            .await?;

        // Create account permission mappings table
        manager
            .create_table(
                Table::create()
                    .table(Mapping::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Mapping::MappingId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Mapping::AuthorizationId).string().not_null())
                    .col(ColumnDef::new(Mapping::AccountId).string().not_null())
                    .col(ColumnDef::new(Mapping::Permission).string().not_null())
                    .col(ColumnDef::new(Mapping::MappingStatus).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_mapping_authorization")
                    .table(Mapping::Table)
                    .col(Mapping::AuthorizationId)
                    .to_owned(),
            )
            .await?;

        // Create consent attributes table (key/value metadata per consent)
        manager
            .create_table(
                Table::create()
                    .table(Attribute::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Attribute::ConsentId).string().not_null())
                    .col(ColumnDef::new(Attribute::AttKey).string().not_null())
                    .col(ColumnDef::new(Attribute::AttValue).text().not_null())
                    .primary_key(
                        Index::create()
                            .col(Attribute::ConsentId)
                            .col(Attribute::AttKey),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_attribute_key")
                    .table(Attribute::Table)
                    .col(Attribute::AttKey)
                    .to_owned(),
            )
            .await?;

        // Create consent files table
        manager
            .create_table(
                Table::create()
                    .table(ConsentFile::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ConsentFile::ConsentId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ConsentFile::ConsentFileCol).text().not_null())
                    .to_owned(),
            )
            .await?;

        // Create status audit table (append-only)
        manager
            .create_table(
                Table::create()
                    .table(StatusAudit::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StatusAudit::StatusAuditId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StatusAudit::ConsentId).string().not_null())
                    .col(ColumnDef::new(StatusAudit::CurrentStatus).string().not_null())
                    .col(
                        ColumnDef::new(StatusAudit::ActionTime)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StatusAudit::Reason).string())
                    .col(ColumnDef::new(StatusAudit::ActionBy).string())
                    .col(ColumnDef::new(StatusAudit::PreviousStatus).string())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_status_audit_consent")
                    .table(StatusAudit::Table)
                    .col(StatusAudit::ConsentId)
                    .to_owned(),
            )
            .await?;

        // Create amendment history table, keyed by
        // (consent_id, history_id, table_id, record_id)
        manager
            .create_table(
                Table::create()
                    .table(History::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(History::ConsentId).string().not_null())
                    .col(ColumnDef::new(History::HistoryId).big_integer().not_null())
                    .col(ColumnDef::new(History::TableId).string().not_null())
                    .col(ColumnDef::new(History::RecordId).string().not_null())
                    .col(ColumnDef::new(History::ChangedValues).text().not_null())
                    .col(ColumnDef::new(History::Reason).string().not_null())
                    .col(
                        ColumnDef::new(History::EffectiveTimestamp)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(History::ConsentId)
                            .col(History::HistoryId)
                            .col(History::TableId)
                            .col(History::RecordId),
                    )
                    .to_owned(),
            )
            .await?;

        // Create job executions table
        manager
            .create_table(
                Table::create()
                    .table(JobExecution::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobExecution::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobExecution::JobName).string().not_null())
                    .col(
                        ColumnDef::new(JobExecution::StartedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(JobExecution::CompletedAt).big_integer())
                    .col(ColumnDef::new(JobExecution::Success).big_integer())
                    .col(ColumnDef::new(JobExecution::ErrorMessage).string())
                    .col(ColumnDef::new(JobExecution::ConsentsProcessed).big_integer())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobExecution::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(History::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StatusAudit::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ConsentFile::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attribute::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Mapping::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Authorization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Consent::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Consent {
    #[sea_orm(iden = "consents")]
    Table,
    ConsentId,
    ClientId,
    Receipt,
    ConsentType,
    ConsentFrequency,
    ValidityPeriod,
    RecurringIndicator,
    CurrentStatus,
    CreatedTime,
    UpdatedTime,
}

#[derive(DeriveIden)]
enum Authorization {
    #[sea_orm(iden = "consent_authorizations")]
    Table,
    AuthorizationId,
    ConsentId,
    AuthorizationType,
    UserId,
    AuthorizationStatus,
    UpdatedTime,
}

#[derive(DeriveIden)]
enum Mapping {
    #[sea_orm(iden = "consent_mappings")]
    Table,
    MappingId,
    AuthorizationId,
    AccountId,
    Permission,
    MappingStatus,
}

#[derive(DeriveIden)]
enum Attribute {
    #[sea_orm(iden = "consent_attributes")]
    Table,
    ConsentId,
    AttKey,
    AttValue,
}

#[derive(DeriveIden)]
enum ConsentFile {
    #[sea_orm(iden = "consent_files")]
    Table,
    ConsentId,
    #[sea_orm(iden = "consent_file")]
    ConsentFileCol,
}

#[derive(DeriveIden)]
enum StatusAudit {
    #[sea_orm(iden = "consent_status_audits")]
    Table,
    StatusAuditId,
    ConsentId,
    CurrentStatus,
    ActionTime,
    Reason,
    ActionBy,
    PreviousStatus,
}

#[derive(DeriveIden)]
enum History {
    #[sea_orm(iden = "consent_history")]
    Table,
    ConsentId,
    HistoryId,
    TableId,
    RecordId,
    ChangedValues,
    Reason,
    EffectiveTimestamp,
}

#[derive(DeriveIden)]
enum JobExecution {
    #[sea_orm(iden = "job_executions")]
    Table,
    Id,
    JobName,
    StartedAt,
    CompletedAt,
    Success,
    ErrorMessage,
    ConsentsProcessed,
}
