use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 integrations 表 - 存储每个用户与提供商的加密令牌
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Integrations::UserId)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::ProviderId)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Integrations::AccessToken).text().not_null())
                    .col(ColumnDef::new(Integrations::RefreshToken).text())
                    .col(ColumnDef::new(Integrations::ExpiresAt).timestamp())
                    .col(ColumnDef::new(Integrations::Scope).text())
                    .col(
                        ColumnDef::new(Integrations::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Integrations::IsConnected)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Integrations::ConnectedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // (user_id, provider_id) 唯一，upsert 依赖该约束
        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_user_provider")
                    .table(Integrations::Table)
                    .col(Integrations::UserId)
                    .col(Integrations::ProviderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_integrations_expires_at")
                    .table(Integrations::Table)
                    .col(Integrations::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Integrations {
    #[sea_orm(iden = "integrations")]
    Table,
    Id,
    UserId,
    ProviderId,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    Scope,
    IsActive,
    IsConnected,
    ConnectedAt,
    UpdatedAt,
}
