use sea_orm_migration::prelude::*;

use crate::m20260101_000001_access_schema::Relationships;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Reverse lookup: "which roles are parents of this subject"
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_relationships_to_kind")
                    .table(Relationships::Table)
                    .col(Relationships::ToType)
                    .col(Relationships::ToKey)
                    .col(Relationships::Kind)
                    .to_owned(),
            )
            .await?;

        // Forward lookup used by relationship constraints
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_relationships_from_kind")
                    .table(Relationships::Table)
                    .col(Relationships::FromType)
                    .col(Relationships::FromKey)
                    .col(Relationships::Kind)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_relationships_from_kind")
                    .table(Relationships::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_relationships_to_kind")
                    .table(Relationships::Table)
                    .to_owned(),
            )
            .await
    }
}
