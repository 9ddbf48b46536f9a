use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create policies table
        manager
            .create_table(
                Table::create()
                    .table(Policies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Policies::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Policies::Name))
                    .col(string(Policies::Effect))
                    .col(string(Policies::ConstraintJson))
                    .col(
                        ColumnDef::new(Policies::Internal)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(big_integer(Policies::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create roles table
        manager
            .create_table(
                Table::create()
                    .table(Roles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Roles::Key)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Roles::Name))
                    .col(string(Roles::Description))
                    .col(
                        ColumnDef::new(Roles::Internal)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(big_integer(Roles::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_roles_name")
                    .table(Roles::Table)
                    .col(Roles::Name)
                    .to_owned(),
            )
            .await?;

        // Policy <-> role binding. No foreign key on policy_key: deleting a policy
        // leaves dangling bindings that lookups skip.
        manager
            .create_table(
                Table::create()
                    .table(RolePolicies::Table)
                    .if_not_exists()
                    .col(string(RolePolicies::RoleKey))
                    .col(string(RolePolicies::PolicyKey))
                    .primary_key(
                        Index::create()
                            .col(RolePolicies::RoleKey)
                            .col(RolePolicies::PolicyKey),
                    )
                    .to_owned(),
            )
            .await?;

        // Directed relationship edges: (from) --kind--> (to)
        manager
            .create_table(
                Table::create()
                    .table(Relationships::Table)
                    .if_not_exists()
                    .col(string(Relationships::FromType))
                    .col(string(Relationships::FromKey))
                    .col(string(Relationships::Kind))
                    .col(string(Relationships::ToType))
                    .col(string(Relationships::ToKey))
                    .col(big_integer(Relationships::CreatedAt))
                    .primary_key(
                        Index::create()
                            .col(Relationships::FromType)
                            .col(Relationships::FromKey)
                            .col(Relationships::Kind)
                            .col(Relationships::ToType)
                            .col(Relationships::ToKey),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Relationships::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RolePolicies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Roles::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Policies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Policies {
    Table,
    Key,
    Name,
    Effect,
    ConstraintJson,
    Internal,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Roles {
    Table,
    Key,
    Name,
    Description,
    Internal,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum RolePolicies {
    Table,
    RoleKey,
    PolicyKey,
}

#[derive(DeriveIden)]
pub(crate) enum Relationships {
    Table,
    FromType,
    FromKey,
    Kind,
    ToType,
    ToKey,
    CreatedAt,
}
