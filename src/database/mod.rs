pub mod error;
pub mod queries;
pub mod repository;

pub use migrations::Migrator;

/// Database migrations module
pub mod migrations {
    use sea_orm_migration::prelude::*;

    /// Main migrator struct for database migrations
    pub struct Migrator;

    #[async_trait::async_trait]
    impl MigratorTrait for Migrator {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(tables::Migration)]
        }
    }

    /// Database tables module containing table creation migrations
    pub mod tables {
        use super::*;
        use sea_orm_migration::sea_orm::ConnectionTrait;

        /// Migration struct for creating database tables
        #[derive(DeriveMigrationName)]
        pub struct Migration;

        #[async_trait::async_trait]
        impl MigrationTrait for Migration {
            async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                manager
                    .create_table(
                        Table::create()
                            .table(StatusListPages::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(StatusListPages::Id)
                                    .string()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(ColumnDef::new(StatusListPages::VcDocument).text().not_null())
                            .col(
                                ColumnDef::new(StatusListPages::CredentialType)
                                    .string()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusListPages::StatusPurpose)
                                    .string()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusListPages::Capacity)
                                    .big_integer()
                                    .not_null(),
                            )
                            .col(ColumnDef::new(StatusListPages::State).string().not_null())
                            .col(
                                ColumnDef::new(StatusListPages::Version)
                                    .big_integer()
                                    .not_null()
                                    .default(0),
                            )
                            .col(
                                ColumnDef::new(StatusListPages::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusListPages::UpdatedAt)
                                    .timestamp_with_time_zone()
                                    .null(),
                            )
                            .to_owned(),
                    )
                    .await?;

                // Lane lookup: latest AVAILABLE page per purpose and credential type
                manager
                    .create_index(
                        Index::create()
                            .name("idx_pages_lane")
                            .table(StatusListPages::Table)
                            .col(StatusListPages::StatusPurpose)
                            .col(StatusListPages::CredentialType)
                            .col(StatusListPages::State)
                            .col(StatusListPages::CreatedAt)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_table(
                        Table::create()
                            .table(StatusListSlots::Table)
                            .if_not_exists()
                            .col(ColumnDef::new(StatusListSlots::PageId).string().not_null())
                            .col(
                                ColumnDef::new(StatusListSlots::SlotIndex)
                                    .big_integer()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusListSlots::Assigned)
                                    .boolean()
                                    .not_null()
                                    .default(false),
                            )
                            .col(
                                ColumnDef::new(StatusListSlots::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusListSlots::UpdatedAt)
                                    .timestamp_with_time_zone()
                                    .null(),
                            )
                            .primary_key(
                                Index::create()
                                    .col(StatusListSlots::PageId)
                                    .col(StatusListSlots::SlotIndex),
                            )
                            .foreign_key(
                                ForeignKey::create()
                                    .name("fk_slots_page")
                                    .from(StatusListSlots::Table, StatusListSlots::PageId)
                                    .to(StatusListPages::Table, StatusListPages::Id)
                                    .on_delete(ForeignKeyAction::Cascade),
                            )
                            .to_owned(),
                    )
                    .await?;

                // First-free scans
                manager
                    .create_index(
                        Index::create()
                            .name("idx_slots_free")
                            .table(StatusListSlots::Table)
                            .col(StatusListSlots::PageId)
                            .col(StatusListSlots::Assigned)
                            .col(StatusListSlots::SlotIndex)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_table(
                        Table::create()
                            .table(CredentialStatuses::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(CredentialStatuses::CredentialId)
                                    .string()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(CredentialStatuses::StatusPurpose)
                                    .string()
                                    .not_null(),
                            )
                            .col(ColumnDef::new(CredentialStatuses::PageId).string().not_null())
                            .col(
                                ColumnDef::new(CredentialStatuses::SlotIndex)
                                    .big_integer()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(CredentialStatuses::StatusValue)
                                    .boolean()
                                    .not_null()
                                    .default(false),
                            )
                            .col(
                                ColumnDef::new(CredentialStatuses::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(CredentialStatuses::UpdatedAt)
                                    .timestamp_with_time_zone()
                                    .null(),
                            )
                            .primary_key(
                                Index::create()
                                    .col(CredentialStatuses::CredentialId)
                                    .col(CredentialStatuses::StatusPurpose),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .name("idx_statuses_page")
                            .table(CredentialStatuses::Table)
                            .col(CredentialStatuses::PageId)
                            .col(CredentialStatuses::StatusValue)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_table(
                        Table::create()
                            .table(StatusTransactions::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(StatusTransactions::Id)
                                    .big_integer()
                                    .not_null()
                                    .auto_increment()
                                    .primary_key(),
                            )
                            .col(
                                ColumnDef::new(StatusTransactions::CredentialId)
                                    .string()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusTransactions::StatusPurpose)
                                    .string()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusTransactions::StatusValue)
                                    .boolean()
                                    .not_null(),
                            )
                            .col(ColumnDef::new(StatusTransactions::PageId).string().not_null())
                            .col(
                                ColumnDef::new(StatusTransactions::SlotIndex)
                                    .big_integer()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(StatusTransactions::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .name("idx_transactions_created")
                            .table(StatusTransactions::Table)
                            .col(StatusTransactions::CreatedAt)
                            .col(StatusTransactions::Id)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_table(
                        Table::create()
                            .table(Ledger::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(Ledger::CredentialId)
                                    .string()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(ColumnDef::new(Ledger::IssuerId).string().not_null())
                            .col(ColumnDef::new(Ledger::CredentialType).string().not_null())
                            .col(
                                ColumnDef::new(Ledger::IssueDate)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(Ledger::ExpirationDate)
                                    .timestamp_with_time_zone()
                                    .null(),
                            )
                            .col(ColumnDef::new(Ledger::IndexedAttributes).json_binary().not_null())
                            .col(ColumnDef::new(Ledger::StatusBindings).json_binary().not_null())
                            .col(
                                ColumnDef::new(Ledger::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .name("idx_ledger_issuer_type")
                            .table(Ledger::Table)
                            .col(Ledger::IssuerId)
                            .col(Ledger::CredentialType)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;

                // Containment search on the jsonb columns
                let db = manager.get_connection();
                db.execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_ledger_attributes ON ledger USING GIN (indexed_attributes jsonb_path_ops)",
                )
                .await?;
                db.execute_unprepared(
                    "CREATE INDEX IF NOT EXISTS idx_ledger_bindings ON ledger USING GIN (status_bindings jsonb_path_ops)",
                )
                .await?;

                Ok(())
            }

            async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                manager
                    .drop_table(Table::drop().table(Ledger::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(StatusTransactions::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(CredentialStatuses::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(StatusListSlots::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(StatusListPages::Table).to_owned())
                    .await?;
                Ok(())
            }
        }

        #[derive(Iden)]
        enum StatusListPages {
            Table,
            Id,
            VcDocument,
            CredentialType,
            StatusPurpose,
            Capacity,
            State,
            Version,
            CreatedAt,
            UpdatedAt,
        }

        #[derive(Iden)]
        enum StatusListSlots {
            Table,
            PageId,
            SlotIndex,
            Assigned,
            CreatedAt,
            UpdatedAt,
        }

        #[derive(Iden)]
        enum CredentialStatuses {
            Table,
            CredentialId,
            StatusPurpose,
            PageId,
            SlotIndex,
            StatusValue,
            CreatedAt,
            UpdatedAt,
        }

        #[derive(Iden)]
        enum StatusTransactions {
            Table,
            Id,
            CredentialId,
            StatusPurpose,
            StatusValue,
            PageId,
            SlotIndex,
            CreatedAt,
        }

        #[derive(Iden)]
        enum Ledger {
            Table,
            CredentialId,
            IssuerId,
            CredentialType,
            IssueDate,
            ExpirationDate,
            IndexedAttributes,
            StatusBindings,
            CreatedAt,
        }
    }
}
