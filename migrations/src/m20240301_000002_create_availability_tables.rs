use sea_orm_migration::prelude::*;

use crate::m20240301_000001_create_catalog_tables::{Batches, Products};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Availabilities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Availabilities::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Availabilities::ProductId).uuid().not_null())
                    .col(ColumnDef::new(Availabilities::StockId).uuid().not_null())
                    .col(ColumnDef::new(Availabilities::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(Availabilities::BatchId).uuid().null())
                    .col(
                        ColumnDef::new(Availabilities::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Availabilities::Price)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Availabilities::TotalReserved)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Availabilities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Availabilities::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_availabilities_product")
                            .from(Availabilities::Table, Availabilities::ProductId)
                            .to(Products::Table, Products::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_availabilities_batch")
                            .from(Availabilities::Table, Availabilities::BatchId)
                            .to(Batches::Table, Batches::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_availabilities_product_warehouse_stock")
                    .table(Availabilities::Table)
                    .col(Availabilities::ProductId)
                    .col(Availabilities::WarehouseId)
                    .col(Availabilities::StockId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AvailabilityReserves::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AvailabilityReserves::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AvailabilityReserves::AvailabilityId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AvailabilityReserves::ProductionOrderId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AvailabilityReserves::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AvailabilityReserves::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_availability_reserves_availability")
                            .from(
                                AvailabilityReserves::Table,
                                AvailabilityReserves::AvailabilityId,
                            )
                            .to(Availabilities::Table, Availabilities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_availability_reserves_order")
                    .table(AvailabilityReserves::Table)
                    .col(AvailabilityReserves::ProductionOrderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AvailabilityReserves::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Availabilities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Availabilities {
    Table,
    Id,
    ProductId,
    StockId,
    WarehouseId,
    BatchId,
    Quantity,
    Price,
    TotalReserved,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AvailabilityReserves {
    Table,
    Id,
    AvailabilityId,
    ProductionOrderId,
    Position,
    Quantity,
}
