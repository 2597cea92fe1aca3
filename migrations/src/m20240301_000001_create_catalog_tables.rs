use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Products::Name).string().not_null())
                    .col(
                        ColumnDef::new(Products::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Products::UnitConversionRate)
                            .decimal_len(16, 8)
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Products::ManageBatches)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Products::ExpirationDays).integer().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Stocks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Stocks::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Stocks::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Warehouses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Warehouses::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Warehouses::Name).string().not_null())
                    .to_owned(),
            )
            .await?;

        // Stock assignment plus the per-warehouse probe order.
        manager
            .create_table(
                Table::create()
                    .table(WarehouseStocks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WarehouseStocks::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WarehouseStocks::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(WarehouseStocks::StockId).uuid().not_null())
                    .col(ColumnDef::new(WarehouseStocks::Priority).integer().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_warehouse_stocks_warehouse")
                            .from(WarehouseStocks::Table, WarehouseStocks::WarehouseId)
                            .to(Warehouses::Table, Warehouses::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_warehouse_stocks_stock")
                            .from(WarehouseStocks::Table, WarehouseStocks::StockId)
                            .to(Stocks::Table, Stocks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_warehouse_stocks_unique")
                    .table(WarehouseStocks::Table)
                    .col(WarehouseStocks::WarehouseId)
                    .col(WarehouseStocks::StockId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Batches::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Batches::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Batches::Name).string().not_null())
                    .col(ColumnDef::new(Batches::ProductId).uuid().not_null())
                    .col(ColumnDef::new(Batches::Price).decimal_len(16, 4).not_null())
                    .col(ColumnDef::new(Batches::ExpirationDay).date().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_batches_product")
                            .from(Batches::Table, Batches::ProductId)
                            .to(Products::Table, Products::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batches_name_product")
                    .table(Batches::Table)
                    .col(Batches::Name)
                    .col(Batches::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Batches::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WarehouseStocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Warehouses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Stocks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Products {
    Table,
    Id,
    Name,
    IsActive,
    UnitConversionRate,
    ManageBatches,
    ExpirationDays,
}

#[derive(DeriveIden)]
enum Stocks {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
pub(crate) enum Warehouses {
    Table,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum WarehouseStocks {
    Table,
    Id,
    WarehouseId,
    StockId,
    Priority,
}

#[derive(DeriveIden)]
pub(crate) enum Batches {
    Table,
    Id,
    Name,
    ProductId,
    Price,
    ExpirationDay,
}
