use sea_orm_migration::prelude::*;

use crate::m20240301_000001_create_catalog_tables::Warehouses;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProductionOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductionOrders::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductionOrders::Code).string().not_null())
                    .col(
                        ColumnDef::new(ProductionOrders::Status)
                            .string()
                            .not_null()
                            .default("open"),
                    )
                    .col(ColumnDef::new(ProductionOrders::WarehouseId).uuid().not_null())
                    .col(ColumnDef::new(ProductionOrders::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(ProductionOrders::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_production_orders_warehouse")
                            .from(ProductionOrders::Table, ProductionOrders::WarehouseId)
                            .to(Warehouses::Table, Warehouses::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductionOrderMaterials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::ProductionOrderId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::ProductId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::Name)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterials::TotalReserved)
                            .decimal_len(16, 4)
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_materials_production_order")
                            .from(
                                ProductionOrderMaterials::Table,
                                ProductionOrderMaterials::ProductionOrderId,
                            )
                            .to(ProductionOrders::Table, ProductionOrders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductionOrderMaterialReserves::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::MaterialId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::Position)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::StockId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::WarehouseId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::BatchId)
                            .uuid()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ProductionOrderMaterialReserves::Quantity)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_material_reserves_material")
                            .from(
                                ProductionOrderMaterialReserves::Table,
                                ProductionOrderMaterialReserves::MaterialId,
                            )
                            .to(ProductionOrderMaterials::Table, ProductionOrderMaterials::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ProductionOrderMaterialReserves::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProductionOrderMaterials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProductionOrders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProductionOrders {
    Table,
    Id,
    Code,
    Status,
    WarehouseId,
    ProductId,
    Quantity,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductionOrderMaterials {
    Table,
    Id,
    ProductionOrderId,
    Position,
    ProductId,
    Name,
    Quantity,
    TotalReserved,
}

#[derive(DeriveIden)]
enum ProductionOrderMaterialReserves {
    Table,
    Id,
    MaterialId,
    Position,
    StockId,
    WarehouseId,
    BatchId,
    Quantity,
}
