use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_procurement_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Vendors::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Vendors::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Vendors::CompanyName).string().not_null())
                    .col(ColumnDef::new(Vendors::ContactName).string().null())
                    .col(ColumnDef::new(Vendors::ContactEmail).string().null())
                    .col(ColumnDef::new(Vendors::ContactPhone).string().null())
                    .col(
                        ColumnDef::new(Vendors::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Vendors::PaymentTerms).string().null())
                    .col(
                        ColumnDef::new(Vendors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Vendors::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PurchaseRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PurchaseRequests::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PurchaseRequests::ProjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(PurchaseRequests::RequesterId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::ItemDescription)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::Quantity)
                            .decimal_len(18, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::UnitOfMeasure)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::EstimatedCost)
                            .decimal_len(18, 2)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::RequiredDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::Urgency)
                            .string_len(16)
                            .not_null()
                            .default("normal"),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::Status)
                            .string_len(32)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(PurchaseRequests::Justification).text().null())
                    .col(
                        ColumnDef::new(PurchaseRequests::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseRequests::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_purchase_requests_project_status")
                    .table(PurchaseRequests::Table)
                    .col(PurchaseRequests::ProjectId)
                    .col(PurchaseRequests::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PurchaseOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PurchaseOrders::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PurchaseOrders::PoNumber).string().not_null())
                    .col(ColumnDef::new(PurchaseOrders::RequestId).uuid().not_null())
                    .col(ColumnDef::new(PurchaseOrders::ProjectId).uuid().not_null())
                    .col(ColumnDef::new(PurchaseOrders::VendorId).uuid().not_null())
                    .col(
                        ColumnDef::new(PurchaseOrders::TotalAmount)
                            .decimal_len(18, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PurchaseOrders::PoDate).date().not_null())
                    .col(
                        ColumnDef::new(PurchaseOrders::ExpectedDeliveryDate)
                            .date()
                            .null(),
                    )
                    .col(ColumnDef::new(PurchaseOrders::Terms).text().null())
                    .col(
                        ColumnDef::new(PurchaseOrders::Status)
                            .string_len(32)
                            .not_null()
                            .default("draft"),
                    )
                    .col(ColumnDef::new(PurchaseOrders::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(PurchaseOrders::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(PurchaseOrders::StatusChangedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseOrders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseOrders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One order per request.
        manager
            .create_index(
                Index::create()
                    .name("idx_purchase_orders_request_id")
                    .table(PurchaseOrders::Table)
                    .col(PurchaseOrders::RequestId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_purchase_orders_po_number")
                    .table(PurchaseOrders::Table)
                    .col(PurchaseOrders::PoNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DeliveryConfirmations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryConfirmations::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::PurchaseOrderId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::DeliveryDate)
                            .date()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::QuantityReceived)
                            .decimal_len(18, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::ConfirmedBy)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::ConditionNotes)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::PhotoRefs)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::Status)
                            .string_len(32)
                            .not_null()
                            .default("received"),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryConfirmations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_confirmations_purchase_order")
                            .from(
                                DeliveryConfirmations::Table,
                                DeliveryConfirmations::PurchaseOrderId,
                            )
                            .to(PurchaseOrders::Table, PurchaseOrders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_confirmations_order")
                    .table(DeliveryConfirmations::Table)
                    .col(DeliveryConfirmations::PurchaseOrderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryConfirmations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PurchaseRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Vendors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Vendors {
    Table,
    Id,
    CompanyName,
    ContactName,
    ContactEmail,
    ContactPhone,
    IsActive,
    PaymentTerms,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PurchaseRequests {
    Table,
    Id,
    ProjectId,
    RequesterId,
    ItemDescription,
    Quantity,
    UnitOfMeasure,
    EstimatedCost,
    RequiredDate,
    Urgency,
    Status,
    Justification,
    Version,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PurchaseOrders {
    Table,
    Id,
    PoNumber,
    RequestId,
    ProjectId,
    VendorId,
    TotalAmount,
    PoDate,
    ExpectedDeliveryDate,
    Terms,
    Status,
    CreatedBy,
    Version,
    StatusChangedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DeliveryConfirmations {
    Table,
    Id,
    PurchaseOrderId,
    DeliveryDate,
    QuantityReceived,
    ConfirmedBy,
    ConditionNotes,
    PhotoRefs,
    Status,
    CreatedAt,
    UpdatedAt,
}
