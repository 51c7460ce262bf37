//! Product catalog service

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    listing_filter, validate_initial_quantity, validate_required_text, validate_unit_price,
    Permissions, Product,
};
use uuid::Uuid;
use validator::Validate;

use super::{PermissionService, StockContext};
use crate::error::{AppError, AppResult};
use crate::store::ProductFilter;

#[derive(Clone)]
pub struct ProductService {
    ctx: StockContext,
    permissions: PermissionService,
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    pub structure_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub unit: String,
    pub description: Option<String>,
    pub initial_quantity: i64,
    pub price: Option<Decimal>,
}

/// Input for updating descriptive product fields
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub unit: String,
    pub description: Option<String>,
}

impl ProductService {
    pub fn new(ctx: StockContext) -> Self {
        let permissions = PermissionService::new(ctx.directory.clone());
        Self { ctx, permissions }
    }

    /// Create a product; its current quantity starts at the initial quantity.
    pub async fn create_product(
        &self,
        permissions: &Permissions,
        input: CreateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;
        let structure = self
            .permissions
            .require_manage(permissions, input.structure_id)
            .await?;

        validate_required_text(&input.name)
            .map_err(|msg| AppError::validation("name", msg, "Le nom est obligatoire"))?;
        validate_initial_quantity(input.initial_quantity).map_err(|msg| {
            AppError::validation(
                "initial_quantity",
                msg,
                "La quantité initiale ne peut pas être négative",
            )
        })?;
        if let Some(price) = input.price {
            validate_unit_price(price).map_err(|msg| {
                AppError::validation("price", msg, "Le prix ne peut pas être négatif")
            })?;
        }

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            unit: input.unit.trim().to_string(),
            description: input.description,
            quantity: input.initial_quantity,
            initial_quantity: input.initial_quantity,
            price: input.price,
            structure_id: structure.id,
            ministere_id: structure.ministere_id,
            created_at: now,
            updated_at: now,
        };
        self.ctx.store.insert_product(&product).await?;

        tracing::info!(product_id = %product.id, structure_id = %structure.id, "product created");
        Ok(product)
    }

    pub async fn get_product(&self, permissions: &Permissions, product_id: Uuid) -> AppResult<Product> {
        let product = self
            .ctx
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {}", product_id)))?;
        self.permissions
            .require_read(permissions, product.structure_id)
            .await?;
        Ok(product)
    }

    pub async fn list_products(
        &self,
        permissions: &Permissions,
        structure_id: Option<Uuid>,
    ) -> AppResult<Vec<Product>> {
        if let Some(structure_id) = structure_id {
            self.permissions.require_read(permissions, structure_id).await?;
        }
        let filter = ProductFilter {
            listing: listing_filter(permissions),
            structure_id,
        };
        self.ctx.store.list_products(&filter).await
    }

    pub async fn update_product(
        &self,
        permissions: &Permissions,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;
        let product = self.get_product(permissions, product_id).await?;
        self.permissions
            .require_manage(permissions, product.structure_id)
            .await?;

        self.ctx
            .store
            .update_product_details(
                product_id,
                input.name.trim(),
                input.unit.trim(),
                input.description.as_deref(),
            )
            .await
    }

    /// Products referenced by the ledger or by requests cannot be deleted.
    pub async fn delete_product(&self, permissions: &Permissions, product_id: Uuid) -> AppResult<()> {
        let product = self.get_product(permissions, product_id).await?;
        self.permissions
            .require_manage(permissions, product.structure_id)
            .await?;
        self.ctx.store.delete_product(product_id).await?;

        tracing::info!(%product_id, "product deleted");
        Ok(())
    }
}
