//! Shared fixtures for the integration tests
//!
//! Builds services on the in-memory adapters with one ministry holding two
//! structures, plus a structure of another ministry.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use shared::{
    resolve_scope, LedgerEntry, Permissions, Product, RequestDetails, Role, StructureRef,
    UserIdentity,
};
use stock_backend::events::StockEvents;
use stock_backend::external::InMemoryDocumentStore;
use stock_backend::services::workflow::CreateRequestInput;
use stock_backend::services::StockContext;
use stock_backend::store::{InMemoryDirectory, InMemoryStore, LedgerFilter, StockStore};
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub documents: Arc<InMemoryDocumentStore>,
    pub ctx: StockContext,
    pub structure: StructureRef,
    pub sibling: StructureRef,
    pub foreign: StructureRef,
}

pub fn structure(ministere_id: Uuid, name: &str, abbreviation: Option<&str>) -> StructureRef {
    StructureRef {
        id: Uuid::new_v4(),
        ministere_id,
        name: name.to_string(),
        abbreviation: abbreviation.map(str::to_string),
        ministere_abbreviation: Some("MS".to_string()),
    }
}

impl Harness {
    pub fn new() -> Self {
        let ministere_id = Uuid::new_v4();
        let main = structure(ministere_id, "Hôpital National", Some("HN"));
        let sibling = structure(ministere_id, "Centre de Santé", Some("CS"));
        let foreign = structure(Uuid::new_v4(), "Lycée Central", None);

        let store = Arc::new(InMemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new(vec![
            main.clone(),
            sibling.clone(),
            foreign.clone(),
        ]));
        let documents = Arc::new(InMemoryDocumentStore::new());
        let ctx = StockContext {
            store: store.clone(),
            directory: directory.clone(),
            documents: documents.clone(),
            events: StockEvents::new(64),
        };

        Self {
            store,
            directory,
            documents,
            ctx,
            structure: main,
            sibling,
            foreign,
        }
    }

    pub fn user_in(&self, role: Role, structure: &StructureRef) -> Permissions {
        resolve_scope(&UserIdentity {
            user_id: Uuid::new_v4(),
            role_name: Some(role.label().to_string()),
            is_admin: false,
            is_approved: true,
            structure_id: Some(structure.id),
            ministere_id: Some(structure.ministere_id),
        })
    }

    /// User attached to the main structure
    pub fn user(&self, role: Role) -> Permissions {
        self.user_in(role, &self.structure)
    }

    pub fn admin(&self) -> Permissions {
        resolve_scope(&UserIdentity {
            user_id: Uuid::new_v4(),
            role_name: None,
            is_admin: true,
            is_approved: true,
            structure_id: None,
            ministere_id: None,
        })
    }

    pub async fn product_in(&self, structure: &StructureRef, quantity: i64) -> Product {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: format!("Produit {}", &Uuid::new_v4().to_string()[..8]),
            unit: "carton".to_string(),
            description: None,
            quantity,
            initial_quantity: quantity,
            price: None,
            structure_id: structure.id,
            ministere_id: structure.ministere_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_product(&product).await.unwrap();
        product
    }

    /// Product of the main structure
    pub async fn product(&self, quantity: i64) -> Product {
        let structure = self.structure.clone();
        self.product_in(&structure, quantity).await
    }

    pub async fn reload(&self, product_id: Uuid) -> Product {
        self.store.get_product(product_id).await.unwrap().unwrap()
    }

    pub async fn ledger(&self, product_id: Uuid) -> Vec<LedgerEntry> {
        self.store
            .list_ledger(&LedgerFilter {
                listing: shared::ListingFilter::Everything,
                structure_id: None,
                product_id: Some(product_id),
                period: None,
            })
            .await
            .unwrap()
    }
}

pub fn replenishment_input(product: &Product, quantity: i64, unit_price: i64) -> CreateRequestInput {
    CreateRequestInput {
        structure_id: product.structure_id,
        product_id: product.id,
        quantity,
        observations: None,
        details: RequestDetails::Replenishment {
            supplier_name: "SOMELEC Fournitures".to_string(),
            supplier_tax_id: Some("NIF-0042".to_string()),
            unit_price: Decimal::from(unit_price),
        },
    }
}

pub fn disbursement_input(product: &Product, quantity: i64) -> CreateRequestInput {
    CreateRequestInput {
        structure_id: product.structure_id,
        product_id: product.id,
        quantity,
        observations: None,
        details: RequestDetails::Disbursement {
            beneficiary_name: "Service des urgences".to_string(),
            beneficiary_phone: Some("+222 45 25 10 10".to_string()),
            requested_date: Utc::now().date_naive(),
            external_reference: None,
            reason: Some("Dotation mensuelle".to_string()),
        },
    }
}
