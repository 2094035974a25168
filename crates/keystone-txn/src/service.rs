//! # Keystone Service Bundle
//!
//! Wires the coordinators to one database and one side-effect processor.
//!
//! ```text
//!   KeystoneConfig ──► Database ──┬──► NumberingService ──┬──► StockLedger
//!                                 │                       ├──► SaleCoordinator ──notify──┐
//!                                 │                       └──► TransferCoordinator        │
//!                                 └──► SideEffectProcessor ◄──────────────────────────────┘
//! ```
//!
//! The processor is returned separately so the caller decides where it
//! runs (usually `tokio::spawn(processor.run())`).

use std::sync::Arc;
use tracing::info;

use keystone_db::Database;

use crate::collaborators::{SqlLedgerPoster, SqlLoyaltyAwarder};
use crate::config::KeystoneConfig;
use crate::effects::{SideEffectHandle, SideEffectProcessor};
use crate::error::TxnResult;
use crate::numbering::NumberingService;
use crate::sale::SaleCoordinator;
use crate::stock::StockLedger;
use crate::transfer::TransferCoordinator;

/// Every coordinator over one shared database.
#[derive(Clone)]
pub struct Keystone {
    pub db: Database,
    pub numbering: NumberingService,
    pub stock: StockLedger,
    pub sales: SaleCoordinator,
    pub transfers: TransferCoordinator,
    pub effects: SideEffectHandle,
}

impl Keystone {
    /// Opens the database described by `config` (running migrations) and
    /// builds the coordinators.
    pub async fn open(config: &KeystoneConfig) -> TxnResult<(Self, SideEffectProcessor)> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::with_database(db, config))
    }

    /// Builds the coordinators over an already opened database.
    pub fn with_database(db: Database, config: &KeystoneConfig) -> (Self, SideEffectProcessor) {
        let (processor, effects) = SideEffectProcessor::new(
            db.clone(),
            Arc::new(SqlLedgerPoster::new(db.clone())),
            Arc::new(SqlLoyaltyAwarder::new(
                db.clone(),
                config.loyalty.default_points_per_currency,
            )),
            config.side_effects.clone(),
        );

        let numbering = NumberingService::new(db.clone(), config.numbering.auto_provision);
        let keystone = Keystone {
            stock: StockLedger::new(db.clone(), numbering.clone()),
            sales: SaleCoordinator::new(db.clone(), numbering.clone()).with_effects(effects.clone()),
            transfers: TransferCoordinator::new(db.clone(), numbering.clone()),
            numbering,
            effects,
            db,
        };

        info!(
            auto_provision = config.numbering.auto_provision,
            max_attempts = config.side_effects.max_attempts,
            "Keystone coordinators ready"
        );
        (keystone, processor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use keystone_core::sale::{CreateSaleRequest, SaleItemRequest, VoidSaleRequest};
    use keystone_core::{Money, Quantity};

    #[tokio::test]
    async fn test_sale_effects_reach_ledger_and_loyalty() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 5).await;
        let (keystone, processor) = Keystone::with_database(fx.db.clone(), &KeystoneConfig::default());

        let req = CreateSaleRequest {
            customer_id: Some(fx.customer),
            items: vec![SaleItemRequest::product(fx.widget, Quantity::from_units(2), Money::from_cents(1000))],
            ..Default::default()
        };
        let doc = keystone.sales.create_sale(&fx.ctx(), &req).await.unwrap();

        let report = processor.drain_once().await.unwrap();
        assert_eq!(report.completed, 2);
        assert_eq!(fx.db.ledger().balance(fx.company).await.unwrap(), Money::from_cents(2000));
        let account = fx.db.loyalty().account(fx.customer).await.unwrap().unwrap();
        assert_eq!(account.points, 20);

        keystone
            .sales
            .void_sale(&fx.ctx(), doc.sale.id, &VoidSaleRequest::default())
            .await
            .unwrap();
        assert_eq!(processor.drain_once().await.unwrap().completed, 1);
        assert_eq!(fx.db.ledger().balance(fx.company).await.unwrap(), Money::zero());
        assert_eq!(fx.db.loyalty().account(fx.customer).await.unwrap().unwrap().points, 20);
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = KeystoneConfig::default();
        config.database.path = dir.path().join("keystone.db");

        let (keystone, _processor) = Keystone::open(&config).await.unwrap();
        assert!(keystone.db.health_check().await);
        assert_eq!(keystone.db.side_effects().count_pending().await.unwrap(), 0);
    }
}
