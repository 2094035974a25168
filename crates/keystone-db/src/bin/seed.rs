//! # Seed Data Generator
//!
//! Populates a database with a demo company for development.
//!
//! ## Usage
//! ```bash
//! # One company, two locations, 200 products (default)
//! cargo run -p keystone-db --bin seed
//!
//! # Custom amount
//! cargo run -p keystone-db --bin seed -- --count 1000
//!
//! # Specify database path
//! cargo run -p keystone-db --bin seed -- --db ./data/keystone.db
//! ```
//!
//! ## Generated Data
//! - Company "Demo Trading" with a "Warehouse" and a "Shop" location
//! - Taxes at 0%, 5% and 8%
//! - Products across a few categories, SKU `{CATEGORY}-{INDEX}`
//! - Opening stock in the warehouse (movement cause `adjustment`)
//! - A 10% promotion on sales over $50

use chrono::Utc;
use std::env;
use tracing_subscriber::EnvFilter;

use keystone_core::promotion::{ApplicableTo, DiscountType};
use keystone_core::{MovementCause, Quantity};
use keystone_db::repository::catalog::{NewProduct, NewPromotion};
use keystone_db::repository::stock::{self, MovementContext};
use keystone_db::{Database, DbConfig};

const CATEGORIES: &[(&str, &[&str])] = &[
    ("BEV", &["Cola", "Lemonade", "Iced Tea", "Sparkling Water", "Orange Juice"]),
    ("SNK", &["Potato Chips", "Pretzels", "Trail Mix", "Granola Bar", "Popcorn"]),
    ("HW", &["Hammer", "Screwdriver Set", "Tape Measure", "Utility Knife", "Wrench"]),
    ("STA", &["Notebook", "Ballpoint Pens", "Stapler", "Sticky Notes", "Binder"]),
];

/// Tax rates in basis points
const TAX_RATES: &[(&str, i64)] = &[("Exempt", 0), ("Reduced", 500), ("Standard", 800)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./keystone_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Keystone Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./keystone_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Keystone Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let catalog = db.catalog();
    let company = catalog.insert_company("Demo Trading").await?;
    let warehouse = catalog.insert_location(company.id, "Warehouse").await?;
    let shop = catalog.insert_location(company.id, "Shop").await?;
    catalog.insert_customer(company.id, "Walk-in Regular").await?;
    println!(
        "✓ Company {} with locations {} and {}",
        company.id, warehouse.id, shop.id
    );

    let mut taxes = Vec::with_capacity(TAX_RATES.len());
    for (name, bps) in TAX_RATES {
        taxes.push(catalog.insert_tax(company.id, name, *bps).await?);
    }

    let mut category_ids = Vec::with_capacity(CATEGORIES.len());
    for (code, _) in CATEGORIES {
        category_ids.push(catalog.insert_category(company.id, code).await?.id);
    }

    // Round-robin over categories so a small count still covers all of them.
    let mut products = Vec::with_capacity(count);
    for seed in 0..count {
        let slot = seed % CATEGORIES.len();
        let (code, names) = CATEGORIES[slot];
        let round = seed / CATEGORIES.len();
        let base = names[round % names.len()];
        let name = match round / names.len() {
            0 => base.to_string(),
            n => format!("{} #{}", base, n + 1),
        };

        let product = catalog
            .insert_product(&NewProduct {
                company_id: company.id,
                category_id: Some(category_ids[slot]),
                sku: format!("{}-{:05}", code, seed),
                name,
                price_cents: 199 + ((seed * 37) % 2000) as i64,
                tax_id: Some(taxes[seed % taxes.len()].id),
            })
            .await?;
        products.push(product);
    }
    println!("✓ Generated {} products", products.len());

    let now = Utc::now();
    let mut tx = db.begin().await?;
    for (idx, product) in products.iter().enumerate() {
        let ctx = MovementContext {
            cause: MovementCause::Adjustment,
            reference: Some("SEED"),
            user_id: None,
            at: now,
        };
        stock::adjust(&mut tx, warehouse.id, product.id, Quantity::from_units(10 + (idx % 90) as i64), ctx).await?;
    }
    tx.commit().await?;
    println!("✓ Opening stock recorded in warehouse");

    catalog
        .insert_promotion(&NewPromotion {
            company_id: company.id,
            name: "10% over $50".to_string(),
            discount_type: DiscountType::Percentage,
            value: 1000,
            min_amount_cents: Some(5000),
            applicable_to: ApplicableTo::All,
            product_ids: Vec::new(),
            category_ids: Vec::new(),
        })
        .await?;
    println!("✓ Promotion created");

    println!();
    println!("✓ Seed complete!");
    db.close().await;
    Ok(())
}
