//! # Catalog Loader
//!
//! Loads the stall catalog into the shared store.
//!
//! ## Usage
//! ```bash
//! # Load into ./festive_dev.db (default)
//! cargo run -p festive-db --bin seed
//!
//! # Specify database path
//! cargo run -p festive-db --bin seed -- --db ./data/festive.db
//! ```
//!
//! ## What It Does
//! 1. Marks every product inactive
//! 2. Upserts each catalog entry by exact name (price, category, stock) and
//!    reactivates it
//! 3. Ensures the "Venta manual" product exists, so manual lines have a
//!    catalog row to be booked against
//!
//! Products that are no longer in the catalog stay inactive; their past
//! sales keep referencing them.

use std::env;

use festive_core::MANUAL_PRODUCT_MARKER;
use festive_db::{Database, DbConfig};

/// (name, price, category, stock)
const CATALOG: &[(&str, i64, &str, i64)] = &[
    // Cascadas
    ("Cascada blanca 100", 5500, "Cascadas", 6),
    ("Cascada calida 100", 5500, "Cascadas", 9),
    ("Cascada multi 100", 5500, "Cascadas", 10),
    ("Cascada blanca 200", 6500, "Cascadas", 6),
    ("Cascada multi 200", 6500, "Cascadas", 7),
    ("Cascada estrella 120", 8500, "Cascadas", 6),
    // Leds
    ("Led rojo 100", 2500, "Leds", 5),
    ("Led azul 100", 2500, "Leds", 8),
    ("Led blanco 100", 2500, "Leds", 4),
    ("Led calido 100", 2500, "Leds", 1),
    ("Led multi 100", 2500, "Leds", 10),
    ("Led multi 200", 3500, "Leds", 3),
    // Solar
    ("Luz solar gota calida", 3500, "Solar", 3),
    ("Luz solar gota multi", 3500, "Solar", 3),
    // Cenefa
    ("Cenefa estrella blanca 120", 6000, "Cenefa", 4),
    ("Cenefa estrella calida 120", 6000, "Cenefa", 2),
    // Manguera
    ("Manguera calida", 8000, "Manguera", 3),
    ("Manguera multi", 8000, "Manguera", 4),
    // Otros
    ("Rapidita multi 100", 10000, "Otros", 9),
    ("Malla multi 144", 7000, "Otros", 5),
    ("Meteorito calida", 7000, "Otros", 3),
    ("Luz ampolleta jardin", 13000, "Otros", 7),
    // Bolsas
    ("Bolsas pequena", 500, "Bolsas", 12),
    ("Bolsa mediana", 1000, "Bolsas", 12),
    ("Bolsa grande", 1500, "Bolsas", 12),
    // Esferas
    ("9 esferas diseno verde", 5000, "Esferas", 2),
    ("7 esferas dorado", 5000, "Esferas", 2),
    // Decoracion
    ("Guirnalda verde", 1500, "Decoracion", 16),
];

/// Catalog row manual lines are mapped onto.
const MANUAL_PRODUCT: (&str, i64, &str, i64) = ("Venta manual", 0, "Manual", 0);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./festive_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Festive POS Catalog Loader");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./festive_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🎄 Festive POS Catalog Loader");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Entries:  {}", CATALOG.len());
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let products = db.products();
    let deactivated = products.deactivate_all().await?;
    println!("✓ Deactivated {} existing products", deactivated);

    let mut updated = 0;
    let mut inserted = 0;

    for (name, price, category, stock) in CATALOG {
        match products.upsert_by_name(name, *price, Some(category), *stock).await {
            Ok(true) => inserted += 1,
            Ok(false) => updated += 1,
            Err(e) => eprintln!("Failed to load {}: {}", name, e),
        }
    }

    let (name, price, category, stock) = MANUAL_PRODUCT;
    if products.upsert_by_name(name, price, Some(category), stock).await? {
        inserted += 1;
    } else {
        updated += 1;
    }

    println!();
    println!("✓ Updated {}, inserted {}", updated, inserted);
    println!("  Active products: {}", products.count().await?);

    match products.find_by_name_marker(MANUAL_PRODUCT_MARKER).await? {
        Some(manual) => println!("  Manual sales book against #{} {}", manual.id, manual.name),
        None => println!("⚠ No product matches '{}'", MANUAL_PRODUCT_MARKER),
    }

    Ok(())
}
