//! Example driver for `entitystore_core`.
//!
//! # Responsibility
//! - Replay a small stock-keeping day against a store file.
//! - Print the resulting stock levels and low-stock alerts.
//!
//! Usage: `entitystore_cli [store_path]`
//! Environment: `ENTITYSTORE_LOG_DIR` (absolute) enables file logging,
//! `ENTITYSTORE_LOG_LEVEL` overrides the default level.

use entitystore_core::{
    core_version, default_log_level, init_logging, ChangeLogObserver, Entity, EntityManager,
    InventoryItem, LowStockAlertObserver, ManagerResult, SchemaRegistry,
};
use std::process::ExitCode;
use std::rc::Rc;

const DEFAULT_STORE_PATH: &str = "data_store_file.data";
const CHANGE_LOG_PATH: &str = "logger_file.txt";

const STARTING_STOCK: [(&str, f64, f64); 5] = [
    ("abc-4589", 5.67, 7.27),
    ("hjg-3821", 7.89, 12.00),
    ("xrf-3827", 15.27, 19.99),
    ("eer-4521", 8.45, 1.03),
    ("qws-6783", 3.00, 4.97),
];

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("ENTITYSTORE_LOG_DIR") {
        let level = std::env::var("ENTITYSTORE_LOG_LEVEL")
            .unwrap_or_else(|_| default_log_level().to_string());
        if let Err(err) = init_logging(&level, &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let store_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_STORE_PATH.to_string());

    match run(&store_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("entitystore_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(store_path: &str) -> ManagerResult<()> {
    println!("entitystore_core version={}", core_version());

    let mut manager =
        EntityManager::open_path(store_path, SchemaRegistry::new().with::<InventoryItem>())?;
    let change_log = Rc::new(ChangeLogObserver::new(CHANGE_LOG_PATH));
    let alerts = Rc::new(LowStockAlertObserver::default());
    manager.attach(change_log.clone());
    manager.attach(alerts.clone());

    let mut items = Vec::with_capacity(STARTING_STOCK.len());
    for (sku, cost, sale_price) in STARTING_STOCK {
        let item = match manager.find::<InventoryItem>(sku) {
            Some(existing) => existing,
            None => Entity::create(&mut manager, &InventoryItem::new(sku, 0, cost, sale_price))?,
        };
        items.push(item);
    }

    let [item1, item2, item3, item4, item5] = [items[0], items[1], items[2], items[3], items[4]];
    item1.items_received(&mut manager, 4)?;
    item2.items_received(&mut manager, 2)?;
    item3.items_received(&mut manager, 12)?;
    item4.items_received(&mut manager, 20)?;
    item5.items_received(&mut manager, 1)?;

    item3.items_have_shipped(&mut manager, 5)?;
    item4.items_have_shipped(&mut manager, 16)?;
    item4.change_sale_price(&mut manager, 0.87)?;

    let written = manager.update_store()?;

    manager.detach(&change_log);
    manager.detach(&alerts);

    for alert in alerts.alerts() {
        println!("{}", alert.message());
    }
    for item in &items {
        let stock = item.read(&manager)?;
        println!(
            "sku={} qoh={} cost={:.2} sale_price={:.2}",
            stock.sku, stock.qoh, stock.cost, stock.sale_price
        );
    }
    println!("flushed {written} record(s) to {store_path}");
    Ok(())
}
