//! Catalog command implementation

use anyhow::Result;

use streakvault::catalog::CATALOG;

/// Print the purchasable challenge catalog
pub fn catalog_command() -> Result<()> {
    println!(
        "{:>8}  {:<9}  {:>8}  {:>9}  {}",
        "tier", "curve", "price", "min odds", "rewards per level"
    );
    for entry in CATALOG {
        let rewards = entry
            .rewards_cents
            .iter()
            .map(|c| format!("{:.0}", *c as f64 / 100.0))
            .collect::<Vec<_>>()
            .join(" / ");
        println!(
            "{:>8}  {:<9}  {:>8.2}  {:>9.2}  {}",
            entry.tier.notional(),
            entry.difficulty.as_str(),
            entry.price_cents as f64 / 100.0,
            entry.difficulty.min_odds(),
            rewards
        );
    }
    Ok(())
}
