//! Result cache commands.

use console::style;

use super::super::helpers::AppContext;

pub async fn cmd_cache_stats(ctx: &AppContext) -> anyhow::Result<()> {
    let stats = ctx.cache.stats().await;
    let total = stats.hits + stats.misses;
    let hit_rate = if total > 0 {
        (stats.hits as f64 / total as f64) * 100.0
    } else {
        0.0
    };
    println!("Cache: {} entries", stats.entries);
    println!("  hits:     {}", stats.hits);
    println!("  misses:   {}", stats.misses);
    println!("  hit rate: {hit_rate:.1}%");
    Ok(())
}

pub async fn cmd_cache_clear(ctx: &AppContext) -> anyhow::Result<()> {
    let removed = ctx.cache.clear().await;
    println!("{} Cleared {} cached results", style("✓").green(), removed);
    Ok(())
}
