//! Show store counts and accumulated API spend.

use voxtask_config::Settings;
use voxtask_store::Database;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let db = Database::open(&settings.database_path).await?;

    let stats = db.tasks().stats().await?;
    let messages = db.history().count().await?;
    let (invocations, total_cost) = db.costs().totals().await?;

    println!("voxtask status");
    println!("  database:   {}", settings.database_path);
    println!("  model:      {}", settings.model);
    println!();
    println!("  tasks:      {} total", stats.total);
    println!("    todo:        {}", stats.todo);
    println!("    in progress: {}", stats.in_progress);
    println!("    completed:   {}", stats.completed);
    println!("    cancelled:   {}", stats.cancelled);
    println!("    upcoming:    {}", stats.upcoming_deadlines);
    println!("    missed:      {}", stats.missed);
    println!();
    println!("  history:    {messages} messages");
    println!("  API spend:  ${total_cost:.6} over {invocations} invocations");

    Ok(())
}
