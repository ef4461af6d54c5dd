//! Seed and generate commands.

use deskstore_core::{Database, Schema};
use deskstore_seed::{RandomDataOptions, Seeder};
use std::path::Path;
use tracing::info;

/// Resets the dashboard collections to the sample dataset.
pub fn seed(path: &Path, schema: Schema) -> Result<(), Box<dyn std::error::Error>> {
    info!("Seeding database at {:?}", path);

    let db = Database::open_path(path, schema)?;
    let report = Seeder::new(&db).seed_all()?;
    db.close()?;

    println!("✓ Seed data loaded");
    for (collection, count) in &report.inserted {
        println!("  {:<16} {}", collection, count);
    }
    println!("  Total: {}", report.total());

    Ok(())
}

/// Appends random task records.
pub fn generate(
    path: &Path,
    schema: Schema,
    count: usize,
    seed: Option<u64>,
    collection: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = RandomDataOptions::new(count).collection(collection);
    if let Some(seed) = seed {
        options = options.seed(seed);
    }

    let db = Database::open_path(path, schema)?;
    let keys = Seeder::new(&db).generate_random_data(&options)?;
    db.close()?;

    println!(
        "✓ Generated {} records in '{}'",
        keys.len(),
        options.collection
    );
    if let (Some(first), Some(last)) = (keys.first(), keys.last()) {
        println!("  Keys: {} .. {}", first, last);
    }

    Ok(())
}
