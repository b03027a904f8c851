pub mod books;

use bookshelf_db::Database;
use bookshelf_kernel::ModuleRegistry;

/// Register all application modules with the registry
pub fn register_all(registry: &mut ModuleRegistry, db: &Database) -> anyhow::Result<()> {
    registry.register(books::create_module(db.clone()))?;
    Ok(())
}
