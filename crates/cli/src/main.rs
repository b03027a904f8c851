use anyhow::Context;
use bookshelf_kernel::settings::Settings;
use clap::{Parser, Subcommand};

/// Book catalog service
#[derive(Debug, Parser)]
#[command(name = "bookshelf-cli", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Apply pending database migrations and exit
    Migrate,
    /// Print the HTTP paths served by the registered modules
    Routes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().with_context(|| "failed to load bookshelf settings")?;
    bookshelf_telemetry::init(&settings.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => bookshelf_app::serve(settings).await,
        Command::Migrate => {
            let db = bookshelf_app::open_database(&settings)?;
            let registry = bookshelf_app::build_registry(&db)?;
            let applied = bookshelf_app::migrate(&registry, &db).await?;
            drop(registry);
            db.close().context("failed to close database")?;

            println!("applied {} migration(s)", applied);
            Ok(())
        }
        Command::Routes => {
            let db = bookshelf_app::open_database(&settings)?;
            let registry = bookshelf_app::build_registry(&db)?;
            let mut paths =
                bookshelf_http::router::mounted_paths(&registry, &settings.server.api_prefix);
            paths.sort();
            for path in paths {
                println!("{}", path);
            }
            Ok(())
        }
    }
}
