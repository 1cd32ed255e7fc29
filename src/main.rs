use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vecbridge::application::service::VectorService;
use vecbridge::cli::commands::{parse_vector, Cli, Commands};
use vecbridge::domain::values::external_id::display_id;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match cli.store.settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    let service = match vecbridge::open_service(&settings) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error initializing vecbridge: {e}");
            std::process::exit(1);
        }
    };

    let result = run_command(service.clone(), cli.command).await;
    if let Err(e) = service.close() {
        tracing::warn!(error = %e, "closing mapping store failed");
    }
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run_command(service: Arc<VectorService>, cmd: Commands) -> Result<(), Box<dyn std::error::Error>> {
    let ingest = cmd.ingest_config();
    match cmd {
        Commands::Build { input, .. } => {
            let config = ingest.ok_or("missing ingestion settings")?;
            let report = vecbridge::ingest_text_file(service, &input, &config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Search { vector, size, epsilon } => {
            let vector = parse_vector(&vector)?;
            let hits = service.search(&vector, size, epsilon)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::SearchId { id, size, epsilon } => {
            let hits = service.search_by_id(id.as_bytes(), size, epsilon)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }
        Commands::Insert { id, vector } => {
            let vector = parse_vector(&vector)?;
            let record = service.insert(&vector, id.as_bytes())?;
            service.save_index()?;
            println!("Inserted {} as handle {}", display_id(&record.external_id), record.handle);
        }
        Commands::Remove { ids } => {
            let ids: Vec<Vec<u8>> = ids.into_iter().map(String::into_bytes).collect();
            let report = service.remove_many(&ids);
            service.save_index()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Get { ids } => {
            let ids: Vec<Vec<u8>> = ids.into_iter().map(String::into_bytes).collect();
            let objects: Vec<serde_json::Value> = ids
                .iter()
                .zip(service.get_objects(&ids))
                .map(|(id, res)| match res {
                    Ok(vector) => serde_json::json!({ "id": display_id(id), "vector": vector }),
                    Err(e) => serde_json::json!({ "id": display_id(id), "error": e.to_string() }),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&objects)?);
        }
        Commands::Dimension => match service.dimension() {
            Some(d) => println!("{d}"),
            None => println!("unset"),
        },
    }
    Ok(())
}
