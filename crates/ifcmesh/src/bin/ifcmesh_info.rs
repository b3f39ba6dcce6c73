use clap::Parser;
use ifcmesh::{EngineConfig, EngineSession, Transport};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Load a building model through a geometry engine and summarize the assembled mesh"
)]
struct Args {
    /// Geometry engine executable
    #[arg(short, long)]
    engine: PathBuf,

    /// Extra arguments passed to the engine
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    /// Model file to load
    model: PathBuf,

    /// Configuration file (defaults to ifcmesh.toml next to the model, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Let the engine read the model file itself instead of streaming it over stdin
    #[arg(long)]
    by_path: bool,

    /// Report the region of these entity ids
    #[arg(long = "id")]
    ids: Vec<i32>,

    /// Log every command exchanged with the engine
    #[arg(long)]
    log_traffic: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => {
            let dir = args
                .model
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            EngineConfig::load_from_dir(&dir)?.unwrap_or_default()
        }
    };
    let log_traffic = config.log_traffic || args.log_traffic;
    Ok(config.with_traffic_logging(log_traffic))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(&args)?;
    let start = Instant::now();

    let transport = Transport::spawn(&args.engine, &args.engine_args, &config)?;
    let mut session = EngineSession::new(transport);

    if args.by_path {
        session.open_model_path(&args.model)?;
    } else {
        let data = std::fs::read(&args.model)?;
        session.open_model(&data)?;
    }

    let mesh = session.finalize()?;
    println!("Model:      {}", args.model.display());
    println!("Vertices:   {}", mesh.vertex_count());
    println!("Triangles:  {}", mesh.triangle_count());
    println!("Normals:    {}", mesh.normals.len() / 3);

    let registry = session.registry()?;
    let mut types: Vec<&str> = registry.types().collect();
    types.sort_unstable();

    println!();
    println!("{:<32} {:>8} {:>10}", "Type", "Count", "Triangles");
    for entity_type in types {
        let regions = registry.by_type(entity_type);
        let triangles: usize = regions.iter().map(|r| r.primitive_count).sum();
        println!("{:<32} {:>8} {:>10}", entity_type, regions.len(), triangles);
    }

    for id in &args.ids {
        let region = registry.by_id(*id);
        println!(
            "#{}: start vertex {}, start index {}, {} triangles",
            id, region.start_vertex, region.start_index, region.primitive_count
        );
    }

    if session.skipped_instances() > 0 {
        println!("Skipped {} malformed instances", session.skipped_instances());
    }
    println!("Done in {:.2?}", start.elapsed());

    session.close();
    Ok(())
}
