use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gazetteer::{
    DataDir, FeatureStore, Gazetteer, NameIndex, SearchOptions,
    cli::{
        AttributesArgs, Cli, Command, FindArgs, LoadArgs, SearchArgs,
        StatusArgs,
    },
    error::Result,
    feature::Feature,
    ingest,
};

fn init_tracing(verbose: u8) {
    let filter = if let Ok(env) = std::env::var("GAZETTEER_LOG") {
        EnvFilter::new(env)
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let store = Arc::new(FeatureStore::open(data_dir.features_db())?);
    let index = Arc::new(NameIndex::open(data_dir.index_dir())?);

    match cli.command {
        Command::Load(args) => cmd_load(&store, &index, &args),
        Command::Search(args) => cmd_search(store, index, &args),
        Command::Find(args) => cmd_find(store, index, &args),
        Command::Attributes(args) => cmd_attributes(store, index, &args),
        Command::Status(args) => cmd_status(&store, &index, &data_dir, &args),
        Command::Completions(_) => unreachable!("handled above"),
    }
}

fn cmd_load(
    store: &FeatureStore,
    index: &NameIndex,
    args: &LoadArgs,
) -> Result<()> {
    let records = ingest::read_records(&args.path, &args.gazetteer)?;
    let names = ingest::load_gazetteer(store, index, &args.gazetteer, &records)?;
    println!(
        "Loaded '{}': {} features, {} names",
        args.gazetteer,
        records.len(),
        names
    );
    Ok(())
}

fn cmd_search(
    store: Arc<FeatureStore>,
    index: Arc<NameIndex>,
    args: &SearchArgs,
) -> Result<()> {
    let method = args.method()?;
    let options = SearchOptions {
        limit: args.limit,
        ranks: args.ranks,
        filter: args.filter()?,
    };

    let engine = Gazetteer::new(&args.gazetteer, store, index);
    let results = engine.search(&args.query, method, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No matches for '{}'", args.query);
    } else {
        for feature in &results {
            print_feature_line(feature);
        }
        println!("\n{} match(es)", results.len());
    }
    Ok(())
}

fn cmd_find(
    store: Arc<FeatureStore>,
    index: Arc<NameIndex>,
    args: &FindArgs,
) -> Result<()> {
    let engine = Gazetteer::new(&args.gazetteer, store, index);
    let found = engine.find(&args.identifier)?;

    match found {
        Some(feature) if args.json => {
            println!("{}", serde_json::to_string_pretty(&feature)?);
        }
        Some(feature) => {
            print_feature_line(&feature);
            for (attr, value) in &feature.attributes {
                println!("  {attr}: {value}");
            }
        }
        None if args.json => println!("null"),
        None => {
            println!(
                "No feature '{}' in gazetteer '{}'",
                args.identifier, args.gazetteer
            );
        }
    }
    Ok(())
}

fn cmd_attributes(
    store: Arc<FeatureStore>,
    index: Arc<NameIndex>,
    args: &AttributesArgs,
) -> Result<()> {
    let engine = Gazetteer::new(&args.gazetteer, store, index);
    let listing = match &args.attribute {
        Some(attribute) => engine.filter_values(attribute)?,
        None => engine.filter_attributes()?,
    };

    if args.json {
        println!("{}", serde_json::to_string(&listing)?);
    } else if listing.is_empty() {
        println!("(none)");
    } else {
        for item in &listing {
            println!("{item}");
        }
    }
    Ok(())
}

fn cmd_status(
    store: &FeatureStore,
    index: &NameIndex,
    data_dir: &DataDir,
    args: &StatusArgs,
) -> Result<()> {
    let gazetteers = match &args.gazetteer {
        Some(name) => vec![name.clone()],
        None => store.gazetteers()?,
    };

    let mut stats = Vec::with_capacity(gazetteers.len());
    for name in &gazetteers {
        stats.push((name.as_str(), store.count(name)?, index.count(name)?));
    }

    if args.json {
        let entries: Vec<serde_json::Value> = stats
            .iter()
            .map(|(name, features, names)| {
                serde_json::json!({
                    "gazetteer": name,
                    "features": features,
                    "names": names,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "data_dir": data_dir.root().display().to_string(),
                "gazetteers": entries,
            })
        );
    } else {
        println!("Data directory: {}", data_dir.root().display());
        if stats.is_empty() {
            println!("No gazetteers loaded.");
        }
        for (name, features, names) in &stats {
            println!("{name}: {features} features, {names} names");
        }
    }
    Ok(())
}

fn print_feature_line(feature: &Feature) {
    match feature.attr("name").as_str() {
        Some(name) => println!("{feature}\t{name}"),
        None => println!("{feature}"),
    }
}
