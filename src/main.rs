//! SiteDB CLI

use clap::{Parser, Subcommand};
use sitedb::site::{self, ContactRequest};
use sitedb::{Config, Database, Document};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitedb")]
#[command(about = "A local-first document store for a small business website", long_about = None)]
struct Cli {
    /// Database directory (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    database: PathBuf,

    /// Do not record writes in the git history
    #[arg(long)]
    no_history: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database with a default configuration
    Init,

    /// Show document counts per type
    Status,

    /// Print a document
    Get {
        id: String,
    },

    /// Delete a document
    Delete {
        id: String,
    },

    /// List documents whose field equals a value
    Query {
        field: String,
        value: String,
    },

    /// Show the business profile, storing the default one if none exists
    Profile,

    /// Submit a contact request
    Contact {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        message: String,
    },

    /// Generate or list testimonials
    Testimonials {
        #[command(subcommand)]
        command: TestimonialCommands,
    },

    /// Print matching documents every time they change, until Ctrl-C
    Watch {
        field: String,
        value: String,
    },
}

#[derive(Subcommand)]
enum TestimonialCommands {
    /// Ask the generation service for new testimonials
    Generate {
        #[arg(short, long, default_value_t = 3)]
        count: usize,
    },

    /// List stored testimonials
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return init_database(&cli.database, cli.no_history).await;
    }

    let db = open_database(&cli.database, cli.no_history).await?;
    match cli.command {
        Commands::Init => Ok(()),
        Commands::Status => show_status(&db).await,
        Commands::Get { id } => get_document(&db, &id),
        Commands::Delete { id } => delete_document(&db, &id).await,
        Commands::Query { field, value } => query_documents(&db, &field, &value),
        Commands::Profile => show_profile(&db).await,
        Commands::Contact {
            name,
            phone,
            email,
            message,
        } => {
            let request = ContactRequest {
                name,
                phone,
                email,
                message,
            };
            let id = db.submit_contact(&request).await?;
            println!("Contact request {} received.", id);
            Ok(())
        }
        Commands::Testimonials { command } => match command {
            TestimonialCommands::Generate { count } => generate_testimonials(&db, count).await,
            TestimonialCommands::List => list_testimonials(&db),
        },
        Commands::Watch { field, value } => watch(&db, &field, &value).await,
    }
}

async fn open_database(path: &Path, no_history: bool) -> anyhow::Result<Database> {
    let mut config = Config::load(path)?;
    if no_history {
        config.history.enabled = false;
    }
    Ok(Database::open_with(path, config).await?)
}

async fn init_database(path: &Path, no_history: bool) -> anyhow::Result<()> {
    println!("Initializing sitedb database at {:?}...", path);

    let mut config = Config::load(path)?;
    if no_history {
        config.history.enabled = false;
    }
    config.save(path)?;
    let _db = Database::open_with(path, config).await?;

    println!("Database initialized successfully!");
    println!();
    println!("Directory structure:");
    println!("  collections/         - One directory per document type");
    println!("  .sitedb/config.yaml  - History, generation and profile settings");
    println!();
    println!("Get started:");
    println!("  sitedb profile");
    println!("  sitedb testimonials generate --count 3");
    println!("  sitedb watch type testimonial");

    Ok(())
}

async fn show_status(db: &Database) -> anyhow::Result<()> {
    let store = db.store();

    println!("SiteDB Status");
    println!("=============");
    println!("Path: {:?}", db.root());
    println!("Version: {}", store.version()?);
    println!();

    let counts = store.count_by_type()?;
    if counts.is_empty() {
        println!("No documents.");
    }
    for (doc_type, count) in &counts {
        println!("  {:<20} {}", doc_type, count);
    }

    match store.history().await? {
        Some(history) => {
            println!();
            let short = &history.head[..history.head.len().min(8)];
            println!("History: {} commit(s), HEAD {}", history.commits, short);
            println!("Last commit: {}", history.message);
            if history.uncommitted {
                println!("Uncommitted changes present (hand edits are picked up on reopen).");
            }
        }
        None => println!("\nHistory disabled."),
    }
    Ok(())
}

fn get_document(db: &Database, id: &str) -> anyhow::Result<()> {
    match db.store().get(id)? {
        Some(doc) => print_document(&doc),
        None => println!("Document '{}' not found.", id),
    }
    Ok(())
}

async fn delete_document(db: &Database, id: &str) -> anyhow::Result<()> {
    if db.store().delete(id).await? {
        println!("Document '{}' deleted.", id);
    } else {
        println!("Document '{}' not found.", id);
    }
    Ok(())
}

fn query_documents(db: &Database, field: &str, value: &str) -> anyhow::Result<()> {
    let docs = db.store().query_by_field(field, value)?;
    print_documents(&docs);
    Ok(())
}

async fn show_profile(db: &Database) -> anyhow::Result<()> {
    let (id, created) = db.ensure_profile().await?;
    if created {
        println!("Stored the default business profile as {}.", id);
    }

    let profile = db.profile()?;
    println!("{}", profile.name);
    println!("  {}", profile.tagline);
    println!("  Address: {}", profile.address);
    println!("  Phone:   {}", profile.phone);
    println!("  Email:   {}", profile.email);
    println!("  Hours:   {}", profile.hours);
    Ok(())
}

async fn generate_testimonials(db: &Database, count: usize) -> anyhow::Result<()> {
    let pipeline = db.http_pipeline()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!("Generating {} testimonial(s)...", count);
    let testimonials = site::generate_testimonials(&pipeline, count, &cancel).await?;
    for t in &testimonials {
        println!("\"{}\"\n  - {} ({})", t.text, t.name, t.service);
    }
    println!("{} testimonial(s) saved.", testimonials.len());
    Ok(())
}

fn list_testimonials(db: &Database) -> anyhow::Result<()> {
    let testimonials = db.testimonials()?;
    if testimonials.is_empty() {
        println!("No testimonials yet.");
    }
    for t in &testimonials {
        println!("--- {} ---", t.id);
        println!("  \"{}\"\n  - {} ({})", t.text, t.name, t.service);
    }
    Ok(())
}

async fn watch(db: &Database, field: &str, value: &str) -> anyhow::Result<()> {
    let (initial, mut handle) = db.subscribe(field, value)?;
    println!("Watching {} = {} (Ctrl-C to stop)", field, value);
    print_documents(&initial);

    loop {
        tokio::select! {
            update = handle.next() => match update {
                Some(update) => {
                    println!("=== version {} ===", update.version);
                    print_documents(&update.documents);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    db.live().unsubscribe(&mut handle);
    Ok(())
}

fn print_documents(docs: &[Document]) {
    if docs.is_empty() {
        println!("(0 documents)");
        return;
    }
    for doc in docs {
        print_document(doc);
    }
    println!("({} document(s))", docs.len());
}

fn print_document(doc: &Document) {
    println!("--- {} [{}] ---", doc.id_str(), doc.doc_type);
    let mut keys: Vec<_> = doc.fields.keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = doc.get(key) {
            println!("  {}: {}", key, value.to_json());
        }
    }
    println!();
}
