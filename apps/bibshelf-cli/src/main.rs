//! bibshelf: command-line front end for the bibliography manager.

mod extract;
mod resolver;

use bibshelf_core::{
    full_text_report, import, reindex, Error, HighlightStyle, MetadataSource, RequestCache,
    Result, Store, TextIndex, Work,
};
use clap::{Parser, Subcommand};
use extract::PdfiumExtractor;
use resolver::CrossrefResolver;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const CACHE_FILE: &str = "cache.json";

#[derive(Parser)]
#[command(name = "bibshelf")]
#[command(about = "Personal bibliography manager", long_about = None)]
struct Cli {
    /// Data directory; found by walking up from the working directory when
    /// omitted.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new document repository
    Init {
        /// Replace an existing repository at the location
        #[arg(long)]
        force: bool,
    },

    /// Import a PDF, resolving its metadata by DOI
    Add {
        file: PathBuf,

        /// Resolve this DOI instead of scanning the document text
        #[arg(long)]
        doi: Option<String>,

        #[arg(long = "supplementary", value_name = "FILE")]
        supplementary: Vec<PathBuf>,

        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Accept resolved metadata without asking
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Field-scoped metadata lookup
    List {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        key: Option<String>,
    },

    /// Ranked full-text search over indexed page text
    Search {
        query: String,

        /// Emit HTML highlight markup instead of plain markers
        #[arg(long)]
        html: bool,

        /// Search attached notes instead of page text
        #[arg(long)]
        notes: bool,
    },

    /// Add or remove tags on a work
    Tag {
        key: String,
        #[arg(long = "add", value_name = "TAG")]
        add: Vec<String>,
        #[arg(long = "remove", value_name = "TAG")]
        remove: Vec<String>,
    },

    /// Attach a supplementary file to a work
    Attach { key: String, file: PathBuf },

    /// Remove a supplementary attachment by label
    Detach { key: String, label: String },

    /// Attach a searchable note to a work
    Note { key: String, text: String },

    /// Rename a cite key
    Rekey { old_key: String, new_key: String },

    /// Delete a work, its managed files, and its indexed pages
    Delete { key: String },

    /// Rebuild the text index from the managed files
    Reindex,

    /// Show one work's full record
    Info { key: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Cancelled) => {
            eprintln!("cancelled");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = &cli.command {
        let force = *force;
        let data_dir = match cli.data_dir {
            Some(dir) => dir,
            None => std::env::current_dir()?.join(bibshelf_core::store::DEFAULT_DATA_DIR),
        };
        let store = Store::init(&data_dir, force)?;
        println!("initialized repository at {}", store.data_dir().display());
        return Ok(());
    }

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => Store::discover(&std::env::current_dir()?).ok_or_else(|| {
            Error::Storage("no document repository found; run `bibshelf init` first".to_string())
        })?,
    };
    let mut store = Store::open(&data_dir)?;
    let index = TextIndex::open(&store.index_dir())?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),

        Commands::Add {
            file,
            doi,
            supplementary,
            tags,
            yes,
        } => {
            let extractor = PdfiumExtractor::new();
            let cache = RequestCache::open(&data_dir.join(CACHE_FILE))?;
            let resolver = CrossrefResolver::new(cache, yes);
            let source = match doi {
                Some(doi) => MetadataSource::Doi(doi),
                None => MetadataSource::ScanText,
            };
            let key = import(
                &mut store,
                &index,
                &file,
                &supplementary,
                &tags,
                source,
                &extractor,
                &resolver,
            )?;
            println!("{}", key);
        }

        Commands::List {
            title,
            author,
            year,
            tag,
            key,
        } => {
            let criteria = [
                ("title", title),
                ("author", author),
                ("year", year),
                ("tag", tag),
                ("key", key),
            ];
            let mut selected = criteria
                .into_iter()
                .filter_map(|(field, pattern)| pattern.map(|p| (field, p)));
            let Some((field, pattern)) = selected.next() else {
                return Err(Error::QuerySyntax(
                    "pass one of --title, --author, --year, --tag, --key".to_string(),
                ));
            };
            if selected.next().is_some() {
                return Err(Error::QuerySyntax(
                    "pass exactly one lookup criterion".to_string(),
                ));
            }
            for work in store.lookup(field, &pattern)? {
                print_line(&work);
            }
        }

        Commands::Search { query, html, notes } => {
            let style = if html {
                HighlightStyle::Html
            } else {
                HighlightStyle::Plain
            };
            if notes {
                for hit in index.search_notes(&query, style)? {
                    println!("{}  [{:.2}]", hit.key, hit.score);
                    println!("    {}", hit.excerpt);
                }
            } else {
                for entry in full_text_report(&store, &index, &query, style)? {
                    println!("{}  [{:.2}]", entry.work.cite_key, entry.score);
                    for fragment in &entry.fragments {
                        println!("    p.{:<4} {}", fragment.page, fragment.excerpt);
                    }
                }
            }
        }

        Commands::Tag { key, add, remove } => store.retag(&key, &add, &remove)?,

        Commands::Attach { key, file } => store.attach(&key, &file)?,

        Commands::Detach { key, label } => store.remove_attachment(&key, &label)?,

        Commands::Note { key, text } => {
            if store.find_by_key(&key).is_none() {
                return Err(Error::NotFound(format!("key {} not found", key)));
            }
            index.add_note(&key, &text)?;
        }

        Commands::Rekey { old_key, new_key } => store.rename_key(&old_key, &new_key, &index)?,

        Commands::Delete { key } => store.delete(&key, &index)?,

        Commands::Reindex => {
            let extractor = PdfiumExtractor::new();
            let repaired = reindex(&store, &index, &extractor)?;
            println!("reindexed {} works", repaired);
        }

        Commands::Info { key } => {
            let work = store
                .find_by_key(&key)
                .ok_or_else(|| Error::NotFound(format!("key {} not found", key)))?;
            print_info(work, &index)?;
        }
    }
    Ok(())
}

fn print_line(work: &Work) {
    println!(
        "{}  {} ({}): {}",
        work.cite_key,
        work.authors_string(),
        work.fields
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "????".to_string()),
        work.display_title().unwrap_or("(no title)")
    );
}

fn print_info(work: &Work, index: &TextIndex) -> Result<()> {
    print_line(work);
    println!("  kind: {}", work.kind.as_str());
    if !work.authors.is_empty() {
        let names: Vec<String> = work.authors.iter().map(|a| a.display_name()).collect();
        println!("  authors: {}", names.join(", "));
    }
    if let Some(doi) = &work.fields.doi {
        println!("  doi: {}", doi);
    }
    if let Some(journal) = &work.fields.journal {
        println!("  journal: {}", journal);
    }
    if !work.editors.is_empty() {
        println!("  editors: {}", work.editors_string());
    }
    if !work.tags.is_empty() {
        println!("  tags: {}", work.tags.join(", "));
    }
    for file in &work.files {
        println!("  file: {} ({})", file.filename, file.label);
    }
    println!("  indexed pages: {}", index.page_count(&work.cite_key)?);
    println!("  imported: {}", work.imported_at.format("%Y-%m-%d"));
    Ok(())
}
