use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rootcause::prelude::*;
use serde::Serialize;
use tracing::Level;

use esmstore::content::{ContentFile, load_content};
use esmstore::esm::{ReadersCache, RecordKind};
use esmstore::loading::Listener;
use esmstore::records::LuaScriptCfg;
use esmstore::store::{EsmStore, ValidationReport};

/// Load TES3 content files and summarize the resulting record store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// `.omwscripts` files merged into the Lua script configuration
    #[clap(long)]
    omwscripts: Vec<PathBuf>,

    /// Number of content files kept open while counting cell references
    #[clap(long, default_value_t = 8)]
    readers: usize,

    /// Ids to look up once everything is loaded
    #[clap(short, long)]
    find: Vec<String>,

    /// Print the summary as JSON
    #[clap(long)]
    json: bool,

    /// Enable debug logging, including every repair made to the content
    #[clap(short, long)]
    verbose: bool,

    /// Content files in load order
    #[clap(required = true)]
    files: Vec<PathBuf>,
}

struct ProgressListener {
    bar: ProgressBar,
}

impl Listener for ProgressListener {
    fn set_label(&mut self, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn set_progress_range(&mut self, range: u64) {
        self.bar.set_length(range);
        self.bar.set_position(0);
    }

    fn set_progress(&mut self, value: u64) {
        self.bar.set_position(value);
    }

    fn increase_progress(&mut self, increase: u64) {
        self.bar.inc(increase);
    }
}

#[derive(Serialize)]
struct CollectionSummary {
    collection: String,
    kind: Option<RecordKind>,
    records: usize,
    dynamic: usize,
}

#[derive(Serialize)]
struct Lookup {
    id: String,
    kind: Option<RecordKind>,
    static_kind: Option<RecordKind>,
    /// Known now but not in base content.
    added: bool,
    references: u32,
}

#[derive(Serialize)]
struct Summary {
    validation: ValidationReport,
    collections: Vec<CollectionSummary>,
    lookups: Vec<Lookup>,
    lua_scripts: Vec<LuaScriptCfg>,
}

fn summarize(store: &EsmStore, validation: ValidationReport, ids: &[String]) -> Summary {
    let collections = store
        .collections()
        .map(|(index, kind, collection)| CollectionSummary {
            collection: format!("{index:?}"),
            kind,
            records: collection.len(),
            dynamic: collection.dynamic_len(),
        })
        .collect();

    let lookups = ids
        .iter()
        .map(|id| {
            let kind = store.find(id);
            let static_kind = store.find_static(id);
            Lookup {
                id: id.clone(),
                kind,
                static_kind,
                added: kind.is_some() && static_kind.is_none(),
                references: store.get_ref_count(id),
            }
        })
        .collect();

    Summary {
        validation,
        collections,
        lookups,
        lua_scripts: store.lua_scripts_cfg().scripts,
    }
}

fn print_summary(summary: &Summary) {
    println!("{:<20} {:<6} {:>8} {:>8}", "Collection", "Kind", "Records", "Dynamic");
    for collection in &summary.collections {
        let kind = collection
            .kind
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<6} {:>8} {:>8}",
            collection.collection, kind, collection.records, collection.dynamic
        );
    }

    if !summary.validation.is_clean() {
        println!();
        println!("Repairs: {:?}", summary.validation);
    }

    for lookup in &summary.lookups {
        println!();
        match lookup.kind {
            Some(kind) => println!("{}: {} ({})", lookup.id, kind.name(), kind),
            None => println!("{}: not found", lookup.id),
        }
        if let Some(kind) = lookup.static_kind {
            println!("  base content: {}", kind.name());
        }
        if lookup.added {
            println!("  added after base content");
        }
        println!("  references: {}", lookup.references);
    }

    if !summary.lua_scripts.is_empty() {
        println!();
        println!("Lua scripts:");
        for script in &summary.lua_scripts {
            let types: Vec<&str> = script.record_types.iter().map(|kind| kind.name()).collect();
            println!("  {} (flags {:#x}) {}", script.path, script.flags, types.join(", "));
        }
    }
}

fn main() -> Result<(), Report> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{msg:32} [{bar:40}] {percent:>3}%")
            .context("Invalid progress bar template")?
            .progress_chars("=> "),
    );
    let mut listener = ProgressListener { bar };

    let files: Vec<ContentFile> = args.files.iter().map(ContentFile::from_path).collect();
    let mut store = EsmStore::new();
    let mut readers = ReadersCache::new(args.readers);
    let validation = load_content(&files, &mut store, &mut readers, &mut listener)?;
    listener.bar.finish_and_clear();

    for path in &args.omwscripts {
        store.add_omw_scripts(path);
    }

    let summary = summarize(&store, validation, &args.find);
    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?;
        println!("{json}");
    } else {
        print_summary(&summary);
    }

    Ok(())
}
