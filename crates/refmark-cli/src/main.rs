use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use owo_colors::{OwoColorize, Style};

use refmark_core::{
    DiagnosticKind, LibraryCatalog, MarkerSyntax, Reference, ResolutionCache, ResolveConfig,
    Resolver, matching,
};
use refmark_library::{CatalogClient, CitationKeyClient};
use refmark_scholar::ScholarClient;

/// Rewrite citation markers in margin notes into catalog cross-links
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Title of the annotated paper (must match exactly one catalog item)
    #[arg(short, long)]
    title: String,

    /// Path to the annotation file
    #[arg(short, long)]
    annot: PathBuf,

    /// Path to write the rewritten annotation
    #[arg(short, long)]
    output: PathBuf,

    /// Path to the annotated paper's PDF
    #[arg(long)]
    pdf: PathBuf,

    /// Citation marker syntax used in the annotation
    #[arg(short = 'f', long, value_enum, default_value_t = Syntax::Numeric)]
    syntax: Syntax,

    /// Base URL of the catalog web API (or REFMARK_LIBRARY_URL)
    #[arg(long)]
    library_url: Option<String>,

    /// Catalog API key (or REFMARK_LIBRARY_KEY)
    #[arg(long)]
    library_key: Option<String>,

    /// Endpoint of the citation-key JSON-RPC sidecar
    #[arg(long, default_value = "http://localhost:23119/better-bibtex/json-rpc")]
    citekey_url: String,

    /// Academic search API key (or REFMARK_SCHOLAR_KEY)
    #[arg(long)]
    scholar_key: Option<String>,

    /// Directory for the persistent resolution cache
    #[arg(long, default_value = "./refmark-cache")]
    cache_dir: PathBuf,

    /// Fuzzy-match acceptance threshold (strictly-greater-than, 0-100)
    #[arg(long, default_value_t = 80.0)]
    fuzzy_threshold: f64,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Syntax {
    /// Bracketed numeric groups: [3], [3,7-9]
    Numeric,
    /// Bracketed author-year groups: [Smith 2020; Jones et al. 2019]
    AuthorYear,
}

impl From<Syntax> for MarkerSyntax {
    fn from(syntax: Syntax) -> Self {
        match syntax {
            Syntax::Numeric => MarkerSyntax::NumericBracket,
            Syntax::AuthorYear => MarkerSyntax::AuthorYear,
        }
    }
}

fn status_of(record: &Reference) -> (&'static str, Style) {
    if record.internal_key.is_some() {
        ("internal", Style::new().green())
    } else if record.url.is_some() {
        ("external", Style::new().cyan())
    } else if record.is_resolved() {
        ("partial", Style::new().yellow())
    } else {
        ("unresolved", Style::new().red())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let args = Args::parse();
    let plain = Style::new();

    let library_url = args
        .library_url
        .clone()
        .or_else(|| std::env::var("REFMARK_LIBRARY_URL").ok())
        .ok_or_else(|| anyhow::anyhow!("--library-url or REFMARK_LIBRARY_URL is required"))?;
    let library_key = args
        .library_key
        .clone()
        .or_else(|| std::env::var("REFMARK_LIBRARY_KEY").ok());
    let scholar_key = args
        .scholar_key
        .clone()
        .or_else(|| std::env::var("REFMARK_SCHOLAR_KEY").ok());

    let config = ResolveConfig {
        fuzzy_threshold: args.fuzzy_threshold,
        ..ResolveConfig::default()
    };
    let library = CatalogClient::new(&library_url, library_key)?;
    let search = ScholarClient::new(scholar_key)?;
    let citation_keys = CitationKeyClient::new(&args.citekey_url)?;
    let cache = ResolutionCache::open(&args.cache_dir)?;

    // The annotated paper itself must be catalogued, unambiguously.
    let candidates = library
        .find_by_title(&args.title)
        .await
        .map_err(|e| anyhow::anyhow!("catalog lookup for {:?} failed: {e}", args.title))?;
    let base: Vec<_> = candidates
        .iter()
        .filter(|item| matching::best_similarity(&args.title, &item.title) > config.fuzzy_threshold)
        .collect();
    match base.len() {
        0 => anyhow::bail!("cannot find {:?} in the catalog", args.title),
        1 => log::info!("base item {} for {:?}", base[0].key, base[0].title),
        n => anyhow::bail!("{n} catalog items match {:?}, refusing to guess", args.title),
    }

    let annotation = std::fs::read_to_string(&args.annot)?;
    let pdf_text = refmark_pdf::extract_text(&args.pdf)?;

    let resolver = Resolver::new(&config, &cache, &library, &search, &citation_keys);
    let outcome = resolver
        .resolve_annotation(&annotation, args.syntax.into(), &pdf_text, None)
        .await?;

    std::fs::write(&args.output, &outcome.rewritten)?;

    for (key, record) in &outcome.references {
        let (label, style) = status_of(record);
        let style = if args.no_color { plain } else { style };
        println!(
            "{:>12}  [{key}] {}",
            label.style(style),
            record.title.as_deref().unwrap_or("")
        );
    }
    for diag in &outcome.diagnostics {
        let style = if args.no_color { plain } else { Style::new().yellow() };
        let kind = format!("{:?}", diag.kind);
        println!("{:>12}  {}", kind.style(style), diag.message);
        if diag.kind == DiagnosticKind::EmptyReferenceList {
            log::warn!("reference extraction found nothing; check the PDF text");
        }
    }

    let stats = outcome.stats;
    println!(
        "{} references: {} internal, {} external, {} unresolved -> {}",
        stats.total,
        stats.internal,
        stats.external,
        stats.unresolved,
        args.output.display()
    );

    Ok(())
}
