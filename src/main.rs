use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docq::query::{Scanner, TokenKind};
use docq::Value;

const EXIT_BAD_QUERY: i32 = 1;
const EXIT_BAD_DOC: i32 = 2;
const EXIT_EMPTY: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "docq")]
#[command(about = "Query JSON and TOML documents with path expressions", long_about = None)]
struct Args {
    /// Query expression
    query: String,

    /// Document to search, .json or .toml by extension
    file: Option<PathBuf>,

    /// Print `path = value` instead of bare values
    #[arg(short = 'k', long)]
    keys: bool,

    /// Dump the token stream of the query and exit
    #[arg(long)]
    tokens: bool,

    /// Print the parsed query in canonical form and exit
    #[arg(long)]
    explain: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docq=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.tokens {
        dump_tokens(&args.query);
        return Ok(());
    }

    let query = match docq::parse(&args.query) {
        Ok(query) => query,
        Err(err) => {
            eprintln!("{}: {err}", args.query);
            process::exit(EXIT_BAD_QUERY);
        }
    };
    tracing::debug!(query = %query, "query compiled");

    if args.explain {
        println!("{query}");
        return Ok(());
    }

    let Some(file) = args.file.as_deref() else {
        eprintln!("missing document file");
        process::exit(EXIT_BAD_DOC);
    };
    let doc = match decode_document(file) {
        Ok(doc) => doc,
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(EXIT_BAD_DOC);
        }
    };

    let results = match query.select(&doc) {
        Ok(results) => results,
        Err(err) => {
            eprintln!("{err}");
            process::exit(EXIT_BAD_QUERY);
        }
    };
    tracing::debug!(count = results.len(), "query evaluated");
    if results.is_empty() {
        process::exit(EXIT_EMPTY);
    }

    for result in &results {
        print_result(&result.path.join("."), &result.value, args.keys);
    }
    Ok(())
}

fn dump_tokens(query: &str) {
    let mut scanner = Scanner::new(query);
    loop {
        let token = scanner.next_token();
        if token.kind == TokenKind::Eof {
            break;
        }
        println!("{token}");
        if token.kind == TokenKind::Illegal {
            break;
        }
    }
}

fn decode_document(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("{}: can not read document", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("{}: invalid json document", path.display())),
        Some("toml") => {
            let raw: toml::Value = toml::from_str(&text)
                .with_context(|| format!("{}: invalid toml document", path.display()))?;
            Value::try_from(raw)
                .with_context(|| format!("{}: invalid toml document", path.display()))
        }
        _ => anyhow::bail!("{}: unsupported file type", path.display()),
    }
}

/// Containers are unfolded down to their scalar leaves, one line each, with
/// array indices and map keys appended to the path.
fn print_result(key: &str, value: &Value, with_keys: bool) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                print_result(&format!("{key}.{index}"), item, with_keys);
            }
        }
        Value::Map(map) => {
            for (name, item) in map {
                print_result(&format!("{key}.{name}"), item, with_keys);
            }
        }
        scalar => {
            if with_keys {
                println!("{key} = {scalar}");
            } else {
                println!("{scalar}");
            }
        }
    }
}
