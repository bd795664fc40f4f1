use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dergipark_mcp::config::{find_config_file, get_config, load_config, to_toml, Config};
use dergipark_mcp::mcp::server::McpServer;
use dergipark_mcp::models::{IndexFilter, SearchField, SearchQuery, SearchResponse, SortOrder};
use dergipark_mcp::DergiparkService;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// DergiPark MCP - Search Turkish academic journals and read their PDFs
#[derive(Parser, Debug)]
#[command(name = "dergipark-mcp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search DergiPark articles, convert PDFs and list references", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show all environment variables
    #[arg(long, global = true)]
    env: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Plain text on a terminal, JSON otherwise
    Auto,
    /// JSON format (machine-readable)
    Json,
    /// Plain text format
    Plain,
}

/// Sort order on the portal
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Sort {
    Newest,
    Oldest,
}

/// Index membership filter
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum IndexFilterArg {
    /// Keep every article
    All,
    /// Only journals indexed in TR Dizin
    TrIndex,
    /// Only journals with at least one index
    Indexed,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search articles
    #[command(alias = "s")]
    Search {
        /// Free-text query (omit to list all articles)
        query: Option<String>,

        /// Field-qualified term, e.g. --field author=Yılmaz (repeatable)
        #[arg(long = "field", short = 'f', value_parser = parse_field)]
        fields: Vec<(SearchField, String)>,

        /// DergiPark result page
        #[arg(long, default_value_t = 1)]
        dergipark_page: u32,

        /// Output page over the scraped results
        #[arg(long, short, default_value_t = 1)]
        page: u32,

        /// Sort order
        #[arg(long, value_enum)]
        sort: Option<Sort>,

        /// Article type code (e.g. 54 for research articles)
        #[arg(long)]
        article_type: Option<String>,

        /// Publication year
        #[arg(long, short)]
        year: Option<String>,

        /// Index filter
        #[arg(long, value_enum, default_value_t = IndexFilterArg::All)]
        index_filter: IndexFilterArg,
    },

    /// Convert an article PDF to readable HTML
    Pdf {
        /// Numeric article file id or absolute PDF URL
        target: String,

        /// Write the HTML here instead of stdout
        #[arg(long = "out", short = 'O')]
        out: Option<PathBuf>,
    },

    /// Summarize an article PDF in Turkish
    Summarize {
        /// Numeric article file id or absolute PDF URL
        target: String,
    },

    /// List the references of an article
    #[command(alias = "refs")]
    References {
        /// Article page URL
        article_url: String,
    },

    /// Run the MCP server
    Serve {
        /// Run in stdio mode (default)
        #[arg(long, default_value_t = true)]
        stdio: bool,

        /// Run in streamable HTTP mode
        #[arg(long)]
        http: bool,

        /// Port for HTTP mode
        #[arg(long, default_value_t = 3000)]
        port: u16,

        /// Host for HTTP mode
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn parse_field(raw: &str) -> Result<(SearchField, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = SearchField::parse(name).ok_or_else(|| format!("unknown field '{}'", name))?;
    Ok((field, value.to_string()))
}

/// Print all available environment variables
fn print_env_vars() {
    println!("DergiPark MCP - Environment Variables");
    println!();
    println!("API Keys:");
    println!("  CAPSOLVER_API_KEY           CAPTCHA solving service key (passive passes only without it)");
    println!("  MISTRAL_API_KEY             OCR fallback and article summaries (disabled without it)");
    println!();
    println!("Browser:");
    println!("  CHROME_EXECUTABLE           Chrome/Chromium binary to launch");
    println!();
    println!("Cache:");
    println!("  PDF_CACHE_TTL               TTL of converted PDFs in seconds (default: 86400)");
    println!();
    println!("Overrides (any config key, section and key separated by '__'):");
    println!("  DERGIPARK_BROWSER__POOL_SIZE        Browser instances (default: 5)");
    println!("  DERGIPARK_BROWSER__HEADLESS         Run headless (default: true)");
    println!("  DERGIPARK_FETCH__MAX_CONCURRENT     Parallel detail fetches (default: 3)");
    println!("  DERGIPARK_CACHE__COOKIE_FILE        Durable session cookie file");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    std::process::exit(0);
}

fn use_json(format: OutputFormat) -> bool {
    match format {
        OutputFormat::Json => true,
        OutputFormat::Plain => false,
        OutputFormat::Auto => !std::io::stdout().is_terminal(),
    }
}

fn print_search(response: &SearchResponse) {
    let p = &response.pagination;
    println!(
        "Page {}/{} ({} articles on this result page)",
        p.api_page, p.total_api_pages, p.total_items_on_result_page
    );
    println!();

    for article in &response.articles {
        println!("{}", article.title);
        println!("  {}", article.url);
        if let Some(error) = &article.error {
            println!("  error: {}", error);
            continue;
        }
        if let Some(author) = &article.author {
            println!("  {}", author);
        }
        let journal = article.journal_title.as_deref().unwrap_or("");
        let date = article.publication_date.as_deref().unwrap_or("");
        if !journal.is_empty() || !date.is_empty() {
            println!("  {} {}", journal, date);
        }
        if !article.indices.is_empty() {
            println!("  Indexes: {}", article.indices);
        }
        if let Some(pdf) = &article.pdf_url {
            println!("  PDF: {}", pdf);
        }
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(config_path) = path {
        return load_config(config_path)
            .with_context(|| format!("loading {}", config_path.display()));
    }
    if let Some(config_path) = find_config_file() {
        tracing::info!("Using config file: {}", config_path.display());
        return Ok(load_config(&config_path)?);
    }
    Ok(get_config())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.env {
        print_env_vars();
    }

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    // stdout carries MCP stdio traffic and command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("dergipark_mcp={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = resolve_config(cli.config.as_ref())?;
    let json = use_json(cli.output);

    match cli.command {
        Some(Commands::Search {
            query,
            fields,
            dergipark_page,
            page,
            sort,
            article_type,
            year,
            index_filter,
        }) => {
            let mut search_query = SearchQuery::new(query.unwrap_or_default())
                .result_page(dergipark_page)
                .output_page(page)
                .index_filter(match index_filter {
                    IndexFilterArg::All => IndexFilter::All,
                    IndexFilterArg::TrIndex => IndexFilter::TrIndexOnly,
                    IndexFilterArg::Indexed => IndexFilter::NonEmpty,
                });
            for (field, value) in fields {
                search_query = search_query.field(field, value);
            }
            if let Some(sort) = sort {
                search_query = search_query.sort(match sort {
                    Sort::Newest => SortOrder::Newest,
                    Sort::Oldest => SortOrder::Oldest,
                });
            }
            if let Some(code) = article_type {
                search_query = search_query.article_type(code);
            }
            if let Some(year) = year {
                search_query = search_query.publication_year(year);
            }

            // one browser is enough for a single CLI search
            config.browser.pool_size = 1;
            let service = DergiparkService::init(config).await?;
            let result = service.search(&search_query).await;
            service.shutdown().await;
            let response = result?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_search(&response);
            }
        }

        Some(Commands::Pdf { target, out }) => {
            config.browser.pool_size = 1;
            let service = DergiparkService::init(config).await?;
            let url = match target.trim().parse::<u64>() {
                Ok(id) => service.pdf_url_for_file_id(id),
                Err(_) => target,
            };
            let result = service.pdf_to_readable(&url).await;
            service.shutdown().await;
            let html = result?;

            match out {
                Some(path) => {
                    std::fs::write(&path, html)?;
                    if !cli.quiet {
                        eprintln!("Wrote {}", path.display());
                    }
                }
                None => println!("{}", html),
            }
        }

        Some(Commands::Summarize { target }) => {
            config.browser.pool_size = 1;
            let service = DergiparkService::init(config).await?;
            let url = match target.trim().parse::<u64>() {
                Ok(id) => service.pdf_url_for_file_id(id),
                Err(_) => target,
            };
            let result = service.summarize_article(&url).await;
            service.shutdown().await;
            println!("{}", result?);
        }

        Some(Commands::References { article_url }) => {
            config.browser.pool_size = 1;
            let service = DergiparkService::init(config).await?;
            let result = service.get_references(&article_url).await;
            service.shutdown().await;
            let refs = result?;

            if json {
                println!("{}", serde_json::to_string_pretty(&refs)?);
            } else {
                if let Some(title) = &refs.title {
                    println!("{}", title);
                }
                println!("{} references", refs.reference_count);
                for (i, reference) in refs.references.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, reference);
                }
            }
        }

        Some(Commands::Serve {
            stdio,
            http,
            port,
            host,
        }) => {
            let service = Arc::new(DergiparkService::init(config).await?);
            let server = McpServer::new(Arc::clone(&service))?;

            let use_http = http || !stdio;

            let served = if use_http {
                let addr = format!("{}:{}", host, port);
                let (bound_addr, handle) = server.run_http(&addr).await?;
                tracing::info!("MCP server listening on {}", bound_addr);

                tokio::select! {
                    joined = handle => joined.map_err(|e| anyhow::anyhow!("Server task failed: {}", e)),
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted");
                        Ok(())
                    }
                }
            } else {
                tokio::select! {
                    result = server.run() => result.map_err(anyhow::Error::from),
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted");
                        Ok(())
                    }
                }
            };

            service.shutdown().await;
            served?;
        }

        Some(Commands::Config) => {
            print!("{}", to_toml(&config)?);
        }

        None => {
            eprintln!("No command given, try --help");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_search_command() {
        let cli = Cli::parse_from([
            "dergipark-mcp",
            "search",
            "yapay zeka",
            "--field",
            "author=Yılmaz",
            "--page",
            "2",
            "--sort",
            "newest",
            "--index-filter",
            "tr-index",
        ]);
        match &cli.command {
            Some(Commands::Search {
                query,
                fields,
                page,
                sort,
                index_filter,
                ..
            }) => {
                assert_eq!(query.as_deref(), Some("yapay zeka"));
                assert_eq!(fields, &vec![(SearchField::Author, "Yılmaz".to_string())]);
                assert_eq!(*page, 2);
                assert_eq!(*sort, Some(Sort::Newest));
                assert_eq!(*index_filter, IndexFilterArg::TrIndex);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_field() {
        let result = Cli::try_parse_from(["dergipark-mcp", "search", "--field", "colour=red"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_pdf_command() {
        let cli = Cli::parse_from(["dergipark-mcp", "pdf", "118146", "--out", "a.html"]);
        match &cli.command {
            Some(Commands::Pdf { target, out }) => {
                assert_eq!(target, "118146");
                assert_eq!(out.as_deref(), Some(std::path::Path::new("a.html")));
            }
            _ => panic!("Expected Pdf command"),
        }
    }

    #[test]
    fn test_cli_summarize_command() {
        let cli = Cli::parse_from(["dergipark-mcp", "summarize", "118146"]);
        match &cli.command {
            Some(Commands::Summarize { target }) => assert_eq!(target, "118146"),
            _ => panic!("Expected Summarize command"),
        }
    }

    #[test]
    fn test_cli_serve_command() {
        let cli = Cli::parse_from(["dergipark-mcp", "serve"]);
        match &cli.command {
            Some(Commands::Serve {
                stdio, port, host, http,
            }) => {
                assert!(*stdio);
                assert!(!*http);
                assert_eq!(*port, 3000);
                assert_eq!(host, "127.0.0.1");
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from(["dergipark-mcp", "-vv", "--config", "x.toml", "config"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Some(Commands::Config)));
    }
}
