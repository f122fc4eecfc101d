use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rb_core::{DateRange, Paper, PaperSource, SearchRequest, SortBy};
use rb_inference::Provider;
use rb_sources::{SearchAggregator, SourcesConfig};
use rb_storage::{BookmarkStore, FileLocalStore, StorageConfig};
use rb_web::{create_app, jobs, AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod duration;

use duration::HumanDuration;

#[derive(Parser, Debug)]
#[command(name = "research-buddy", author, version, about = "Search, analyze and discuss research papers", long_about = None)]
pub struct Cli {
    /// Default log filter when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
    #[arg(long, env = "LLM_PROVIDER", default_value = "gemini", help = "Language model provider: gemini (default), openai, dummy")]
    provider: Provider,
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, env = "LLM_MODEL")]
    model: Option<String>,
    #[arg(long, env = "LLM_BASE_URL")]
    model_url: Option<String>,
    #[arg(long, env = "SERP_API_KEY", hide_env_values = true)]
    serp_api_key: Option<String>,
    #[arg(long, env = "IEEE_API_KEY", hide_env_values = true)]
    ieee_api_key: Option<String>,
    #[arg(long, env = "SCHOLAR_DAILY_LIMIT", default_value_t = 1)]
    scholar_daily_limit: u32,
    /// Per-source request timeout (e.g. 30s, 1m)
    #[arg(long, env = "SOURCE_TIMEOUT", default_value = "30s")]
    source_timeout: HumanDuration,
    /// Contact address sent to NCBI E-utilities
    #[arg(long, env = "NCBI_EMAIL", default_value = "research@example.com")]
    contact_email: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long, env = "HOST", default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,
        /// Comma separated list of origins, `*` for any
        #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',', default_value = "*")]
        allowed_origins: Vec<String>,
        /// `memory`, or `sqlite` when built with the sqlite feature
        #[arg(long, env = "STORAGE", default_value = "memory")]
        storage: String,
        #[arg(long, env = "DATABASE_PATH", default_value = "research_buddy.db")]
        database_path: PathBuf,
        /// Completed and failed sessions are purged after this long
        #[arg(long, env = "SESSION_TTL", default_value = "24h")]
        session_ttl: HumanDuration,
        #[arg(long, env = "SESSION_SWEEP_INTERVAL", default_value = "10m", value_parser = duration::non_zero)]
        sweep_interval: HumanDuration,
        /// Messages kept per paper conversation, at least one exchange
        #[arg(long, env = "CHAT_HISTORY_LIMIT", default_value_t = 100, value_parser = parse_history_limit)]
        chat_history_limit: usize,
        #[arg(long, env = "CHAT_CONTEXT_WINDOW", default_value_t = 20)]
        chat_context_window: usize,
    },
    /// Search the configured sources once and print the results
    Search {
        query: String,
        #[arg(long, value_delimiter = ',', default_value = "arxiv,pubmed,google_scholar")]
        sources: Vec<PaperSource>,
        #[arg(long, default_value_t = 20)]
        max_results: usize,
        #[arg(long, default_value = "relevance")]
        sort: SortBy,
        /// Earliest publication date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Latest publication date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long)]
        dedupe: bool,
        /// Generate an analysis for every paper found
        #[arg(long)]
        analyze: bool,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// List the paper sources and whether they are configured
    Sources,
    /// Manage bookmarks kept in a local JSON file
    Bookmarks {
        #[arg(long, env = "BOOKMARKS_FILE", default_value = "researchbuddy_bookmarks.json")]
        file: PathBuf,
        #[command(subcommand)]
        command: BookmarkCommands,
    },
}

#[derive(Subcommand, Debug)]
enum BookmarkCommands {
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Bookmark a paper given as JSON, or `@path` to a JSON file
    Add {
        paper: String,
        #[arg(long)]
        category: Option<String>,
    },
    Remove {
        paper_id: String,
    },
    Move {
        paper_id: String,
        category: String,
    },
    Notes {
        paper_id: String,
        notes: String,
    },
    Categories,
    AddCategory {
        name: String,
        #[arg(long, default_value = "#6b7280")]
        color: String,
        #[arg(long, default_value = "folder")]
        icon: String,
    },
    DeleteCategory {
        category_id: String,
    },
}

fn parse_history_limit(s: &str) -> std::result::Result<usize, String> {
    let limit: usize = s.parse().map_err(|e| format!("{}", e))?;
    if limit < 2 {
        return Err("must keep at least one user/assistant exchange (2 messages)".to_string());
    }
    Ok(limit)
}

impl Cli {
    fn sources_config(&self) -> SourcesConfig {
        SourcesConfig {
            serp_api_key: self.serp_api_key.clone(),
            ieee_api_key: self.ieee_api_key.clone(),
            scholar_daily_limit: self.scholar_daily_limit,
            source_timeout: self.source_timeout.0,
            contact_email: self.contact_email.clone(),
        }
    }

    fn inference_config(&self) -> rb_inference::Config {
        rb_inference::Config {
            provider: self.provider,
            api_key: self.api_key.clone(),
            model_name: self.model.clone(),
            base_url: self.model_url.clone(),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

fn print_paper(index: usize, paper: &Paper) {
    println!("{}. {}", index + 1, paper.title);
    let authors = match paper.authors.len() {
        0 => "Unknown authors".to_string(),
        1..=3 => paper.authors.join(", "),
        _ => format!("{} et al.", paper.authors[..3].join(", ")),
    };
    println!("   {} | {} | {}", authors, paper.source.display_name(), paper.published);
    if let Some(count) = paper.citation_count {
        println!("   Cited by {}", count);
    }
    println!("   {}", paper.id);
}

fn read_paper(arg: &str) -> anyhow::Result<Paper> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&raw).context("paper must be a JSON object with id, title, published and source")
}

fn run_bookmarks(file: PathBuf, command: BookmarkCommands) -> anyhow::Result<()> {
    let store = BookmarkStore::new(FileLocalStore::new(file));
    match command {
        BookmarkCommands::List { category } => {
            let bookmarks = match category {
                Some(category) => store.bookmarks_in_category(&category)?,
                None => store.bookmarks()?,
            };
            if bookmarks.is_empty() {
                println!("No bookmarks");
            }
            for (i, bookmark) in bookmarks.iter().enumerate() {
                print_paper(i, &bookmark.paper);
                println!("   [{}] {}", bookmark.category_id, bookmark.notes);
            }
        }
        BookmarkCommands::Add { paper, category } => {
            let bookmark = store.add_bookmark(read_paper(&paper)?, category.as_deref())?;
            println!("Bookmarked {} in {}", bookmark.paper_id, bookmark.category_id);
        }
        BookmarkCommands::Remove { paper_id } => {
            if !store.remove_bookmark(&paper_id)? {
                bail!("{} is not bookmarked", paper_id);
            }
            println!("Removed {}", paper_id);
        }
        BookmarkCommands::Move { paper_id, category } => {
            let bookmark = store.move_bookmark(&paper_id, &category)?;
            println!("Moved {} to {}", bookmark.paper_id, bookmark.category_id);
        }
        BookmarkCommands::Notes { paper_id, notes } => {
            store.update_notes(&paper_id, &notes)?;
            println!("Updated notes for {}", paper_id);
        }
        BookmarkCommands::Categories => {
            for category in store.categories()? {
                println!(
                    "{:<20} {:<20} {}{}",
                    category.id,
                    category.name,
                    category.color,
                    if category.is_default { " (default)" } else { "" }
                );
            }
        }
        BookmarkCommands::AddCategory { name, color, icon } => {
            let category = store.add_category(&name, &color, &icon)?;
            println!("Created category {} ({})", category.name, category.id);
        }
        BookmarkCommands::DeleteCategory { category_id } => {
            let moved = store.delete_category(&category_id)?;
            println!("Deleted {}, moved {} bookmarks to to-read", category_id, moved);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            ref host,
            port,
            ref allowed_origins,
            ref storage,
            ref database_path,
            session_ttl,
            sweep_interval,
            chat_history_limit,
            chat_context_window,
        } => {
            let store = rb_storage::create_storage(&StorageConfig {
                backend: storage.clone(),
                database_path: database_path.clone(),
            })
            .await?;
            info!("Session storage ready (using {})", storage);

            let aggregator = SearchAggregator::from_config(&cli.sources_config())?;
            let model = rb_inference::create_model(Some(cli.inference_config())).await?;
            info!("Language model ready (using {})", model.name());

            let config = ServerConfig {
                allowed_origins: allowed_origins.clone(),
                session_ttl: session_ttl.0,
                sweep_interval: sweep_interval.0,
                chat_history_limit,
                chat_context_window,
            };
            let sweeper = jobs::spawn_session_sweeper(store.clone(), config.session_ttl, config.sweep_interval);
            let app = create_app(AppState::new(store, aggregator, model, config));

            let listener = tokio::net::TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("binding {}:{}", host, port))?;
            info!("ResearchBuddy API listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            sweeper.abort();
        }
        Commands::Search {
            ref query,
            ref sources,
            max_results,
            sort,
            from,
            to,
            dedupe,
            analyze,
            json,
        } => {
            let request = SearchRequest {
                query: query.clone(),
                sources: sources.clone(),
                max_results,
                sort_by: sort,
                date_range: (from.is_some() || to.is_some()).then_some(DateRange { start: from, end: to }),
                generate_analysis: analyze,
                dedupe,
            };
            request.validate()?;

            let aggregator = SearchAggregator::from_config(&cli.sources_config())?;
            aggregator.check_quotas(&request.sources, "cli")?;
            let result = aggregator.search(&request, "cli").await;
            for outcome in result.failed_sources() {
                tracing::warn!(
                    "{} failed: {}",
                    outcome.source.display_name(),
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }

            let papers = if analyze {
                let model = rb_inference::create_model(Some(cli.inference_config())).await?;
                rb_inference::AnalysisGenerator::new(model)
                    .analyze_batch(result.papers)
                    .await
            } else {
                result.papers.into_iter().map(rb_core::PaperWithAnalysis::bare).collect()
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&papers)?);
            } else {
                println!("Found {} papers for '{}'", papers.len(), request.query);
                for (i, entry) in papers.iter().enumerate() {
                    print_paper(i, &entry.paper);
                    if let Some(analysis) = &entry.analysis {
                        println!("   Summary: {}", analysis.summary);
                    }
                    if let Some(error) = &entry.analysis_error {
                        println!("   Analysis failed: {}", error);
                    }
                }
            }
        }
        Commands::Sources => {
            let aggregator = SearchAggregator::from_config(&cli.sources_config())?;
            let available = aggregator.available_sources();
            for source in PaperSource::ALL {
                let note = match source {
                    PaperSource::GoogleScholar if cli.serp_api_key.is_none() => " (placeholder results, set SERP_API_KEY)",
                    PaperSource::Ieee if cli.ieee_api_key.is_none() => " (disabled, set IEEE_API_KEY)",
                    _ if !available.contains(&source) => " (unavailable)",
                    _ => "",
                };
                println!("{:<16} {}{}", source.as_str(), source.description(), note);
            }
        }
        Commands::Bookmarks { file, command } => run_bookmarks(file, command)?,
    }

    Ok(())
}
