//! trackweb main entry point

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use trackweb_api::start_server;
use trackweb_config::Config;
use trackweb_core::view::SortField;
use trackweb_core::{build_timeline, Coordinator, ProxyTransport, TransactionService};

#[derive(Parser, Debug)]
#[command(name = "trackweb")]
#[command(author = "trackweb Contributors")]
#[command(version = "0.1.0")]
#[command(
    about = "Transaction tracker dashboard: proxy server and operator console",
    long_about = None
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy server (default)
    Serve,
    /// Show one page of transactions
    List {
        /// Page number, starting at 1
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Filter on code, description or source document
        #[arg(short, long)]
        search: Option<String>,
        /// Column to sort the page by
        #[arg(long)]
        sort: Option<SortField>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Show the step timeline of one process instance
    Timeline {
        /// Process id (source document)
        id: String,
    },
    /// Send transactions of a page for reprocessing
    Reprocess {
        /// Page the transactions are on
        #[arg(short, long, default_value_t = 1)]
        page: usize,
        /// Step codes to reprocess
        #[arg(required = true)]
        cod_etapa: Vec<String>,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(Command::InitConfig { force }) = &args.command {
        return init_config(&args.config, *force);
    }

    let (mut config, missing) = Config::load_or_default(args.config.clone())
        .map_err(|e| anyhow::anyhow!("{}", e.to_details()))?;
    config.apply_env_overrides();

    let filter = env_logger::Env::default().default_filter_or(config.logging.level.as_str());
    env_logger::Builder::from_env(filter).init();

    if let Some(e) = missing {
        log::warn!("{}\nUsing default settings.", e.to_details());
    }
    config.validate().map_err(|e| anyhow::anyhow!("{}", e.to_details()))?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => start_server(config).await.map_err(anyhow::Error::from),
            Command::List {
                page,
                search,
                sort,
                desc,
            } => list(&config, page, search, sort, desc).await,
            Command::Timeline { id } => timeline(&config, &id).await,
            Command::Reprocess { page, cod_etapa } => reprocess(&config, page, &cod_etapa).await,
            Command::InitConfig { .. } => Ok(()),
        }
    })
}

fn init_config(path: &PathBuf, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    std::fs::write(path, Config::generate_default())
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn service(config: &Config) -> Arc<TransactionService> {
    let transport = Arc::new(ProxyTransport::from_config(config));
    Arc::new(TransactionService::from_config(transport, config))
}

async fn list(
    config: &Config,
    page: usize,
    search: Option<String>,
    sort: Option<SortField>,
    desc: bool,
) -> anyhow::Result<()> {
    let mut coordinator = Coordinator::from_config(service(config), config);
    let loaded = coordinator.go_to_page(page).await;
    if let Some(term) = search {
        coordinator.set_search(&term);
    }
    if let Some(field) = sort {
        coordinator.toggle_sort(field);
        if desc {
            coordinator.toggle_sort(field);
        }
    }
    render_page(&coordinator);
    print_notices(&mut coordinator);
    if !loaded {
        bail!("could not load page {}", page);
    }
    Ok(())
}

async fn timeline(config: &Config, id: &str) -> anyhow::Result<()> {
    let entries = service(config)
        .get_timeline_by_id(id)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.to_details()))?;
    let steps = build_timeline(entries);
    if steps.is_empty() {
        println!("No steps for {}", id);
    }
    for step in steps {
        let seq = step.entry.sequencia.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<12} {:<30} {}",
            seq,
            step.status.label(),
            step.entry.descricao,
            step.entry.error_message().unwrap_or("")
        );
    }
    Ok(())
}

async fn reprocess(config: &Config, page: usize, codes: &[String]) -> anyhow::Result<()> {
    let mut coordinator = Coordinator::from_config(service(config), config);
    if !coordinator.go_to_page(page).await {
        print_notices(&mut coordinator);
        bail!("could not load page {}", page);
    }
    for code in codes {
        if !coordinator.toggle_row(code) {
            eprintln!("{} is not on page {}, skipped", code, page);
        }
    }

    let summary = coordinator.reprocess_selected().await;
    print_notices(&mut coordinator);
    if let Some(summary) = &summary {
        for (code, err) in &summary.failed {
            let hint = if err.is_retryable() {
                " (retryable)"
            } else {
                ""
            };
            eprintln!("{}{}: {}", code, hint, err.to_details());
        }
    }
    match summary {
        Some(summary) if summary.all_succeeded() => Ok(()),
        Some(summary) => bail!(
            "{} of {} reprocess requests failed",
            summary.failed.len(),
            summary.total()
        ),
        None => bail!("nothing to reprocess"),
    }
}

fn render_page(coordinator: &Coordinator) {
    let stats = coordinator.stats();
    println!(
        "Total: {}  Erros: {}  Aguardando: {}  Concluídas: {}",
        stats.total, stats.errors, stats.pending, stats.completed
    );

    let rows = coordinator.visible_rows();
    for row in &rows {
        println!(
            "{:<16} {:<11} {:<18} {:<18} {:<25} {}",
            row.cod_etapa,
            row.status().label(),
            row.doc_origem,
            row.doc_destino.as_deref().unwrap_or("-"),
            row.timestamp,
            row.descricao
        );
    }

    let window = coordinator.page_window();
    println!(
        "Rows {}-{} of ~{} (page {}/{}), {} shown",
        window.first_index(),
        window.last_index(),
        window.total_count_estimate,
        window.page,
        window.total_pages(),
        rows.len()
    );
}

fn print_notices(coordinator: &mut Coordinator) {
    for notice in coordinator.take_notices() {
        eprintln!("{}", notice);
    }
}
