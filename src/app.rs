use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::core::{
    alerts::{conditions::describe_conditions, engine::AlertEngine, evaluator::PageRequest, model::AlertId},
    config::{ConfigManager, Settings},
    directory::{MemoryDirectory, PageContext},
    error::Result,
    store::AlertStore,
};

#[derive(Debug, Parser)]
#[command(name = "page-alerts", about = "Decide which page alerts a user gets to see")]
struct Cli {
    /// Directory holding settings.json and alerts.json
    #[arg(long, env = "PAGE_ALERTS_DIR", default_value = ".")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the alerts and notices displayed for a page request
    Evaluate(EvaluateArgs),
    /// Print the display conditions of every stored alert
    Describe {
        /// Directory snapshot used to resolve field, cohort and role names
        #[arg(long)]
        directory: Option<PathBuf>,
    },
    /// Print the configured page types and their labels
    PageTypes,
    /// Replace the configured page types, one per line
    SetPageTypes {
        /// Newline-delimited list of page types
        page_types: String,
    },
}

#[derive(Debug, Args)]
struct EvaluateArgs {
    /// Directory snapshot (users, fields, cohorts, roles) as JSON
    #[arg(long)]
    directory: PathBuf,
    /// Page being rendered, with or without the `page-` prefix
    #[arg(long)]
    page_type: String,
    #[arg(long)]
    user: u64,
    /// Course being viewed, 0 outside of a course
    #[arg(long, default_value_t = 0)]
    course: u64,
    /// Navigation context: system, course:<id> or module:<course>:<id>
    #[arg(long)]
    context: Option<PageContext>,
    /// Evaluate at this unix time instead of now
    #[arg(long)]
    at: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AlertConditions {
    id: AlertId,
    title: String,
    enabled: bool,
    conditions: Vec<String>,
}

pub fn run() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn execute(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::new(cli.data_dir.clone());
    let settings = config_manager.load();

    match cli.command {
        Command::Evaluate(args) => {
            let directory = MemoryDirectory::load(&args.directory)?;
            let mut store = AlertStore::new(&cli.data_dir);
            let alerts = store.load()?;

            let context = args.context.unwrap_or(if args.course > 0 {
                PageContext::Course(args.course)
            } else {
                PageContext::System
            });
            let mut request = PageRequest::new(args.page_type, context, args.course, args.user);
            if let Some(at) = args.at {
                request = request.at(at);
            }

            let engine = AlertEngine::new(&settings);
            let displayed = engine.collect(alerts, &request, &directory);
            println!("{}", serde_json::to_string_pretty(&displayed)?);
        }
        Command::Describe { directory } => {
            let directory = match directory {
                Some(path) => MemoryDirectory::load(path)?,
                None => MemoryDirectory::new(),
            };
            let mut store = AlertStore::new(&cli.data_dir);
            let page_types = settings.page_types();
            let listing: Vec<AlertConditions> = store
                .load()?
                .iter()
                .map(|alert| AlertConditions {
                    id: alert.id,
                    title: alert.title.clone(),
                    enabled: alert.enabled,
                    conditions: describe_conditions(alert, &page_types, &directory),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::PageTypes => {
            for (value, label) in settings.page_types().menu() {
                println!("{}\t{}", value, label);
            }
        }
        Command::SetPageTypes { page_types } => {
            let updated = Settings { page_types };
            config_manager.save(&updated)?;
            log::info!("Saved {} page types", updated.page_types().values().len());
        }
    }
    Ok(())
}
