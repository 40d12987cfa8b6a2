use std::path::PathBuf;
use std::process::ExitCode;

use caddy_ops::cli;
use caddy_ops::database_ops::migrations::MigrationSet;
use caddy_ops::util::{env, logging};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "caddy-ops", version, about = "Kitchen scheduling store maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Check which tables exist and whether they hold rows
    Probe {
        /// Optional comma-separated table filter
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
        /// Extra `table.column` checks
        #[arg(long = "column")]
        columns: Vec<String>,
    },
    /// Print row counts for the configured tables
    Counts {
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Apply schema sets (planning, absences, rls); prints the SQL unless --execute
    Migrate {
        /// Sets to apply (default: all, in order)
        sets: Vec<MigrationSet>,
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
    /// Find and remove duplicate planning entries for one day
    Dedupe {
        /// Day to reconcile, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
    /// Fill planning.session from a rules file
    BackfillSession {
        /// JSON rules file (or CADDY_SESSION_RULES)
        #[arg(long)]
        rules: Option<PathBuf>,
        #[arg(long, conflicts_with = "all_dates")]
        date: Option<NaiveDate>,
        /// Every row with an empty session, regardless of date
        #[arg(long, default_value_t = false)]
        all_dates: bool,
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
    /// List absences for a day and flag inconsistent rows
    Absences {
        #[arg(long, conflicts_with = "all")]
        date: Option<NaiveDate>,
        /// Check the whole table
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Planning entries pointing at unknown employees or postes
    Orphans {
        /// First day scanned (default: 30 days ago)
        #[arg(long)]
        since: Option<NaiveDate>,
    },
    /// Compare what the anon and service-role keys can read
    RlsCheck {
        #[arg(long, value_delimiter = ',')]
        tables: Option<Vec<String>>,
    },
    /// Insert or clean reference postes and créneaux
    Seed {
        #[command(subcommand)]
        action: SeedCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SeedCommand {
    /// Insert missing reference rows
    Create,
    /// Delete seeded rows no planning entry uses
    Clean {
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
}

async fn dispatch(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Probe { tables, columns } => {
            cli::probe::run(cli::probe::ProbeConfig { tables, columns }).await
        }
        Commands::Counts { tables } => cli::counts::run(cli::counts::CountsConfig { tables }).await,
        Commands::Migrate { sets, execute } => {
            cli::migrate::run(cli::migrate::MigrateConfig { sets, execute }).await
        }
        Commands::Dedupe { date, execute } => {
            cli::dedupe::run(cli::dedupe::DedupeConfig { date, execute }).await
        }
        Commands::BackfillSession {
            rules,
            date,
            all_dates,
            execute,
        } => {
            use cli::backfill::{run, BackfillConfig};
            run(BackfillConfig {
                rules,
                date,
                all_dates,
                execute,
            })
            .await
        }
        Commands::Absences { date, all } => {
            cli::absences::run(cli::absences::AbsencesConfig { date, all }).await
        }
        Commands::Orphans { since } => cli::orphans::run(cli::orphans::OrphansConfig { since }).await,
        Commands::RlsCheck { tables } => {
            cli::rls_check::run(cli::rls_check::RlsCheckConfig { tables }).await
        }
        Commands::Seed { action } => {
            use cli::seed::{run, SeedAction, SeedConfig};
            let cfg = match action {
                SeedCommand::Create => SeedConfig {
                    action: SeedAction::Create,
                    execute: true,
                },
                SeedCommand::Clean { execute } => SeedConfig {
                    action: SeedAction::Clean,
                    execute,
                },
            };
            run(cfg).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    if let Err(e) = logging::init_tracing("info") {
        eprintln!("tracing init failed: {e}");
    }
    env::bootstrap_cli("caddy-ops");

    let cli = Cli::parse();
    cli::exit_code(dispatch(cli.command).await)
}
