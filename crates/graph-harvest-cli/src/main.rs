//! Graph Harvest CLI entry point.

use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use graph_harvest::{Config, DailyQuota, DelayRange, JsonlAuditSink, Relation};
use graph_harvest_cli::commands::{
    self, analyze, audit, doctor, harvest, unfollow, Engine, StrategyChoice,
};
use graph_harvest_cli::config::{resolve_audit_path, resolve_session_path};

#[derive(Parser)]
#[command(
    name = "graph-harvest",
    about = "Harvest follower/following lists and run paced unfollow batches",
    version
)]
struct Cli {
    /// Path to the session cookie export (JSON).
    #[arg(short, long, global = true)]
    session: Option<PathBuf>,

    /// Path to the JSONL audit log.
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect the followers or following of an account.
    Harvest {
        /// Account handle, with or without a leading @.
        subject: String,

        /// Which list to collect (followers, following).
        relation: Relation,

        /// Stop after this many accounts.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show the browser window instead of running headless.
        #[arg(long)]
        visible: bool,

        /// Never launch a browser; structured endpoints only.
        #[arg(long)]
        no_browser: bool,

        /// Skip the structured endpoints and read the rendered page.
        #[arg(long)]
        browser_only: bool,

        /// Write the report here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List accounts you follow that do not follow back.
    NonFollowers {
        /// Saved `harvest ... followers` report.
        #[arg(long)]
        followers: PathBuf,

        /// Saved `harvest ... following` report.
        #[arg(long)]
        following: PathBuf,

        /// Keep verified accounts in the result.
        #[arg(long)]
        include_verified: bool,

        /// File of handles never to report, one per line.
        #[arg(long)]
        whitelist: Option<PathBuf>,

        /// Write the report here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Unfollow accounts with a randomized delay between each.
    Unfollow {
        /// Handles to unfollow.
        handles: Vec<String>,

        /// Read targets from a file (non-follower report, harvest report, or handle list).
        #[arg(long)]
        from: Option<PathBuf>,

        /// Minimum delay between actions, in seconds.
        #[arg(long)]
        min_delay: Option<u64>,

        /// Maximum delay between actions, in seconds.
        #[arg(long)]
        max_delay: Option<u64>,

        /// Show the browser window instead of running headless.
        #[arg(long)]
        visible: bool,

        /// Never launch a browser; structured endpoints only.
        #[arg(long)]
        no_browser: bool,

        /// Check the quota and print the plan without acting.
        #[arg(long)]
        dry_run: bool,

        /// Write the batch report here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show today's unfollow quota.
    Stats,

    /// Show recent audit log entries.
    Logs {
        /// Number of entries.
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,

        /// Only entries of this action type (e.g. unfollow, harvest_followers).
        #[arg(long)]
        action: Option<String>,
    },

    /// Check Chromium, session, and audit log readiness.
    Doctor,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   graph-harvest completions bash > ~/.local/share/bash-completion/completions/graph-harvest
    ///   graph-harvest completions zsh > ~/.zfunc/_graph-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_json);

    if let Err(e) = run(cli).await {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env();
    let session_path = resolve_session_path(cli.session.as_deref());
    let audit_path = resolve_audit_path(cli.audit_log.as_deref());

    match cli.command {
        Commands::Harvest {
            subject,
            relation,
            limit,
            visible,
            no_browser,
            browser_only,
            out,
        } => {
            let session = commands::load_session(&session_path)?;
            let choice = StrategyChoice {
                endpoint: !browser_only,
                browser: !no_browser,
            };
            let engine = Engine::new(config, session, choice)?;
            let mut sink = JsonlAuditSink::open(&audit_path)?;
            let args = harvest::HarvestArgs {
                subject,
                relation,
                limit,
                headless: !visible,
            };
            let report =
                harvest::run(&engine, &mut sink, args, commands::cancel_on_interrupt()).await?;
            commands::write_json(out.as_deref(), &report)?;
        }

        Commands::NonFollowers {
            followers,
            following,
            include_verified,
            whitelist,
            out,
        } => {
            let filter = analyze::load_filter(include_verified, whitelist.as_deref())?;
            let followers = analyze::load_harvest(&followers, Relation::Followers)?;
            let following = analyze::load_harvest(&following, Relation::Following)?;
            let report = analyze::run(&followers, &following, &filter);
            commands::write_json(out.as_deref(), &report)?;
        }

        Commands::Unfollow {
            handles,
            from,
            min_delay,
            max_delay,
            visible,
            no_browser,
            dry_run,
            out,
        } => {
            let mut targets: Vec<_> = handles
                .into_iter()
                .map(graph_harvest::ActionTarget::handle)
                .collect();
            if let Some(path) = &from {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                targets.extend(unfollow::parse_targets(&text)?);
            }
            let targets = unfollow::dedup_targets(targets);

            let default_delay = config.action.delay;
            let delay = DelayRange::from_secs(
                min_delay.unwrap_or(default_delay.min.as_secs()),
                max_delay.unwrap_or(default_delay.max.as_secs()),
            );
            let quota = DailyQuota::new(config.action.daily_limit);

            let mut sink = JsonlAuditSink::open(&audit_path)?;
            let consumed = sink.successful_unfollows_today()?;
            let plan = unfollow::plan(targets, delay, quota, consumed)?;
            if dry_run {
                commands::write_json(out.as_deref(), &plan)?;
                return Ok(());
            }

            let session = commands::load_session(&session_path)?;
            let choice = StrategyChoice {
                endpoint: true,
                browser: !no_browser,
            };
            let engine = Engine::new(config, session, choice)?;
            let report = unfollow::execute(
                &engine,
                &mut sink,
                plan,
                !visible,
                commands::cancel_on_interrupt(),
            )
            .await?;
            commands::write_json(out.as_deref(), &report)?;
            if !report.succeeded() {
                anyhow::bail!(
                    "{} of {} unfollows succeeded",
                    report.summary.successful,
                    report.requested
                );
            }
        }

        Commands::Stats => {
            let sink = JsonlAuditSink::open(&audit_path)?;
            let status = audit::quota_status(&sink, DailyQuota::new(config.action.daily_limit))?;
            commands::write_json(None, &status)?;
        }

        Commands::Logs { limit, action } => {
            let sink = JsonlAuditSink::open(&audit_path)?;
            for record in audit::recent(&sink, limit, action.as_deref())? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }

        Commands::Doctor => {
            doctor::require_ready(&session_path, &audit_path)?;
        }

        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "graph-harvest",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
