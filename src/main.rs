//! `emm11-scout`: drive the eMM11 transit-pass pipeline from the command line.
//!
//! Every stage is its own subcommand so it can be run alone; records travel
//! between stages as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use emm11_scout::core::config::{load_config, load_config_from};
use emm11_scout::tools::pipeline::{derive_pairs, mark_unused, unused_identifiers, NOTICE_NO_OUTPUT};
use emm11_scout::tools::RunOutcome;
use emm11_scout::tools::synthesize::prepare_output_dir;
use emm11_scout::{
    ChromeProvider, Emm11Config, Pipeline, Progress, Record, SynthesisStrategy, TesseractRecognizer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "emm11-scout", version, about = "Find unused eMM11 transit passes and print them")]
struct Cli {
    /// Config file (default: EMM11_CONFIG, ./emm11.json, ~/.emm11/emm11.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[arg(long, global = true)]
    headed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch records for an id range and district; writes records JSON.
    Fetch {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
        #[arg(long)]
        district: String,
        /// Write JSON here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Log in and flag which fetched records are unused.
    Probe {
        /// Records JSON produced by `fetch`.
        #[arg(long)]
        records: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render and merge PDFs for the given inbound pass numbers.
    Synthesize {
        /// Inbound pass numbers.
        #[arg(required_unless_present = "records")]
        ids: Vec<String>,
        /// Take the unused records from a `probe` output instead.
        #[arg(long, conflicts_with = "ids")]
        records: Option<PathBuf>,
        /// `overlay` (form template) or `raster` (print the live page).
        #[arg(long)]
        strategy: Option<SynthesisStrategy>,
    },

    /// Fetch, probe and synthesize in one go.
    Run {
        #[arg(long)]
        start: u64,
        #[arg(long)]
        end: u64,
        #[arg(long)]
        district: String,
        /// Write the run report JSON here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn read_records(path: &PathBuf) -> anyhow::Result<Vec<Record>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing records from {}", path.display()))
}

fn write_json<T: serde::Serialize>(value: &T, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("📄 Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn print_notice(shortfall: Option<RunOutcome>) {
    if let Some(notice) = shortfall.and_then(RunOutcome::notice) {
        eprintln!("{notice}");
    }
}

fn build_pipeline(cfg: Emm11Config, needs_login: bool) -> anyhow::Result<Pipeline> {
    cfg.validate()?;
    let provider = ChromeProvider::from_config(&cfg)?;
    let recognizer = match TesseractRecognizer::locate(&cfg.resolve_captcha_command()) {
        Ok(r) => r,
        Err(e) if needs_login => return Err(e.into()),
        // never consulted by fetch or synthesize
        Err(_) => TesseractRecognizer::unchecked(cfg.resolve_captcha_command()),
    };
    Ok(Pipeline::new(cfg, Arc::new(provider), Arc::new(recognizer), Progress::detached()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("config file {} not readable", path.display()))?,
        None => load_config(),
    };
    if cli.headed {
        cfg.headless = Some(false);
    }

    match cli.command {
        Command::Fetch {
            start,
            end,
            district,
            out,
        } => {
            let pipeline = build_pipeline(cfg, false)?;
            let to_stdout = out.is_none();
            let records = pipeline
                .fetcher()
                .fetch(start, end, &district)
                .await;
            for record in &records {
                if to_stdout {
                    eprintln!("{}\n", record.notification());
                } else {
                    println!("{}\n", record.notification());
                }
            }
            print_notice(RunOutcome::after_fetch(&records));
            write_json(&records, out.as_ref())?;
        }

        Command::Probe { records, out } => {
            let mut records = read_records(&records)?;
            let pipeline = build_pipeline(cfg, true)?;
            let pairs = derive_pairs(&records, &Progress::detached());
            let unused = if pairs.is_empty() {
                Vec::new()
            } else {
                pipeline.probe(&pairs).await?
            };
            mark_unused(&mut records, &unused);
            print_notice(RunOutcome::after_probe(&records));
            write_json(&records, out.as_ref())?;
        }

        Command::Synthesize {
            ids,
            records,
            strategy,
        } => {
            if let Some(strategy) = strategy {
                cfg.strategy = Some(strategy);
            }
            let identifiers = match records {
                Some(path) => unused_identifiers(&read_records(&path)?),
                None => ids,
            };
            if identifiers.is_empty() {
                bail!("no identifiers to synthesize");
            }
            prepare_output_dir(&cfg.resolve_output_dir()).await?;
            let pipeline = build_pipeline(cfg, false)?;
            match pipeline.synthesizer().synthesize(&identifiers).await {
                Some(path) => println!("{}", path.display()),
                None => bail!(NOTICE_NO_OUTPUT),
            }
        }

        Command::Run {
            start,
            end,
            district,
            report,
        } => {
            let pipeline = build_pipeline(cfg, true)?;
            let run = pipeline
                .run(start, end, &district, |record| {
                    println!("{}\n", record.notification());
                })
                .await?;
            print_notice(Some(run.outcome));
            if let Some(path) = &run.merged_path {
                println!("{}", path.display());
            }
            if let Some(report_path) = report {
                write_json(&run, Some(&report_path))?;
            }
        }
    }

    Ok(())
}
