//! Compounder keeper
//!
//! Run with: cargo run -- --ticks 200
//!
//! Builds a simulated deployment (vault, strategy, farm, router), seeds the
//! configured depositors and then harvests on a fixed cadence, printing
//! APR and accounting health as it goes.

use alloy_primitives::U256;
use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use compounder::config::{Config, HarvestRecord};
use compounder::math::to_f64;
use compounder::simulator::{Deployment, KEEPER};
use compounder::vault::VaultStrategy;

#[derive(Parser, Debug)]
#[command(name = "compounder", version, about = "Auto-compounding vault keeper (simulated)")]
struct Args {
    /// TOML config file; defaults + environment when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of harvests to run
    #[arg(long)]
    ticks: Option<u64>,

    /// Simulated seconds between harvests
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Append every harvest to this JSON-lines file
    #[arg(long)]
    record_log: Option<PathBuf>,

    /// Wall-clock pause between ticks (milliseconds)
    #[arg(long)]
    pace_ms: Option<u64>,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🌾 COMPOUNDER - Multi-Pool Yield Vault Keeper").cyan().bold()
    );
    println!(
        "{}",
        style("    Share Accounting | Harvest Engine | Simulated Farm").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

/// Totals gathered over a keeper run
#[derive(Debug, Default)]
struct KeeperStats {
    harvests: u64,
    failed_harvests: u64,
    failed_pool_claims: u64,
    reconciliations: u64,
    gross_profit: U256,
    fees_paid: U256,
    interrupted: bool,
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(ticks) = args.ticks {
        config.ticks = ticks;
    }
    if let Some(interval) = args.interval_secs {
        config.harvest_interval_secs = interval;
    }
    if let Some(pace) = args.pace_ms {
        config.pace_ms = pace;
    }
    if let Some(path) = &args.record_log {
        config.record_log = true;
        config.record_log_path = path.to_string_lossy().into_owned();
    }
}

/// One harvest tick: advance time, harvest, keep accounting honest
fn run_tick(
    deployment: &mut Deployment,
    config: &Config,
    tick: u64,
    stats: &mut KeeperStats,
) -> Result<Option<HarvestRecord>> {
    let decimals = deployment.vault.config().decimals;
    let streamed = deployment.advance(config, config.harvest_interval_secs);
    debug!("Tick {}: xBOO bar earned {}", tick, to_f64(streamed, decimals));

    let Some(strategy) = deployment.vault.strategy_mut() else {
        return Err(color_eyre::eyre::eyre!("Vault has no strategy"));
    };

    if let Ok((net, caller_fee)) = strategy.estimate_harvest() {
        debug!(
            "Tick {}: expecting {:.6} net, {:.6} caller fee",
            tick,
            to_f64(net, decimals),
            to_f64(caller_fee, decimals)
        );
    }

    let report = match strategy.harvest(KEEPER) {
        Ok(report) => report,
        Err(e) => {
            stats.failed_harvests += 1;
            warn!("Tick {}: harvest failed ({:?}): {}", tick, e.kind(), e);
            return Ok(None);
        }
    };

    stats.harvests += 1;
    stats.failed_pool_claims += report.failed_pools() as u64;
    stats.gross_profit += report.gross_profit;
    stats.fees_paid += report.fees.total_fees();
    for outcome in report.pools.iter().filter(|o| o.error.is_some()) {
        warn!(
            "Tick {}: pool #{} skipped: {}",
            tick,
            outcome.pool_id,
            outcome.error.as_deref().unwrap_or("unknown")
        );
    }

    if !strategy.is_internal_accounting_accurate() {
        warn!("Tick {}: internal accounting drifted, reconciling", tick);
        strategy.update_internal_accounting()?;
        stats.reconciliations += 1;
    }

    let apr_bps = strategy.average_apr_across_last_n_harvests(config.apr_window);
    let pps = deployment.vault.price_per_full_share()?;

    Ok(Some(HarvestRecord {
        timestamp: Utc::now(),
        tick,
        sim_time: report.timestamp,
        gross_profit: to_f64(report.gross_profit, decimals),
        caller_fee: to_f64(report.fees.caller, decimals),
        treasury_fee: to_f64(report.fees.treasury, decimals),
        strategist_fee: to_f64(report.fees.strategist, decimals),
        reinvested: to_f64(report.reinvested, decimals),
        total_managed_assets: to_f64(deployment.vault.total_managed_assets(), decimals),
        price_per_share: to_f64(pps, decimals),
        apr_bps: apr_bps.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
        failed_pools: report.failed_pools(),
    }))
}

/// Harvest `config.ticks` times, paced by `config.pace_ms`; stops early on ctrl-c
async fn run_keeper(
    deployment: &mut Deployment,
    config: &Config,
    progress: &ProgressBar,
) -> Result<KeeperStats> {
    let mut stats = KeeperStats::default();
    let mut pacer = tokio::time::interval(Duration::from_millis(config.pace_ms.max(1)));

    for tick in 1..=config.ticks {
        tokio::select! {
            _ = pacer.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted after {} ticks", tick - 1);
                stats.interrupted = true;
                break;
            }
        }

        if let Some(record) = run_tick(deployment, config, tick, &mut stats)? {
            if config.record_log {
                if let Err(e) = record.append_to_file(&config.record_log_path) {
                    warn!("Failed to write harvest record: {}", e);
                }
            }
            progress.set_message(format!(
                "pps {:.6} | apr {:.2}%",
                record.price_per_share,
                record.apr_bps as f64 / 100.0
            ));
        }
        progress.inc(1);
    }

    Ok(stats)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("compounder=info".parse()?),
        )
        .init();

    let args = Args::parse();
    print_banner();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    apply_overrides(&mut config, &args);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your config file or .env");
        return Err(e);
    }

    // Print configuration summary
    config.print_summary();
    println!();

    // =============================================
    // PHASE 1: DEPLOYMENT
    // =============================================
    println!("{}", style("═══ PHASE 1: DEPLOYMENT ═══").blue().bold());
    println!();

    let start = Instant::now();
    let mut deployment = Deployment::build(&config)?;
    let decimals = deployment.vault.config().decimals;
    println!(
        "{} Vault, strategy and {} farm pools wired in {:?}",
        style("✓").green(),
        config.pools.len(),
        start.elapsed()
    );

    let seeded = deployment.seed_depositors(&config)?;
    for (label, shares) in &seeded {
        println!("   {:<10} {:>14.4} shares", label, to_f64(*shares, decimals));
    }
    println!(
        "{} Managed assets: {:.4} {}",
        style("✓").green(),
        to_f64(deployment.vault.total_managed_assets(), decimals),
        config.base_token
    );

    // =============================================
    // PHASE 2: KEEPER LOOP
    // =============================================
    println!();
    println!("{}", style("═══ PHASE 2: KEEPER LOOP ═══").magenta().bold());
    println!();

    let progress = ProgressBar::new(config.ticks);
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    let stats = run_keeper(&mut deployment, &config, &progress).await?;
    progress.finish_with_message("done");

    // =============================================
    // SUMMARY
    // =============================================
    let Some(strategy) = deployment.vault.strategy() else {
        return Err(color_eyre::eyre::eyre!("Vault has no strategy"));
    };
    let apr = strategy.average_apr_across_last_n_harvests(config.apr_window);
    let pps = deployment.vault.price_per_full_share()?;

    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!(
        "{}",
        style(if stats.interrupted { " ⏹️  KEEPER STOPPED" } else { " ✅ KEEPER RUN COMPLETE" })
            .green()
            .bold()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!();
    println!("Summary:");
    println!(
        "  • Harvests: {} ok, {} failed, {} pool claims skipped",
        stats.harvests, stats.failed_harvests, stats.failed_pool_claims
    );
    println!(
        "  • Gross profit: {:.6} {} ({:.6} in fees)",
        to_f64(stats.gross_profit, decimals),
        config.base_token,
        to_f64(stats.fees_paid, decimals)
    );
    println!("  • Price per share: {:.6}", to_f64(pps, decimals));
    println!(
        "  • APR (last {} intervals): {:.2}%",
        config.apr_window,
        apr as f64 / 100.0
    );
    println!(
        "  • Managed assets: {:.4} {} (strategy {})",
        to_f64(deployment.vault.total_managed_assets(), decimals),
        config.base_token,
        strategy.status()
    );
    println!(
        "  • Accounting: {} ({} reconciliations)",
        if strategy.is_internal_accounting_accurate() {
            style("✓ accurate").green()
        } else {
            style("✗ drifted").red()
        },
        stats.reconciliations
    );
    for (label, holder) in &deployment.depositors {
        let shares = deployment.vault.balance_of(*holder);
        let value = compounder::math::mul_div(shares, pps, compounder::math::unit(decimals))?;
        println!("    {:<10} {:>14.4} {}", label, to_f64(value, decimals), config.base_token);
    }
    if config.record_log {
        println!();
        println!("📝 Harvest records appended to {}", config.record_log_path);
    }
    info!("Keeper finished after {} harvests", stats.harvests);

    Ok(())
}
