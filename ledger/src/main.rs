use std::{future::Future, path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use nodeshare_common::{
    account::Amount,
    crypto::{Address, Hash},
    logger::{default_logs_datetime_format, setup_logger, LogLevel, LoggerConfig},
    referral::{CommissionSettings, PurchaseEvent, PurchaseId, Rate},
    withdrawal::{AdminDecision, Decision, WithdrawalRequest},
};
use nodeshare_ledger::{
    config::{defaults, ConfigValidator, LedgerConfig, RocksDBConfig, StorageBackend},
    core::{
        engine::CommissionEngine,
        error::LedgerError,
        storage::{MemoryStorage, RocksStorage, Storage},
    },
};
use rust_decimal::Decimal;
use serde::Serialize;

const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Referral commission ledger
#[derive(Parser, Clone, Debug)]
#[command(name = "nodeshare-ledger", version)]
#[command(about = "Referral commission distribution and withdrawal ledger")]
pub struct CliConfig {
    /// Set log level
    #[clap(long, value_enum, default_value_t = defaults::LOG_LEVEL)]
    log_level: LogLevel,

    /// Disable the log file
    #[clap(long)]
    disable_file_logging: bool,

    /// Use a single log file instead of one per day
    #[clap(long)]
    disable_file_log_date_based: bool,

    /// Disable the usage of colors in log
    #[clap(long)]
    disable_log_color: bool,

    /// Log filename
    #[clap(long, default_value_t = String::from(defaults::FILENAME_LOG))]
    filename_log: String,

    /// Logs directory
    #[clap(long, default_value_t = String::from(defaults::LOGS_PATH))]
    logs_path: String,

    /// Storage backend
    #[clap(long, value_enum, default_value_t = StorageBackend::Rocksdb)]
    storage_backend: StorageBackend,

    /// Storage directory
    #[clap(long, default_value_t = String::from(defaults::STORAGE_PATH))]
    storage_path: String,

    #[clap(flatten)]
    rocksdb: RocksDBConfig,

    /// Deadline in milliseconds for acquiring the locks of one mutation
    #[clap(long, default_value_t = defaults::LOCK_TIMEOUT_MS)]
    lock_timeout_ms: u64,

    /// Minimum withdrawal value in USD
    #[clap(long, default_value = "10")]
    min_withdrawal_usd: Decimal,

    /// Retries of a whole operation on retryable errors
    #[clap(long, default_value_t = defaults::MAX_RETRIES)]
    max_retries: u32,

    /// Delay between retries in milliseconds
    #[clap(long, default_value_t = defaults::RETRY_DELAY_MS)]
    retry_delay_ms: u64,

    /// Enable strict configuration validation
    #[clap(long)]
    strict_validation: bool,

    /// Disable auto-fix of configuration issues
    #[clap(long)]
    no_auto_fix: bool,

    /// JSON file to load the configuration from
    #[clap(long)]
    config_file: Option<String>,

    /// Generate the template at the `config_file` path
    #[clap(long)]
    generate_config_template: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// List the member level table
    Tiers,
    /// Register a wallet, optionally under a referrer
    Register {
        address: Address,
        #[clap(long)]
        parent: Option<Address>,
        #[clap(long, default_value = "normal")]
        tier: String,
    },
    /// Distribute the commission of a purchase
    Purchase {
        #[clap(long)]
        id: String,
        #[clap(long)]
        purchaser: Address,
        /// Amount in atomic units
        #[clap(long)]
        amount: Amount,
        #[clap(long, default_value = "normal")]
        tier: String,
    },
    /// Set the level 1 and level 2 rates of a wallet, in basis points
    SetRates {
        wallet: Address,
        #[clap(long)]
        level1_bps: u32,
        #[clap(long)]
        level2_bps: u32,
    },
    /// Request a withdrawal
    Withdraw {
        wallet: Address,
        /// Amount in atomic units
        #[clap(long)]
        amount: Amount,
        /// USD price of one token
        #[clap(long)]
        price: Decimal,
        #[clap(long, default_value_t = 0)]
        burn_bps: u32,
    },
    /// Move a pending withdrawal to processing
    Process { id: Hash },
    /// Complete a withdrawal
    Approve {
        id: Hash,
        #[clap(long)]
        settlement_ref: Option<String>,
    },
    /// Reject a withdrawal and refund the held amount
    Reject {
        id: Hash,
        #[clap(long)]
        reason: String,
    },
    /// Show a wallet snapshot
    Wallet { address: Address },
    /// Latest commission records of a wallet
    Commissions {
        address: Address,
        #[clap(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Latest withdrawals of a wallet
    Withdrawals {
        address: Address,
        #[clap(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Check the stored hierarchy of a wallet against its parent links
    Verify { address: Address },
}

impl CliConfig {
    fn to_ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            log_level: self.log_level,
            disable_file_logging: self.disable_file_logging,
            disable_file_log_date_based: self.disable_file_log_date_based,
            disable_log_color: self.disable_log_color,
            filename_log: self.filename_log.clone(),
            logs_path: self.logs_path.clone(),
            storage_backend: self.storage_backend,
            storage_path: self.storage_path.clone(),
            rocksdb: self.rocksdb.clone(),
            lock_timeout_ms: self.lock_timeout_ms,
            min_withdrawal_usd: self.min_withdrawal_usd,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            auto_fix_config: !self.no_auto_fix,
            strict_validation: self.strict_validation,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliConfig::parse();

    if let Some(path) = cli.config_file.as_ref() {
        if cli.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {path}");
                return Ok(());
            }

            LedgerConfig::generate_template(path)?;
            println!("Configuration template generated at {path}");
            return Ok(());
        }
    }

    let config = match &cli.config_file {
        Some(path) => LedgerConfig::from_file(path, cli.strict_validation, !cli.no_auto_fix)?,
        None => {
            let mut config = cli.to_ledger_config();
            let validator = ConfigValidator::new(config.strict_validation, config.auto_fix_config);
            validator.validate(&mut config)?;
            config
        }
    };

    setup_logger(LoggerConfig {
        level: config.log_level,
        dir_path: &config.logs_path,
        filename_log: &config.filename_log,
        disable_file_logging: config.disable_file_logging,
        disable_file_log_date_based: config.disable_file_log_date_based,
        disable_colors: config.disable_log_color,
        module_logs: vec![("rocksdb".to_string(), LogLevel::Warn)],
        file_level: config.log_level,
        logs_datetime_format: default_logs_datetime_format(),
    })?;

    let Some(command) = cli.command else {
        info!("no command given, nothing to do");
        return Ok(());
    };

    match config.storage_backend {
        StorageBackend::Rocksdb => {
            let storage = Arc::new(RocksStorage::new(&config.storage_path, &config.rocksdb)?);
            let result = run(storage.clone(), &config, command).await;
            storage.flush()?;
            result
        }
        StorageBackend::Memory => run(Arc::new(MemoryStorage::new()), &config, command).await,
    }
}

async fn run<S: Storage>(storage: Arc<S>, config: &LedgerConfig, command: Command) -> Result<()> {
    let engine = CommissionEngine::new(storage, config.to_engine_config()).await?;
    let engine = &engine;

    match command {
        Command::Tiers => print_json(&engine.member_levels().await),
        Command::Register {
            address,
            parent,
            tier,
        } => {
            let wallet = with_retries(config, || {
                engine.register_wallet(&address, parent.as_ref(), &tier)
            })
            .await?;
            print_json(&wallet)
        }
        Command::Purchase {
            id,
            purchaser,
            amount,
            tier,
        } => {
            let event = PurchaseEvent {
                purchase_id: PurchaseId::new(&id)?,
                purchaser,
                amount,
                purchaser_tier: tier,
            };
            let outcome = with_retries(config, || engine.process_purchase(&event)).await?;
            if outcome.is_duplicate() {
                warn!("purchase {} was already applied", event.purchase_id);
            }
            print_json(outcome.receipt())
        }
        Command::SetRates {
            wallet,
            level1_bps,
            level2_bps,
        } => {
            let settings = CommissionSettings {
                level1_rate: Rate::new(level1_bps)?,
                level2_rate: Rate::new(level2_bps)?,
            };
            let schedule = with_retries(config, || {
                engine.set_commission_settings(&wallet, settings)
            })
            .await?;
            print_json(&schedule)
        }
        Command::Withdraw {
            wallet,
            amount,
            price,
            burn_bps,
        } => {
            let request = WithdrawalRequest {
                wallet,
                amount,
                current_token_price: price,
                burn_rate: Rate::from_bps(burn_bps),
            };
            let record = with_retries(config, || engine.request_withdrawal(&request)).await?;
            print_json(&record)
        }
        Command::Process { id } => {
            let record = with_retries(config, || engine.mark_withdrawal_processing(&id)).await?;
            print_json(&record)
        }
        Command::Approve { id, settlement_ref } => {
            let decision = AdminDecision {
                withdrawal_id: id,
                decision: Decision::Approve { settlement_ref },
            };
            let record =
                with_retries(config, || engine.decide_withdrawal(decision.clone())).await?;
            print_json(&record)
        }
        Command::Reject { id, reason } => {
            let decision = AdminDecision {
                withdrawal_id: id,
                decision: Decision::Reject { reason },
            };
            let record =
                with_retries(config, || engine.decide_withdrawal(decision.clone())).await?;
            print_json(&record)
        }
        Command::Wallet { address } => print_json(&engine.wallet_snapshot(&address).await?),
        Command::Commissions { address, limit } => {
            print_json(&engine.commission_history(&address, limit).await?)
        }
        Command::Withdrawals { address, limit } => {
            print_json(&engine.withdrawal_history(&address, limit).await?)
        }
        Command::Verify { address } => {
            let depth = engine.verify_hierarchy(&address).await?;
            print_json(&serde_json::json!({ "wallet": address, "verified_depth": depth }))
        }
    }
}

// Retry the whole operation while the error is retryable
async fn with_retries<T, F, Fut>(config: &LedgerConfig, mut operation: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                warn!(
                    "attempt {}/{} failed: {}, retrying in {} ms",
                    attempt, config.max_retries, e, config.retry_delay_ms
                );
                tokio::time::sleep(config.retry_delay()).await;
            }
            result => return result,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", content);
    Ok(())
}
