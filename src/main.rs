mod broker;
mod config;
mod deposit;
mod error;
mod investor;
mod pipeline;
mod portfolio;
mod scoring;
mod stocks;
mod users;
mod volatility;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::broker::TInvestClient;
use crate::config::Config;
use crate::deposit::Horizon;
use crate::error::PipelineError;
use crate::investor::{InvestmentClass, InvestmentRequest, SUGGESTED_AMOUNTS};
use crate::scoring::RandomScorer;
use crate::stocks::{FetchSettings, ShareFilter, ANY, CATEGORY_PRESETS, COUNTRY_PRESETS};
use crate::users::{FileUserStore, UserStore};

#[derive(Parser, Debug)]
#[command(author, version, about = "Portfolio recommendation & bank deposits", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Credentials {
    #[arg(long)]
    user: String,

    #[arg(long)]
    password: String,
}

#[derive(Args, Debug)]
struct Amount {
    /// Custom amount in RUB; overrides --suggested
    #[arg(long)]
    budget: Option<String>,

    /// One of the suggested amounts: 5000, 10000, 20000, 50000
    #[arg(long, default_value_t = 5000.0, value_parser = parse_suggested)]
    suggested: f64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register(Credentials),
    /// Check credentials
    Login(Credentials),
    /// Recommend a stock portfolio for the budget
    Stocks {
        #[command(flatten)]
        credentials: Credentials,
        #[command(flatten)]
        amount: Amount,
        /// Technology, Finance, Healthcare, Energy or Any (name substring)
        #[arg(long, default_value = ANY)]
        category: String,
        /// Russia, USA, China, Germany, Japan or Any
        #[arg(long, default_value = ANY)]
        country: String,
        /// Seed the random scorer for a reproducible ranking
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Estimate bank deposit growth
    Deposit {
        #[command(flatten)]
        credentials: Credentials,
        #[command(flatten)]
        amount: Amount,
        /// Short-term (3%) or Long-term (6%)
        #[arg(long, default_value = "Short-term")]
        horizon: String,
    },
}

fn parse_suggested(s: &str) -> Result<f64, String> {
    let v: f64 = s.trim().parse().map_err(|_| format!("'{}' is not a number", s))?;
    if SUGGESTED_AMOUNTS.contains(&v) {
        Ok(v)
    } else {
        Err(format!("expected one of {:?}", SUGGESTED_AMOUNTS))
    }
}

fn require_login(store: &FileUserStore, credentials: &Credentials) -> anyhow::Result<()> {
    if !store.verify_user(&credentials.user, &credentials.password) {
        bail!("Login failed: incorrect username or password.");
    }
    Ok(())
}

async fn execute(cli: Cli, config: Config) -> anyhow::Result<()> {
    let mut store = FileUserStore::load(&config.users_file);

    match cli.command {
        Command::Register(credentials) => {
            store
                .create_user(&credentials.user, &credentials.password)
                .context("Registration failed")?;
            println!("Registration successful. You are now logged in as {}.", credentials.user);
        }
        Command::Login(credentials) => {
            require_login(&store, &credentials)?;
            println!("Logged in as {}.", credentials.user);
        }
        Command::Stocks { credentials, amount, category, country, seed } => {
            require_login(&store, &credentials)?;
            for (value, presets, label) in [
                (&category, CATEGORY_PRESETS, "category"),
                (&country, COUNTRY_PRESETS, "country"),
            ] {
                if !presets.iter().any(|p| p.eq_ignore_ascii_case(value)) {
                    info!(value = %value, "non-preset {} filter", label);
                }
            }

            let request = InvestmentRequest::new(
                amount.budget.as_deref(),
                amount.suggested,
                InvestmentClass::Stocks,
                Horizon::default(),
                ShareFilter::new(&category, &country),
            )?;

            let token = config.require_token()?;
            let client = TInvestClient::new(&config.api_url, token, config.request_timeout)?;
            let settings = FetchSettings::from(&config);
            let scorer = seed.map_or_else(RandomScorer::new, RandomScorer::seeded);

            let recommendation = pipeline::run(&request, &client, &scorer, &settings).await?;
            println!("{}", recommendation);
        }
        Command::Deposit { credentials, amount, horizon } => {
            require_login(&store, &credentials)?;
            let horizon: Horizon = horizon.parse()?;
            let budget = investor::resolve_budget(amount.budget.as_deref(), amount.suggested)?;
            let estimate = pipeline::run_deposit_pipeline(budget, horizon)?;
            println!("{}", estimate);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    info!(?config, "configuration loaded");

    if let Err(e) = execute(cli, config).await {
        match e.downcast_ref::<PipelineError>() {
            Some(p) if p.is_fatal() => error!(error = %p, "pipeline aborted"),
            _ => error!(error = %e, "request failed"),
        }
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stocks_accepts_an_optional_seed() {
        let cli = Cli::try_parse_from([
            "invest_advisor", "stocks", "--user", "a", "--password", "p", "--seed", "7",
        ])
        .unwrap();
        match cli.command {
            Command::Stocks { seed, category, amount, .. } => {
                assert_eq!(seed, Some(7));
                assert_eq!(category, ANY);
                assert_eq!(amount.suggested, 5000.0);
            }
            other => panic!("expected stocks, got {:?}", other),
        }
    }

    #[test]
    fn suggested_amount_must_be_a_preset() {
        assert_eq!(parse_suggested("20000").unwrap(), 20000.0);
        assert!(parse_suggested("1234").is_err());
        assert!(parse_suggested("lots").is_err());
    }

    #[test]
    fn pipeline_aborts_are_recognised_through_anyhow() {
        let e: anyhow::Error = PipelineError::Connectivity("down".into()).into();
        assert!(e.downcast_ref::<PipelineError>().is_some_and(PipelineError::is_fatal));
    }
}
