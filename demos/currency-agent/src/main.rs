//! Currency conversion agent: asks a model which tools to call, runs them,
//! and prints what came back.

use std::path::PathBuf;

use agent_config::AgentConfig;
use agent_kernel::{BackendDispatcher, Query, RunOptions, ToolCallingAgent};
use agent_tools::{
    ParamType, ToolArguments, ToolError, ToolHandle, ToolMetadata, ToolParameter, ToolRegistry,
    ToolResult,
};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};

/// Units of each currency per US dollar.
const USD_RATES: &[(&str, f64)] = &[
    ("USD", 1.0),
    ("EUR", 0.92),
    ("GBP", 0.79),
    ("JPY", 149.5),
    ("CHF", 0.88),
    ("CAD", 1.37),
    ("TRY", 34.2),
];

#[derive(Debug, Parser)]
#[command(about = "Answer currency questions with a tool-calling model")]
struct Args {
    /// Question for the agent.
    #[arg(default_value = "Please convert 100 USD to EUR")]
    query: String,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend name (`ollama` or `api`).
    #[arg(long)]
    backend: Option<String>,

    /// Hosted provider for the `api` backend.
    #[arg(long)]
    provider: Option<String>,

    /// Model identifier.
    #[arg(long)]
    model: Option<String>,

    /// Print the completion without executing it.
    #[arg(long)]
    dry_run: bool,

    /// Advertise only the most relevant N tools.
    #[arg(long)]
    num_tools: Option<usize>,

    /// Do not log the raw completion.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> Result<AgentConfig> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => AgentConfig::default(),
        }
        .apply_env();
        if let Some(backend) = &self.backend {
            config.backend.clone_from(backend);
        }
        if self.provider.is_some() {
            config.provider.clone_from(&self.provider);
        }
        if self.model.is_some() {
            config.model.clone_from(&self.model);
        }
        config.validate()?;
        Ok(config)
    }

    fn run_options(&self, config: &AgentConfig) -> RunOptions {
        let mut options = RunOptions::from(config);
        if self.dry_run {
            options = options.with_dry_run(true);
        }
        if self.quiet {
            options = options.with_show_completion(false);
        }
        if let Some(limit) = self.num_tools {
            options = options.with_num_tools(limit);
        }
        options
    }
}

fn usd_rate(code: &str) -> Option<f64> {
    USD_RATES
        .iter()
        .find(|(currency, _)| currency.eq_ignore_ascii_case(code))
        .map(|(_, rate)| *rate)
}

async fn convert_currency(args: ToolArguments) -> ToolResult<Value> {
    let amount = args["amount"].as_f64().unwrap_or_default();
    let from = args["from_currency"].as_str().unwrap_or_default();
    let to = args["to_currency"].as_str().unwrap_or_default();

    let (Some(from_rate), Some(to_rate)) = (usd_rate(from), usd_rate(to)) else {
        return Err(ToolError::execution(format!(
            "unable to find exchange rate for {from} to {to}"
        )));
    };
    let converted = amount / from_rate * to_rate;
    Ok(json!(format!(
        "{amount} {} is {converted:.2} {}",
        from.to_uppercase(),
        to.to_uppercase()
    )))
}

async fn list_currencies(_args: ToolArguments) -> ToolResult<Value> {
    Ok(json!(
        USD_RATES
            .iter()
            .map(|(currency, _)| *currency)
            .collect::<Vec<_>>()
    ))
}

fn tools() -> Result<ToolRegistry> {
    let convert = ToolMetadata::new("convert_currency")?
        .with_description("Converts a specified amount from one currency to another.")
        .with_parameter(
            ToolParameter::required("amount", ParamType::Number)
                .with_description("The amount of money to convert."),
        )?
        .with_parameter(
            ToolParameter::required("from_currency", ParamType::String)
                .with_description("Currency code to convert from (e.g., 'USD')."),
        )?
        .with_parameter(
            ToolParameter::required("to_currency", ParamType::String)
                .with_description("Currency code to convert to (e.g., 'EUR')."),
        )?
        .with_returns(ParamType::String);
    let list = ToolMetadata::new("list_currencies")?
        .with_description("Lists the currency codes that can be converted.")
        .with_returns(ParamType::Array);

    Ok(ToolRegistry::register([
        ToolHandle::new(convert, convert_currency),
        ToolHandle::new(list, list_currencies),
    ])?)
}

#[tokio::main]
async fn main() -> Result<()> {
    agent_telemetry::init_tracing("info");

    let args = Args::parse();
    let config = args.config()?;
    let options = args.run_options(&config);

    let agent = BackendDispatcher::default().build_agent(&config, tools()?)?;
    info!(?agent, "agent ready");

    let results = agent.run(Query::from(args.query.as_str()), options).await?;

    for error in results.errors() {
        warn!("{error}");
    }
    println!("{results}");
    match results.final_answer() {
        Ok(Value::String(answer)) => println!("{answer}"),
        Ok(answer) => println!("{answer}"),
        Err(err) => info!("{err}"),
    }
    Ok(())
}
