use chrono::{Datelike, NaiveDate};
use clap::Parser;
use hosted_fields::application::orchestrator::{self, TokenizeOptions};
use hosted_fields::config::{Configuration, HostedFieldsConfig};
use hosted_fields::domain::field::FieldKey;
use hosted_fields::domain::ports::{Client, Clock, FixedClock, SystemClock};
use hosted_fields::domain::validators::YearMonth;
use hosted_fields::error::{ErrorCode, HostedFieldsError};
use hosted_fields::infrastructure::bus::Wire;
use hosted_fields::infrastructure::client::GatewayClient;
use hosted_fields::infrastructure::in_memory::InMemoryTransport;
use hosted_fields::interfaces::csv::edit_reader::{Edit, EditAction, EditReader};
use hosted_fields::interfaces::frame::coordinator::FrameGroup;
use hosted_fields::interfaces::merchant::HostedFields;
use miette::{IntoDiagnostic, Result};
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CLIENT_API_URL: &str = "https://localhost/merchants/demo/client_api";
const CHANNEL: &str = "hosted-fields-cli";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input edits CSV file (`field, action, value`)
    input: PathBuf,

    /// Hosted fields configuration (JSON). Defaults to number, cvv, expirationDate and postalCode.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Client configuration (JSON).
    #[arg(long)]
    client: Option<PathBuf>,

    /// Scripted gateway responses (JSON array of routes).
    #[arg(long)]
    responses: Option<PathBuf>,

    /// Tokenize the card after replaying the edits.
    #[arg(long)]
    tokenize: bool,

    /// Month expiration dates are checked against (`YYYY-MM`). Defaults to the current month.
    #[arg(long, value_parser = parse_month)]
    today: Option<YearMonth>,
}

fn parse_month(value: &str) -> std::result::Result<YearMonth, String> {
    NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d")
        .map(|date| YearMonth::new(date.year(), date.month()))
        .map_err(|e| format!("expected YYYY-MM: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            HostedFieldsConfig::from_json(&fs::read_to_string(path).into_diagnostic()?)
                .into_diagnostic()?
        }
        None => HostedFieldsConfig::with_fields(&[
            FieldKey::Number,
            FieldKey::Cvv,
            FieldKey::ExpirationDate,
            FieldKey::PostalCode,
        ]),
    };
    let configuration: Configuration = match &cli.client {
        Some(path) => serde_json::from_str(&fs::read_to_string(path).into_diagnostic()?)
            .into_diagnostic()?,
        None => Configuration::new(DEFAULT_CLIENT_API_URL),
    };
    let transport = match &cli.responses {
        Some(path) => InMemoryTransport::from_path(path).into_diagnostic()?,
        None => InMemoryTransport::new(),
    };
    let client: Arc<dyn Client> = Arc::new(GatewayClient::new(configuration, Arc::new(transport)));
    let clock: Arc<dyn Clock> = match cli.today {
        Some(today) => Arc::new(FixedClock(today)),
        None => Arc::new(SystemClock),
    };

    // Merchant side first so no frame handshake goes unanswered.
    let wire = Wire::new();
    let hosted = HostedFields::connect(&wire, CHANNEL, config.clone());
    let group =
        FrameGroup::launch(&wire, CHANNEL, &config, client, clock).into_diagnostic()?;
    hosted.wait_ready().await.into_diagnostic()?;

    let mut events = group.handle().subscribe();
    let file = File::open(&cli.input).into_diagnostic()?;
    for edit in EditReader::new(file).edits() {
        match edit {
            Ok(edit) => {
                if let Err(e) = apply(&group, &edit) {
                    eprintln!("Error applying edit: {}", e);
                }
            }
            Err(e) => eprintln!("Error reading edit: {}", e),
        }
        while let Ok(event) = events.try_recv() {
            println!("{}", serde_json::to_string(&event).into_diagnostic()?);
        }
    }

    let summary = group.handle().summary().await.into_diagnostic()?;
    println!("{}", serde_json::to_string(&summary).into_diagnostic()?);

    if cli.tokenize {
        let outcome = hosted.tokenize(TokenizeOptions::default()).await;
        println!("{}", orchestrator::into_reply(&outcome));
    }

    Ok(())
}

fn apply(group: &FrameGroup, edit: &Edit) -> hosted_fields::error::Result<()> {
    let key: FieldKey = edit.field.parse().map_err(|_| {
        HostedFieldsError::new(ErrorCode::HostedFieldsInvalidFieldKey)
            .with_message(format!("\"{}\" is not a valid field.", edit.field))
    })?;
    let frame = group.frame(key).ok_or_else(|| {
        HostedFieldsError::new(ErrorCode::HostedFieldsFieldNotPresent)
            .with_message(format!("\"{}\" is not present in this form.", edit.field))
    })?;
    match edit.action {
        EditAction::Input => frame.input(edit.value.as_deref().unwrap_or_default()),
        EditAction::Focus => frame.focus(),
        EditAction::Blur => frame.blur(),
        EditAction::Clear => frame.clear(),
    }
}
