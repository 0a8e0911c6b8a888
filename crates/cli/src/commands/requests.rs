use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use assetflow_core::normalize::decode_date;
use assetflow_core::{
    ActorContext, AppConfig, ErrorClass, FilterSpec, FulfillmentInput, ItemFulfillment,
    LifecycleError, NewRequest, OperationResult, Priority, RequestServices, RequestStatus,
};
use assetflow_db::SqlDocumentStore;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::commands::{open_store, prepare, CommandFailure, CommandResult};

const COMMAND: &str = "requests";

#[derive(Debug, Subcommand)]
pub enum RequestCommand {
    #[command(about = "List requests, newest first, with optional filters")]
    List(ListArgs),
    #[command(about = "Show one request in canonical form")]
    Show {
        id: String,
        #[arg(long = "scope", help = "Restrict to these locations (facilitator view)")]
        scope: Vec<String>,
    },
    #[command(about = "Create a request from a JSON file (`-` reads stdin)")]
    Create { file: PathBuf },
    #[command(about = "Record admin approval")]
    Approve { id: String },
    #[command(about = "Reject a request with a reason")]
    Reject {
        id: String,
        #[arg(long)]
        reason: String,
    },
    #[command(about = "Record fulfilment of one or more items")]
    Fulfill {
        id: String,
        #[arg(long = "item", value_name = "INDEX=QTY", required = true, value_parser = parse_item)]
        items: Vec<ItemFulfillment>,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "scope", help = "Act as a facilitator over these locations")]
        scope: Vec<String>,
    },
    #[command(about = "Apply a JSON object patch to a request")]
    Update {
        id: String,
        #[arg(long)]
        patch: String,
        #[arg(long = "scope", help = "Act as a facilitator over these locations")]
        scope: Vec<String>,
    },
    #[command(about = "Delete a request")]
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, value_parser = parse_status)]
    pub status: Vec<RequestStatus>,
    #[arg(long, value_parser = parse_priority)]
    pub priority: Vec<Priority>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub department: Option<String>,
    #[arg(long)]
    pub requester: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long, value_parser = parse_date)]
    pub from: Option<DateTime<Utc>>,
    #[arg(long, value_parser = parse_date)]
    pub to: Option<DateTime<Utc>>,
    #[arg(long = "scope", help = "Only these locations (facilitator view)")]
    pub scope: Vec<String>,
}

impl ListArgs {
    fn filter(&self) -> FilterSpec {
        FilterSpec {
            status: self.status.clone(),
            priority: self.priority.clone(),
            location_id: self.location.clone(),
            department: self.department.clone(),
            requester_id: self.requester.clone(),
            search_term: self.search.clone(),
            date_from: self.from,
            date_to: self.to,
        }
    }
}

type Services = RequestServices<SqlDocumentStore>;

pub fn run(actor: &str, command: RequestCommand) -> CommandResult {
    let (config, runtime) = match prepare() {
        Ok(prepared) => prepared,
        Err(failure) => return CommandResult::from_failure(COMMAND, failure),
    };
    let context = ActorContext::for_actor(actor);
    tracing::debug!(
        event_name = "cli.requests.dispatch",
        actor = %context.actor_id,
        correlation_id = %context.correlation_id,
        collection = %config.store.collection,
        "running request command"
    );

    let result = runtime.block_on(async {
        let pool = open_store(&config).await?;
        let services = services_for(&config, SqlDocumentStore::new(pool.clone()));
        let outcome = dispatch(&services, &context, command).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok((message, data)) => CommandResult::success_with_data(COMMAND, message, Some(data)),
        Err(failure) => CommandResult::from_failure(COMMAND, failure),
    }
}

fn services_for(config: &AppConfig, store: SqlDocumentStore) -> Services {
    RequestServices::new(Arc::new(store), config)
}

async fn dispatch(
    services: &Services,
    context: &ActorContext,
    command: RequestCommand,
) -> Result<(String, Value), CommandFailure> {
    match command {
        RequestCommand::List(args) => {
            let filter = args.filter();
            let rows = if args.scope.is_empty() {
                services.admin.get_requests(&filter).await
            } else {
                services.facilitator.get_assigned_requests(&args.scope, &filter).await
            }
            .map_err(read_failure)?;
            Ok((format!("{} requests", rows.len()), to_data(&rows)?))
        }
        RequestCommand::Show { id, scope } => {
            let found = if scope.is_empty() {
                services.admin.get_request(&id).await
            } else {
                services.facilitator.get_request(&scope, &id).await
            }
            .map_err(read_failure)?;
            let request = found.ok_or_else(|| read_failure(LifecycleError::NotFound(id.clone())))?;
            Ok((format!("request {}", request.code.0), to_data(&request)?))
        }
        RequestCommand::Create { file } => {
            let input = read_new_request(&file).map_err(invalid_input)?;
            outcome(services.admin.create_request(context, input).await)
        }
        RequestCommand::Approve { id } => outcome(services.admin.approve(context, &id).await),
        RequestCommand::Reject { id, reason } => {
            outcome(services.admin.reject(context, &id, &reason).await)
        }
        RequestCommand::Fulfill { id, items, notes, scope } => {
            let input = FulfillmentInput { notes, items };
            if scope.is_empty() {
                outcome(services.admin.fulfill(context, &id, &input).await)
            } else {
                outcome(services.facilitator.fulfill(context, &scope, &id, &input).await)
            }
        }
        RequestCommand::Update { id, patch, scope } => {
            let patch: Value = serde_json::from_str(&patch)
                .context("--patch must be a JSON object")
                .map_err(invalid_input)?;
            if scope.is_empty() {
                outcome(services.admin.update(context, &id, patch).await)
            } else {
                outcome(services.facilitator.update(context, &scope, &id, patch).await)
            }
        }
        RequestCommand::Delete { id } => outcome(services.admin.delete(context, &id).await),
    }
}

fn outcome<T: Serialize>(result: OperationResult<T>) -> Result<(String, Value), CommandFailure> {
    if result.success {
        let message = result.message.clone().unwrap_or_default();
        return Ok((message, to_data(&result.data)?));
    }
    let class = result.error_class.unwrap_or(ErrorClass::Validation);
    let message = result.error.or(result.message).unwrap_or_default();
    Err((class.as_str(), message, exit_code_for(class)))
}

fn read_failure(error: LifecycleError) -> CommandFailure {
    let class = error.class();
    (class.as_str(), error.to_string(), exit_code_for(class))
}

fn invalid_input(error: anyhow::Error) -> CommandFailure {
    ("invalid_input", format!("{error:#}"), 2)
}

fn exit_code_for(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::StoreUnavailable => 4,
        ErrorClass::NotFound => 7,
        ErrorClass::Validation => 8,
        ErrorClass::Conflict => 9,
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<Value, CommandFailure> {
    serde_json::to_value(value).map_err(|error| ("serialization", error.to_string(), 1))
}

fn read_new_request(path: &Path) -> anyhow::Result<NewRequest> {
    let raw = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading request from stdin")?
    } else {
        fs::read_to_string(path).with_context(|| format!("reading `{}`", path.display()))?
    };
    serde_json::from_str(&raw).context("request body is not a valid new request")
}

fn parse_item(raw: &str) -> Result<ItemFulfillment, String> {
    parse_item_spec(raw).map_err(|error| error.to_string())
}

/// `INDEX=QTY`, where `INDEX` is the item's position in the request.
fn parse_item_spec(raw: &str) -> anyhow::Result<ItemFulfillment> {
    let (index, quantity) =
        raw.split_once('=').ok_or_else(|| anyhow!("expected INDEX=QTY, got `{raw}`"))?;
    let index: usize = index.trim().parse().with_context(|| format!("bad item index in `{raw}`"))?;
    let quantity: u32 =
        quantity.trim().parse().with_context(|| format!("bad quantity in `{raw}`"))?;
    if quantity == 0 {
        bail!("quantity must be positive in `{raw}`");
    }
    Ok(ItemFulfillment { item_id: index.to_string(), fulfilled_quantity: quantity, notes: None })
}

fn parse_status(raw: &str) -> Result<RequestStatus, String> {
    raw.parse().map_err(|error: assetflow_core::DomainError| error.to_string())
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    raw.parse().map_err(|error: assetflow_core::DomainError| error.to_string())
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    decode_date(&Value::String(raw.to_string())).ok_or_else(|| format!("unrecognised date `{raw}`"))
}
