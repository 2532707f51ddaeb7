// Command layer: turns parsed arguments into a batch run.
// Each function builds the targets, the operation and the ledger, prints a
// banner, runs the batch driver and prints the summary. The returned bool is
// false when any item failed.

use std::fs;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use syft_deploy::api::{ApiClient, Remote, ResourceKind};
use syft_deploy::batch::{self, BatchError, ItemOperation, Summary, TargetItem};
use syft_deploy::config::{mask_secret, Config};
use syft_deploy::describe::{Completion, CompletionClient, Describer, SampleSpec};
use syft_deploy::discovery::{
    detect_file_types, discover_datasets, load_descriptions, parse_file_types,
    read_description_file, FALLBACK_FILE_TYPES,
};
use syft_deploy::error::ApiError;
use syft_deploy::ledger::LedgerFile;
use syft_deploy::ops::{
    delete_targets, deploy_targets, fix_name_targets, publish_targets, DeleteOp, DeployOp,
    DeploySettings, FixNamesOp, GenerateOp, PublishOp, UpdateOp,
};
use syft_deploy::ui;

use crate::{
    BatchArgs, DeleteArgs, DeployArgs, FixNamesArgs, GenerateArgs, ListArgs, PublishArgs,
    UpdateArgs,
};

/// Directory entries inspected when guessing the file types to ingest.
const FILE_TYPE_SAMPLE: usize = 200;

fn connect(config: &Config, mutating: bool) -> Result<ApiClient> {
    let api = ApiClient::new(&config.remote)?;
    if mutating && !api.check_connection() {
        bail!(
            "Cannot reach {} with the configured admin key; is the service running?",
            api.base_url()
        );
    }
    Ok(api)
}

fn open_ledger(args: &BatchArgs, command: &str) -> Result<LedgerFile> {
    let path = args.ledger_path(command);
    LedgerFile::open(&path, command)
        .with_context(|| format!("Cannot use ledger {}", path.display()))
}

fn run_rows(
    api: Option<&ApiClient>,
    args: &BatchArgs,
    ledger: &LedgerFile,
) -> Vec<(&'static str, String)> {
    let mut rows = Vec::new();
    if let Some(api) = api {
        rows.push(("API", api.base_url().to_string()));
    }
    rows.push(("Dry run", args.dry_run.to_string()));
    rows.push(("Resume", args.resume.to_string()));
    if let Some(path) = ledger.path() {
        rows.push(("Ledger", path.display().to_string()));
    }
    rows
}

/// Print the summary and turn an aborted run into an error.
fn finish(result: Result<Summary, BatchError>, dry_run: bool) -> Result<bool> {
    match result {
        Ok(summary) => {
            ui::print_summary(&summary, dry_run);
            Ok(summary.is_clean())
        }
        Err(BatchError::Aborted {
            identifier,
            source,
            summary,
        }) => {
            ui::print_summary(&summary, dry_run);
            Err(anyhow::Error::new(source).context(format!("Run aborted at {identifier}")))
        }
        Err(err) => Err(err.into()),
    }
}

fn execute<O: ItemOperation + ?Sized>(
    items: &[TargetItem],
    op: &mut O,
    ledger: &mut LedgerFile,
    args: &BatchArgs,
    default_delay: f64,
) -> Result<bool> {
    let options = args.options(default_delay);
    finish(batch::run(items, op, ledger, &options), options.dry_run)
}

pub fn list(config: &Config, args: &ListArgs) -> Result<bool> {
    let api = connect(config, false)?;
    let both = args.datasets == args.endpoints;

    if both || args.datasets {
        let datasets = api.list(ResourceKind::Dataset)?;
        println!("DATASETS ({})", datasets.len());
        for ds in &datasets {
            let id = ds.id.as_ref().map(ToString::to_string).unwrap_or_default();
            println!("  {:<50} {id}", ds.name);
        }
        println!();
    }

    if both || args.endpoints {
        let endpoints = api.list(ResourceKind::Endpoint)?;
        let published = endpoints.iter().filter(|ep| !ep.needs_publish()).count();
        println!("ENDPOINTS ({}, {published} published)", endpoints.len());
        for ep in &endpoints {
            let state = if ep.needs_publish() {
                "unpublished".to_string()
            } else {
                format!("published to {}", ep.published_to.join(", "))
            };
            println!("  {:<50} {state}", ep.key());
        }
        println!();
    }
    Ok(true)
}

fn completion_backend(config: &Config, dry_run: bool) -> Result<Box<dyn Completion>> {
    match CompletionClient::new(&config.completion) {
        Ok(client) => Ok(Box::new(client)),
        Err(err) if dry_run => {
            warn!(error = %err, "completion API not configured; fine for a dry run");
            Ok(Box::new(Unavailable(err.to_string())))
        }
        Err(err) => Err(err),
    }
}

// Stands in for the completion client during dry runs, which never call it.
struct Unavailable(String);

impl Completion for Unavailable {
    fn complete(&self, _system: &str, _user: &str) -> Result<String, ApiError> {
        Err(ApiError::Rejected {
            status: 0,
            body: self.0.clone(),
        })
    }
}

pub fn deploy(config: &Config, args: &DeployArgs) -> Result<bool> {
    let api = connect(config, !args.batch.dry_run)?;
    let names = discover_datasets(&args.source_dir)?;
    if names.is_empty() {
        bail!("No dataset directories under {}", args.source_dir.display());
    }

    let file_types = match &args.file_types {
        Some(raw) => parse_file_types(raw),
        None => detect_file_types(&args.source_dir, FILE_TYPE_SAMPLE)?,
    };
    let file_types = if file_types.is_empty() {
        FALLBACK_FILE_TYPES.iter().map(|t| t.to_string()).collect()
    } else {
        file_types
    };

    let settings = DeploySettings {
        source_dir: args.source_dir.clone(),
        container_dir: args.container_dir.clone(),
        name_template: args.name_template.clone(),
        slug_template: args.slug_template.clone(),
        summary_template: args.summary_template.clone(),
        tags: args.tags.clone(),
        response_type: args.response_type.clone(),
        file_types,
        publish: args.publish,
        pause: args.batch.delay_or(0.5),
    };
    let items = deploy_targets(&names, &settings);

    let mut ledger = open_ledger(&args.batch, "deploy")?;
    let mut rows = run_rows(Some(&api), &args.batch, &ledger);
    rows.push(("Source", args.source_dir.display().to_string()));
    rows.push(("Types", settings.file_types.join(",")));
    rows.push(("Datasets", names.len().to_string()));
    ui::banner("DEPLOY DATASETS AND ENDPOINTS", &rows);

    let mut op = DeployOp::new(&api, settings);
    if let Some(path) = &args.descriptions {
        op = op.with_descriptions(load_descriptions(path)?);
    }
    if args.generate_missing {
        let completion = completion_backend(config, args.batch.dry_run)?;
        op = op.with_generator(Describer::new(completion));
    }
    execute(&items, &mut op, &mut ledger, &args.batch, 0.5)
}

pub fn delete(config: &Config, args: &DeleteArgs) -> Result<bool> {
    let api = connect(config, !args.batch.dry_run)?;
    let both = args.datasets == args.endpoints;
    let endpoints = if both || args.endpoints {
        api.list(ResourceKind::Endpoint)?
    } else {
        Vec::new()
    };
    let datasets = if both || args.datasets {
        api.list(ResourceKind::Dataset)?
    } else {
        Vec::new()
    };
    let items = delete_targets(&endpoints, &datasets);

    let mut ledger = open_ledger(&args.batch, "delete")?;
    let mut rows = run_rows(Some(&api), &args.batch, &ledger);
    rows.push(("Endpoints", endpoints.len().to_string()));
    rows.push(("Datasets", datasets.len().to_string()));
    ui::banner("DELETE DATASETS AND ENDPOINTS", &rows);

    if items.is_empty() {
        println!("Nothing to delete.");
        return Ok(true);
    }
    if !args.yes && !args.batch.dry_run {
        let prompt = format!(
            "Delete {} endpoints and {} datasets from {}?",
            endpoints.len(),
            datasets.len(),
            api.base_url()
        );
        if !ui::confirm(&prompt)? {
            println!("Cancelled.");
            return Ok(true);
        }
    }

    let mut op = DeleteOp::new(&api);
    execute(&items, &mut op, &mut ledger, &args.batch, 0.3)
}

pub fn publish(config: &Config, args: &PublishArgs) -> Result<bool> {
    let api = connect(config, !args.batch.dry_run)?;
    let endpoints = api.list(ResourceKind::Endpoint)?;
    let mut ledger = open_ledger(&args.batch, "publish")?;
    let items = publish_targets(&endpoints, args.batch.resume.then(|| ledger.ledger()));

    let mut rows = run_rows(Some(&api), &args.batch, &ledger);
    rows.push(("Endpoints", endpoints.len().to_string()));
    rows.push(("To publish", items.len().to_string()));
    ui::banner("PUBLISH ENDPOINTS", &rows);

    let mut op = PublishOp::new(&api);
    execute(&items, &mut op, &mut ledger, &args.batch, 0.3)
}

pub fn update(config: &Config, args: &UpdateArgs) -> Result<bool> {
    let descriptions = load_descriptions(&args.descriptions)?;
    if descriptions.is_empty() {
        bail!(
            "No descriptions in {}; run `syft-deploy generate` first",
            args.descriptions.display()
        );
    }
    let api = connect(config, !args.batch.dry_run)?;
    let endpoints = api.list(ResourceKind::Endpoint)?;
    let items: Vec<TargetItem> = endpoints.iter().map(TargetItem::for_resource).collect();

    let mut ledger = open_ledger(&args.batch, "update")?;
    let mut rows = run_rows(Some(&api), &args.batch, &ledger);
    rows.push(("Descriptions", descriptions.len().to_string()));
    rows.push(("Endpoints", endpoints.len().to_string()));
    ui::banner("UPDATE ENDPOINT DESCRIPTIONS", &rows);

    let mut op =
        UpdateOp::new(&api, descriptions).with_summary_template(args.summary_template.clone());
    execute(&items, &mut op, &mut ledger, &args.batch, 0.5)
}

pub fn generate(config: &Config, args: &GenerateArgs) -> Result<bool> {
    let names = discover_datasets(&args.source_dir)?;
    let existing = load_descriptions(&args.output)?;
    let items: Vec<TargetItem> = names
        .iter()
        .filter(|name| {
            args.overwrite
                || !(existing.contains_key(name.as_str())
                    || read_description_file(&args.source_dir.join(name)).is_some())
        })
        .map(|name| TargetItem::new(name.as_str()))
        .collect();
    info!(found = names.len(), to_generate = items.len(), "dataset directories");

    let system_prompt = match (&args.system_prompt, &args.system_prompt_file) {
        (Some(text), _) => Some(text.clone()),
        (None, Some(path)) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read system prompt {}", path.display()))?,
        ),
        (None, None) => None,
    };
    let mut describer = Describer::new(completion_backend(config, args.batch.dry_run)?)
        .with_prompts(system_prompt, args.user_prompt_template.clone());
    describer.samples = SampleSpec {
        title_field: args.title_field.clone(),
        abstract_field: args.abstract_field.clone(),
        count: args.samples,
    };

    let mut ledger = open_ledger(&args.batch, "generate")?;
    let mut rows = run_rows(None, &args.batch, &ledger);
    rows.push(("Model", config.completion.model.clone()));
    rows.push((
        "Key",
        config
            .completion
            .api_key
            .as_deref()
            .map_or_else(|| "<unset>".to_string(), mask_secret),
    ));
    rows.push(("Output", args.output.display().to_string()));
    rows.push(("Datasets", format!("{} ({} to generate)", names.len(), items.len())));
    ui::banner("GENERATE DATASET DESCRIPTIONS", &rows);

    let mut op = GenerateOp::new(
        describer,
        args.source_dir.clone(),
        args.output.clone(),
        existing,
    );
    let clean = execute(&items, &mut op, &mut ledger, &args.batch, 1.0)?;
    if !args.batch.dry_run {
        println!(
            "{} descriptions in {}",
            op.descriptions().len(),
            args.output.display()
        );
    }
    Ok(clean)
}

pub fn fix_names(config: &Config, args: &FixNamesArgs) -> Result<bool> {
    let api = connect(config, !args.batch.dry_run)?;
    let endpoints = api.list(ResourceKind::Endpoint)?;
    // The ledger is read even without --resume: endpoints it holds as deleted
    // exist nowhere else.
    let mut ledger = open_ledger(&args.batch, "fix-names")?;
    let items = fix_name_targets(&endpoints, ledger.ledger());
    let pending_recreates = ledger.ledger().deleted_entries().count();

    let mut rows = run_rows(Some(&api), &args.batch, &ledger);
    rows.push(("Endpoints", endpoints.len().to_string()));
    rows.push(("To fix", items.len().to_string()));
    if pending_recreates > 0 {
        rows.push(("Recreate", format!("{pending_recreates} deleted by an earlier run")));
    }
    ui::banner("FIX ENDPOINT NAMES", &rows);

    let mut op = FixNamesOp::new(&api).with_pause(args.batch.delay_or(0.5));
    execute(&items, &mut op, &mut ledger, &args.batch, 0.5)
}
