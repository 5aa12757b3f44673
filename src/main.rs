use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wiretrack::cli::{Cli, Command};
use wiretrack::config::WiretrackConfig;
use wiretrack::state_machine::{Action, DocumentRef, ProcessView};
use wiretrack::store::FileStore;
use wiretrack::ui::Printer;
use wiretrack::{ManufacturingWorkflowService, WorkflowError};

fn init_tracing(config: &WiretrackConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let printer = Printer::default();

    match run(cli, &printer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<WorkflowError>() {
                Some(workflow_err) => {
                    if workflow_err.status_code() >= 500 {
                        tracing::error!(error = %workflow_err, "internal workflow error");
                    }
                    printer.error(workflow_err);
                }
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, printer: &Printer) -> Result<()> {
    let config = WiretrackConfig::load().context("loading wiretrack.toml")?;
    init_tracing(&config, cli.verbose);

    let definition = Arc::new(config.workflow()?);
    let store = FileStore::open(&config.store_path).await?;
    let service = ManufacturingWorkflowService::new(definition, store)
        .with_conflict_retries(config.max_conflict_retries);
    let actor = cli.actor.to_actor();

    let view = match cli.command {
        Command::Start => service.start_process(&actor).await?,
        Command::Show { id } => service.get_process(id).await?,
        Command::Approve { id, comment } => {
            service
                .approve_or_reject_step(id, &actor, Action::Approve, comment.as_deref())
                .await?
        }
        Command::Reject { id, comment } => {
            service
                .approve_or_reject_step(id, &actor, Action::Reject, comment.as_deref())
                .await?
        }
        Command::Delete { id } => {
            // Destructive operations are authorized here, not in the service.
            if !actor.is_superuser {
                bail!(WorkflowError::Forbidden {
                    required_role: "superuser".into()
                });
            }
            service.delete_process(id).await?;
            printer.success(&format!("Process {id} deleted"));
            return Ok(());
        }
        Command::Link {
            id,
            stage,
            kind,
            doc_id,
        } => {
            service
                .authorize_document_creation(id, &actor, &stage)
                .await?;
            service
                .link_document(id, &stage, DocumentRef::new(kind, doc_id))
                .await?
        }
        Command::Verify { id } => {
            let replayed = service.verify_process(id).await?;
            printer.success(&format!(
                "Audit trail of {id} replays to {} (completed: {})",
                replayed.position, replayed.completed
            ));
            return Ok(());
        }
        Command::Stages => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(service.definition().stages())?);
            } else {
                printer.stages(service.definition());
            }
            return Ok(());
        }
    };

    render(&view, cli.json, printer)
}

fn render(view: &ProcessView, json: bool, printer: &Printer) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
    } else {
        printer.process(view);
    }
    Ok(())
}
