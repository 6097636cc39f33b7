//! `famp workflow ...` handlers.
use famp_core::api::{self as core_api, CliError, Workflow, WorkflowError};
use serde_json::json;

use crate::app;
use crate::commands::cli::{AddStepArgs, CreateArgs, NameArgs, WorkflowRunArgs};
use crate::commands::print_json;
use crate::utils;

fn not_found(name: &str) -> CliError {
    CliError::Workflow(WorkflowError::NotFound(name.to_string()))
}

pub fn handle_create(
    args: CreateArgs,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let (workflows, _) = ctx.split_mut();
    let created = workflows.create(&args.name, &args.description)?;
    if json {
        return print_json(&created.summary());
    }
    println!("Created workflow '{}'", created.name);
    Ok(())
}

pub fn handle_add_step(
    args: AddStepArgs,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let config = utils::parse_set(&args.set)?;
    let condition = args.when.as_deref().map(utils::parse_condition).transpose()?;
    if !ctx.registry().contains(&args.plugin) {
        tracing::warn!(plugin = %args.plugin, "step uses a plugin that is not loaded");
    }

    let (workflows, _) = ctx.split_mut();
    let index = workflows.add_step(
        &args.workflow,
        &args.plugin,
        (!config.is_empty()).then_some(config),
        condition,
    )?;

    if json {
        return print_json(&json!({"workflow": args.workflow, "step": index, "plugin": args.plugin}));
    }
    println!("Added step {index} ({}) to '{}'", args.plugin, args.workflow);
    Ok(())
}

pub fn handle_list(ctx: &core_api::AppContext, json: bool) -> Result<(), CliError> {
    let summaries = ctx.workflows().list();
    if json {
        return print_json(&summaries);
    }
    if summaries.is_empty() {
        println!("No workflows.");
    }
    for s in &summaries {
        println!(
            "{:<20} {:<10} step {}/{}  {}",
            s.name,
            s.status.to_string(),
            s.current_step,
            s.step_count,
            s.description
        );
    }
    Ok(())
}

fn print_workflow(wf: &Workflow) {
    println!("{} [{}]", wf.name, wf.status);
    if !wf.description.is_empty() {
        println!("  {}", wf.description);
    }
    println!("  cursor: step {} of {}", wf.current_step, wf.steps.len());
    for (i, step) in wf.steps.iter().enumerate() {
        let marker = if i == wf.current_step { ">" } else { " " };
        println!("{marker} {i}. {:<16} {}", step.plugin_name, step.status);
        if let Some(cond) = &step.condition {
            println!("      when {cond}");
        }
        if let Some(err) = &step.error {
            println!("      error: {err}");
        }
    }
}

pub fn handle_show(args: NameArgs, ctx: &core_api::AppContext, json: bool) -> Result<(), CliError> {
    let wf = ctx.workflows().get(&args.name).ok_or_else(|| not_found(&args.name))?;
    if json {
        return print_json(wf);
    }
    print_workflow(wf);
    Ok(())
}

pub fn handle_delete(
    args: NameArgs,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let (workflows, _) = ctx.split_mut();
    if !workflows.delete(&args.name)? {
        return Err(not_found(&args.name));
    }
    if json {
        return print_json(&json!({"deleted": args.name}));
    }
    println!("Deleted workflow '{}'", args.name);
    Ok(())
}

/// Runs under the context's cancel token; Ctrl-C pauses the workflow.
pub async fn handle_run(
    args: WorkflowRunArgs,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let mut target = app::open_session(&args.session).await?;
    let opts = ctx.run_options();
    app::cancel_on_ctrl_c(ctx.cancel_token());

    let (workflows, registry) = ctx.split_mut();
    let outcome = workflows
        .run(
            &args.name,
            registry,
            &mut target.session,
            &target.account,
            args.resume,
            &opts,
        )
        .await;

    if let Some(wf) = ctx.workflows().get(&args.name) {
        if json {
            print_json(&json!({
                "workflow": wf,
                "error": outcome.as_ref().err().map(ToString::to_string),
            }))?;
        } else {
            print_workflow(wf);
        }
    }

    if let Err(err) = &outcome {
        if let Some(step) = err.resume_point() {
            eprintln!("Resume with: famp workflow run {} --resume (from step {step})", args.name);
        }
    }
    outcome.map(|_| ()).map_err(CliError::Workflow)
}
