//! `famp plugin ...` handlers.
use famp_core::api::{self as core_api, CliError, ExecutionResult, PluginError, PluginMetadata};
use serde_json::json;

use crate::app;
use crate::commands::print_json;
use crate::commands::cli::{HealthArgs, NameArgs, PluginRunArgs, SearchArgs};
use crate::utils;

fn print_table(plugins: &[PluginMetadata]) {
    if plugins.is_empty() {
        println!("No plugins found.");
        return;
    }
    for m in plugins {
        println!(
            "{:<16} {:<8} {:<10} {}",
            m.name,
            m.version,
            m.health_status.to_string(),
            m.description
        );
    }
}

pub fn handle_list(ctx: &core_api::AppContext, json: bool) -> Result<(), CliError> {
    let plugins = ctx.registry().list_all();
    if json {
        return print_json(&plugins);
    }
    print_table(&plugins);
    Ok(())
}

pub fn handle_search(
    args: SearchArgs,
    ctx: &core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let plugins = ctx
        .registry()
        .search(args.query.as_deref(), &args.categories, &args.tags);
    if json {
        return print_json(&plugins);
    }
    print_table(&plugins);
    Ok(())
}

pub fn handle_info(args: NameArgs, ctx: &core_api::AppContext, json: bool) -> Result<(), CliError> {
    let registry = ctx.registry();
    let (Some(plugin), Some(metadata)) = (registry.get(&args.name), registry.metadata(&args.name))
    else {
        return Err(CliError::Command(format!("plugin '{}' is not registered", args.name)));
    };
    let requires = plugin.requires();
    let config = registry.config(&args.name).cloned().unwrap_or_default();
    // A broken graph is reported, not fatal, so the rest of the info still shows.
    let order = registry.resolution_order(&args.name);

    if json {
        return print_json(&json!({
            "metadata": metadata,
            "requires": requires,
            "config": config,
            "resolution_order": order.as_ref().ok(),
            "dependency_error": order.as_ref().err().map(PluginError::to_record),
        }));
    }

    println!("{} {}", metadata.name, metadata.version);
    if !metadata.description.is_empty() {
        println!("  {}", metadata.description);
    }
    if !metadata.categories.is_empty() {
        println!("  categories: {}", metadata.categories.join(", "));
    }
    if !metadata.tags.is_empty() {
        println!("  tags: {}", metadata.tags.join(", "));
    }
    println!("  health: {}", metadata.health_status);
    for dep in &requires {
        let kind = if dep.optional { "optional" } else { "required" };
        println!("  requires: {} ({kind})", dep.name);
    }
    match &order {
        Ok(order) => println!("  run order: {}", order.join(" -> ")),
        Err(e) => println!("  run order: unavailable ({})", e.message),
    }
    for (key, value) in &config {
        println!("  config.{key} = {value}");
    }
    Ok(())
}

pub async fn handle_health(
    args: HealthArgs,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let names = match args.name {
        Some(name) => vec![name],
        None => ctx.registry().list_all().into_iter().map(|m| m.name).collect(),
    };

    let mut reports = Vec::with_capacity(names.len());
    for name in &names {
        reports.push(ctx.registry_mut().check_health(name).await?);
    }

    if json {
        return print_json(&reports);
    }
    for r in &reports {
        match &r.error {
            Some(err) => println!("{:<16} {:<10} {}", r.name, r.status.to_string(), err.message),
            None => println!("{:<16} {}", r.name, r.status),
        }
    }
    Ok(())
}

fn print_result(name: &str, result: &ExecutionResult, depth: usize) {
    let pad = "  ".repeat(depth);
    let state = if result.success { "ok" } else { "failed" };
    println!("{pad}{name}: {state} ({:.2}s)", result.execution_time_seconds);
    if let Some(message) = &result.message {
        println!("{pad}  {message}");
    }
    if let Some(err) = &result.error {
        println!("{pad}  {err}");
    }
    for (key, value) in &result.output {
        if key != "message" {
            println!("{pad}  {key} = {value}");
        }
    }
    for (dep, dep_result) in &result.dependencies {
        print_result(dep, dep_result, depth + 1);
    }
}

/// A failed run is printed, then returned as an error so the exit code reflects it.
pub async fn handle_run(
    args: PluginRunArgs,
    ctx: &mut core_api::AppContext,
    json: bool,
) -> Result<(), CliError> {
    let overrides = utils::parse_set(&args.set)?;
    let mut target = app::open_session(&args.session).await?;

    // `--set` overlays the loaded settings rather than replacing them.
    let config = if overrides.is_empty() {
        None
    } else {
        let mut config = ctx.registry().config(&args.name).cloned().unwrap_or_default();
        config.extend(overrides);
        Some(config)
    };
    let retry = (!args.no_retry).then(|| ctx.cfg().retry.clone());

    let result = ctx
        .registry_mut()
        .run(
            &args.name,
            &mut target.session,
            &target.account,
            config,
            retry.as_ref(),
        )
        .await?;

    if json {
        print_json(&result)?;
    } else {
        print_result(&args.name, &result, 0);
    }

    match (result.success, result.error) {
        (true, _) => Ok(()),
        (false, Some(record)) => Err(CliError::Plugin(record.into())),
        (false, None) => Err(CliError::Plugin(PluginError::execution(
            &args.name,
            "plugin reported failure",
        ))),
    }
}
