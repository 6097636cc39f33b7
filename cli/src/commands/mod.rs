use famp_core::api::CliError;

pub mod cli;
pub mod plugin;
pub mod workflow;

pub(crate) fn print_json(value: &impl serde::Serialize) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::Command(format!("failed to render JSON: {e}")))?;
    println!("{text}");
    Ok(())
}
