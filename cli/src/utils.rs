use std::path::Path;

use famp_core::api::{Account, CliError, ConditionOperator, PluginConfig, StepCondition};
use serde_json::Value;

use crate::commands::cli::SessionArgs;

/// `KEY=VALUE` pairs into a config table. Values that parse as JSON keep their
/// type (`3`, `true`, `["a"]`); anything else is a string.
pub fn parse_set(pairs: &[String]) -> Result<PluginConfig, CliError> {
    let mut out = PluginConfig::new();
    for (idx, raw) in pairs.iter().enumerate() {
        let (k, v) = raw.split_once('=').ok_or_else(|| {
            CliError::Command(format!(
                "invalid --set #{} '{raw}' (expected KEY=VALUE)",
                idx + 1
            ))
        })?;
        let key = k.trim();
        if key.is_empty() {
            return Err(CliError::Command(format!(
                "invalid --set #{} '{raw}' (empty key)",
                idx + 1
            )));
        }
        out.insert(key.to_string(), parse_value(v.trim()));
    }
    Ok(out)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// `plugin.field op [value]`, e.g. `manual_login.logged_in eq true` or
/// `feed_scroller.export_path exists`. The value may contain spaces.
pub fn parse_condition(raw: &str) -> Result<StepCondition, CliError> {
    let invalid = |why: &str| CliError::Command(format!("invalid condition '{raw}': {why}"));

    let trimmed = raw.trim();
    let (target, rest) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
    let rest = rest.trim_start();
    let (op, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));

    let (plugin, field) = target
        .split_once('.')
        .filter(|(p, f)| !p.is_empty() && !f.is_empty())
        .ok_or_else(|| invalid("expected plugin.field"))?;
    if op.is_empty() {
        return Err(invalid("missing operator"));
    }
    let operator: ConditionOperator = op.parse().map_err(|e: String| invalid(&e))?;
    let value = match value.trim() {
        "" if operator == ConditionOperator::Exists => Value::Null,
        "" => return Err(invalid("missing value")),
        v => parse_value(v),
    };

    Ok(StepCondition::new(plugin, field, operator, value))
}

pub fn load_account(args: &SessionArgs) -> Result<Account, CliError> {
    match &args.account_file {
        Some(path) => read_account(path),
        None => Ok(Account::new(&args.account_id, &args.email)),
    }
}

fn read_account(path: &Path) -> Result<Account, CliError> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| CliError::Config(format!("invalid account file {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_set_keeps_json_types() {
        let cfg = parse_set(&[
            "scroll_count=3".to_string(),
            "export_format=csv".to_string(),
            "include_images=false".to_string(),
            "text=a=b".to_string(),
        ])
        .unwrap();
        assert_eq!(cfg["scroll_count"], json!(3));
        assert_eq!(cfg["export_format"], json!("csv"));
        assert_eq!(cfg["include_images"], json!(false));
        assert_eq!(cfg["text"], json!("a=b"));

        assert!(parse_set(&["novalue".to_string()]).is_err());
        assert!(parse_set(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_parse_condition() {
        let cond = parse_condition("manual_login.logged_in eq true").unwrap();
        assert_eq!(cond.plugin_name, "manual_login");
        assert_eq!(cond.field, "logged_in");
        assert_eq!(cond.operator, ConditionOperator::Eq);
        assert_eq!(cond.value, json!(true));

        let cond = parse_condition("post_publisher.text contains good morning").unwrap();
        assert_eq!(cond.value, json!("good morning"));

        let cond = parse_condition("feed_scroller.export_path exists").unwrap();
        assert_eq!(cond.value, Value::Null);

        assert!(parse_condition("nofield eq 1").is_err());
        assert!(parse_condition("a.b between 1").is_err());
        assert!(parse_condition("a.b gt").is_err());
    }

    #[test]
    fn test_account_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("account.json");
        std::fs::write(&path, r#"{"account_id":"acct9","email":"x@y","password":"pw"}"#).unwrap();
        let args = SessionArgs {
            replay: "page.json".into(),
            account_file: Some(path),
            account_id: "default".into(),
            email: String::new(),
        };
        let account = load_account(&args).unwrap();
        assert_eq!(account.account_id, "acct9");
        assert_eq!(account.password.expose(), "pw");
    }
}
