//! Startup validation of the remote sink environment.

use std::collections::HashMap;
use std::time::Duration;

use crate::infrastructure::sheets::{SheetsConfig, SheetsCredential};
use crate::sweep::SweepDefinition;

use super::ConfigError;
use super::remote::RemoteConfig;

/// Environment variable holding the spreadsheet key.
pub const SPREADSHEET_KEY_VAR: &str = "SPREADSHEET_KEY";
/// Environment variable holding the service credential JSON.
pub const SERVICE_JSON_VAR: &str = "SERVICE_JSON";
/// Environment variable holding the worksheet name.
pub const WORKSHEET_NAME_VAR: &str = "WORKSHEET_NAME";

/// Resolve the remote sink settings.
///
/// Returns `Ok(None)` when the remote sink is disabled. Otherwise every
/// value missing from the config file is read through `lookup`; all missing
/// names are reported together.
///
/// # Errors
///
/// Returns [`ConfigError::MissingEnvVar`] if any required value is absent
/// and [`ConfigError::InvalidCredential`] if the credential cannot be parsed.
pub fn require_remote_credentials<F>(
    remote: &RemoteConfig,
    lookup: F,
) -> Result<Option<SheetsConfig>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !remote.enabled {
        return Ok(None);
    }

    let resolve = |configured: &Option<String>, var: &str| {
        configured
            .clone()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| lookup(var).filter(|v| !v.trim().is_empty()))
    };

    let spreadsheet_key = resolve(&remote.spreadsheet_key, SPREADSHEET_KEY_VAR);
    let credential = resolve(&remote.credential, SERVICE_JSON_VAR);
    let worksheet = resolve(&remote.worksheet, WORKSHEET_NAME_VAR);

    let (Some(spreadsheet_key), Some(credential), Some(worksheet)) =
        (&spreadsheet_key, &credential, &worksheet)
    else {
        let missing: Vec<&str> = [
            (spreadsheet_key.is_none(), SPREADSHEET_KEY_VAR),
            (credential.is_none(), SERVICE_JSON_VAR),
            (worksheet.is_none(), WORKSHEET_NAME_VAR),
        ]
        .into_iter()
        .filter_map(|(absent, name)| absent.then_some(name))
        .collect();
        return Err(ConfigError::MissingEnvVar(missing.join(", ")));
    };

    let credential = SheetsCredential::from_json(credential)
        .map_err(|e| ConfigError::InvalidCredential(e.to_string()))?;

    Ok(Some(SheetsConfig {
        base_url: remote.base_url.clone(),
        spreadsheet_key: spreadsheet_key.clone(),
        worksheet: worksheet.clone(),
        credential,
        timeout: Duration::from_secs(remote.timeout_secs),
    }))
}

/// Sheets settings for each sweep, in sweep order, paired with the sweep name.
///
/// A sweep publishes to its `output.worksheet` when set and to the default
/// worksheet otherwise.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if two sweeps would publish to
/// the same worksheet.
pub fn assign_worksheets(
    sheets: &SheetsConfig,
    sweeps: &[SweepDefinition],
) -> Result<Vec<(String, SheetsConfig)>, ConfigError> {
    let mut owners: HashMap<&str, &str> = HashMap::new();
    let mut assigned = Vec::with_capacity(sweeps.len());

    for sweep in sweeps {
        let worksheet = sweep
            .output
            .worksheet
            .as_deref()
            .filter(|w| !w.trim().is_empty())
            .unwrap_or(&sheets.worksheet);

        if let Some(other) = owners.insert(worksheet, &sweep.name) {
            return Err(ConfigError::ValidationError(format!(
                "sweeps '{other}' and '{}' both publish to worksheet '{worksheet}'; set output.worksheet",
                sweep.name
            )));
        }

        assigned.push((
            sweep.name.clone(),
            SheetsConfig {
                worksheet: worksheet.to_string(),
                ..sheets.clone()
            },
        ));
    }

    Ok(assigned)
}
