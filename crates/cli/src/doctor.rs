// stlink doctor - arbiter configuration report

use std::path::PathBuf;

use streetlink_arbiter::config::{env_var_name, keychain_available};
use streetlink_arbiter::{ArbiterError, ArbiterSettings, KeySource, ResolvedArbiterConfig};

use crate::exit_codes::{
    arbiter_exit_code, EXIT_ARBITER_CONFIG, EXIT_ARBITER_DISABLED, EXIT_ARBITER_MISSING_KEY,
};
use crate::link::load_config;
use crate::CliError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum DoctorStatus {
    Disabled,
    Misconfigured,
    Ready,
}

impl DoctorStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DoctorStatus::Disabled => "disabled",
            DoctorStatus::Misconfigured => "misconfigured",
            DoctorStatus::Ready => "ready",
        }
    }
}

struct DoctorReport {
    status: DoctorStatus,
    blocking_reason: Option<String>,
    provider: String,
    model: Option<String>,
    endpoint: Option<String>,
    key_present: bool,
    key_source: KeySource,
    keychain_available: bool,
    timeout_secs: u64,
}

pub fn cmd_doctor(config: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let settings = match config {
        Some(path) => {
            let loaded = load_config(&path)?;
            ArbiterSettings::from_toml(&loaded.raw).map_err(CliError::arbiter)?
        }
        None => ArbiterSettings::default(),
    };

    let report = diagnose(&settings, ResolvedArbiterConfig::resolve(&settings));

    if json {
        let out = serde_json::json!({
            "schema_version": 1,
            "status": report.status.as_str(),
            "blocking_reason": report.blocking_reason,
            "provider": report.provider,
            "model": report.model,
            "endpoint": report.endpoint,
            "key": if report.key_present { "present" } else { "missing" },
            "key_source": report.key_source.as_str(),
            "keychain": if report.keychain_available { "ok" } else { "unavailable" },
            "timeout_secs": report.timeout_secs,
        });
        let text = serde_json::to_string_pretty(&out)
            .map_err(|e| CliError::io(format!("JSON serialization failed: {}", e)))?;
        println!("{}", text);
    } else {
        println!("Arbiter Doctor");
        println!("--------------");
        println!("status:          {}", report.status.as_str());
        if let Some(reason) = &report.blocking_reason {
            println!("blocking_reason: {}", reason);
        }
        println!("provider:        {}", report.provider);
        if let Some(model) = &report.model {
            println!("model:           {}", model);
        }
        if let Some(endpoint) = &report.endpoint {
            println!("endpoint:        {}", endpoint);
        }
        println!("key:             {}", if report.key_present { "present" } else { "missing" });
        println!("key_source:      {}", report.key_source.as_str());
        println!("keychain:        {}", if report.keychain_available { "ok" } else { "unavailable" });
        println!("timeout_secs:    {}", report.timeout_secs);

        match report.status {
            DoctorStatus::Disabled => {
                println!();
                println!("Arbitration is disabled. To enable, add to the run config:");
                println!("  [arbitration]");
                println!("  provider = \"openai\"   # or gemini, local");
            }
            DoctorStatus::Misconfigured if report.blocking_reason.as_deref() == Some("missing_api_key") => {
                println!();
                println!("Fix: set {} or store the key in the keychain", env_var_name(&report.provider));
            }
            _ => {}
        }
    }

    match report.status {
        DoctorStatus::Ready => Ok(()),
        DoctorStatus::Disabled => Err(CliError {
            code: EXIT_ARBITER_DISABLED,
            message: "arbitration is disabled".to_string(),
            hint: None,
        }),
        DoctorStatus::Misconfigured => {
            let reason = report.blocking_reason.unwrap_or_else(|| "unknown".to_string());
            let code = if reason == "missing_api_key" { EXIT_ARBITER_MISSING_KEY } else { EXIT_ARBITER_CONFIG };
            Err(CliError { code, message: format!("arbiter misconfigured: {}", reason), hint: None })
        }
    }
}

fn diagnose(
    settings: &ArbiterSettings,
    resolved: Result<Option<ResolvedArbiterConfig>, ArbiterError>,
) -> DoctorReport {
    let base = DoctorReport {
        status: DoctorStatus::Disabled,
        blocking_reason: None,
        provider: settings.provider.name().to_string(),
        model: None,
        endpoint: None,
        key_present: false,
        key_source: KeySource::None,
        keychain_available: keychain_available(),
        timeout_secs: settings.timeout_secs,
    };

    match resolved {
        Ok(None) => DoctorReport {
            blocking_reason: Some("provider=none".to_string()),
            ..base
        },
        Ok(Some(config)) => DoctorReport {
            status: DoctorStatus::Ready,
            model: Some(config.model),
            endpoint: Some(config.endpoint),
            key_present: config.api_key.is_some(),
            key_source: config.key_source,
            ..base
        },
        Err(err) => {
            let reason = match arbiter_exit_code(&err) {
                EXIT_ARBITER_MISSING_KEY => "missing_api_key".to_string(),
                _ => err.to_string(),
            };
            DoctorReport {
                status: DoctorStatus::Misconfigured,
                blocking_reason: Some(reason),
                model: Some(
                    settings
                        .model
                        .clone()
                        .unwrap_or_else(|| settings.provider.default_model().to_string()),
                ),
                ..base
            }
        }
    }
}
