//! Configuration management
//!
//! A YAML file plus a few environment overrides, converted into the typed
//! configs the components take. Durations are humane strings ("30s",
//! "500ms") parsed at conversion time so a bad value fails loudly at
//! startup, not mid-run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use anchor_machine::EvidencePolicy;
use collect_loop::CollectConfig;
use recovery_policy::RetryPolicy;
use search_gate::GateConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Session id; generated when absent so every invocation is resumable
    /// only if the caller pins one.
    pub session: Option<String>,
    pub state_dir: Option<PathBuf>,
    /// Replay fixture driving the bundled scripted backend.
    pub fixture: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub evidence_dir: Option<PathBuf>,
    pub collect: CollectSettings,
    pub gate: GateSettings,
    pub retry: RetrySettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectSettings {
    pub target: usize,
    pub keywords: Vec<String>,
    pub per_search_max: usize,
    pub max_rounds: u32,
    pub checkpoint_every: usize,
    pub mark_skipped_seen: bool,
    pub gate_wait: String,
    pub round_cooldown: String,
    pub ensure_timeout: String,
    /// "never" | "on_failure" | "every_attempt"
    pub evidence: String,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self {
            target: 100,
            keywords: Vec::new(),
            per_search_max: 20,
            max_rounds: 50,
            checkpoint_every: 5,
            mark_skipped_seen: false,
            gate_wait: "30s".to_string(),
            round_cooldown: "5s".to_string(),
            ensure_timeout: "10s".to_string(),
            evidence: "never".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateSettings {
    pub min_interval: String,
    pub max_hold: String,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            min_interval: "10s".to_string(),
            max_hold: "60s".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: String,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: "500ms".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a YAML file (when given), then apply environment
    /// overrides: `WEBCOLLECT_SESSION`, `WEBCOLLECT_STATE_DIR`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(session) = std::env::var("WEBCOLLECT_SESSION") {
            config.session = Some(session);
        }
        if let Ok(dir) = std::env::var("WEBCOLLECT_STATE_DIR") {
            config.state_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|base| base.join("webcollect"))
            .unwrap_or_else(|| PathBuf::from(".webcollect"))
    }

    pub fn collect_config(&self) -> Result<CollectConfig> {
        let settings = &self.collect;
        Ok(CollectConfig {
            target_count: settings.target,
            keywords: settings.keywords.clone(),
            per_search_max: settings.per_search_max,
            max_rounds: settings.max_rounds,
            checkpoint_every: settings.checkpoint_every.max(1),
            gate_wait: parse_duration("collect.gate_wait", &settings.gate_wait)?,
            round_cooldown: parse_duration("collect.round_cooldown", &settings.round_cooldown)?,
            gate_retry_limit: 5,
            ensure_timeout: parse_duration("collect.ensure_timeout", &settings.ensure_timeout)?,
            mark_skipped_seen: settings.mark_skipped_seen,
            retry: self.retry_policy()?,
            evidence: parse_evidence(&settings.evidence)?,
        })
    }

    pub fn gate_config(&self) -> Result<GateConfig> {
        Ok(GateConfig {
            min_interval: parse_duration("gate.min_interval", &self.gate.min_interval)?,
            max_hold: parse_duration("gate.max_hold", &self.gate.max_hold)?,
        })
    }

    fn retry_policy(&self) -> Result<RetryPolicy> {
        Ok(RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: parse_duration("retry.base_delay", &self.retry.base_delay)?,
        })
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).with_context(|| format!("invalid duration in {field}: '{value}'"))
}

fn parse_evidence(value: &str) -> Result<EvidencePolicy> {
    match value {
        "never" => Ok(EvidencePolicy::Never),
        "on_failure" => Ok(EvidencePolicy::OnFailure),
        "every_attempt" => Ok(EvidencePolicy::EveryAttempt),
        other => bail!("unknown evidence policy '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_convert_cleanly() {
        let config = AppConfig::default();
        let collect = config.collect_config().unwrap();
        assert_eq!(collect.gate_wait, Duration::from_secs(30));
        assert_eq!(collect.evidence, EvidencePolicy::Never);

        let gate = config.gate_config().unwrap();
        assert_eq!(gate.min_interval, Duration::from_secs(10));
    }

    #[test]
    fn yaml_round_trip_with_durations() {
        let raw = r#"
session: profile-a
collect:
  target: 12
  keywords: ["rust", "tokio"]
  gate_wait: 2s
  evidence: on_failure
gate:
  min_interval: 250ms
"#;
        let config: AppConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.session.as_deref(), Some("profile-a"));
        let collect = config.collect_config().unwrap();
        assert_eq!(collect.target_count, 12);
        assert_eq!(collect.gate_wait, Duration::from_secs(2));
        assert_eq!(collect.evidence, EvidencePolicy::OnFailure);
        assert_eq!(
            config.gate_config().unwrap().min_interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn bad_duration_fails_at_conversion() {
        let mut config = AppConfig::default();
        config.gate.min_interval = "soon".to_string();
        assert!(config.gate_config().is_err());
    }

    #[test]
    fn bad_evidence_policy_is_rejected() {
        let mut config = AppConfig::default();
        config.collect.evidence = "sometimes".to_string();
        assert!(config.collect_config().is_err());
    }
}
