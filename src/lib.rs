pub mod error;
pub mod host;
pub mod logging;
pub mod notifier;
pub mod payload;

use serde::Deserialize;
use std::fs;
use std::path::Path;
use url::Url;

use crate::error::{NotifyError, Result};
use crate::host::BuildResult;

pub use host::{BuildEvent, SourceStamp};
pub use notifier::SlackNotifier;
pub use payload::MessagePayload;

fn default_true() -> bool {
    true
}

/// Configuration for the Slack notifier, fixed at construction time.
#[derive(Debug, Deserialize, Clone)]
pub struct SlackConfig {
    /// Slack incoming-webhook URL to POST payloads to.
    pub webhook_url: String,
    /// Replacement host for "//localhost" in build links, for masters
    /// that don't know their public address.
    pub localhost_replace: Option<String>,
    /// Display name of the "user" posting the messages.
    pub username: Option<String>,
    /// Icon of the posting user: an ":emoji:" token or an image URL.
    pub icon: Option<String>,
    #[serde(default = "default_true")]
    pub notify_on_success: bool,
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,
    /// Builders to notify for. If not set, all builders get notified.
    pub builder_filter: Option<Vec<String>>,
}

impl SlackConfig {
    /// Create a config with the given webhook URL and all defaults.
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            localhost_replace: None,
            username: None,
            icon: None,
            notify_on_success: true,
            notify_on_failure: true,
            builder_filter: None,
        }
    }

    /// Validate the configuration. The webhook URL must be a non-empty
    /// http(s) URL.
    pub fn validate(&self) -> Result<()> {
        if self.webhook_url.trim().is_empty() {
            return Err(NotifyError::Config(
                "webhook_url must not be empty".to_string(),
            ));
        }
        let parsed = Url::parse(&self.webhook_url).map_err(|e| {
            NotifyError::Config(format!(
                "invalid webhook_url '{}': {}",
                self.webhook_url, e
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::Config(format!(
                "webhook_url must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        Ok(())
    }

    /// Returns true if the given builder passes the allow-list.
    /// An unset or empty list allows every builder.
    pub fn builder_allowed(&self, builder_name: &str) -> bool {
        match &self.builder_filter {
            Some(filter) if !filter.is_empty() => filter.iter().any(|b| b == builder_name),
            _ => true,
        }
    }

    /// Returns true if a finished build with this result on this builder
    /// should produce a notification.
    pub fn should_notify(&self, builder_name: &str, result: BuildResult) -> bool {
        if !self.builder_allowed(builder_name) {
            return false;
        }
        match result {
            BuildResult::Success => self.notify_on_success,
            _ => self.notify_on_failure,
        }
    }

    /// Apply the localhost replacement rule to a build-master URL.
    pub fn rewrite_url(&self, url: &str) -> String {
        match &self.localhost_replace {
            Some(host) => url.replace("//localhost", &format!("//{}", host)),
            None => url.to_string(),
        }
    }
}

/// Load, parse and validate a notifier configuration file
pub fn load_config(path: impl AsRef<Path>) -> Result<SlackConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|e| {
        NotifyError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    let config: SlackConfig = toml::from_str(&raw).map_err(|e| {
        NotifyError::Config(format!(
            "Failed to parse config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config_defaults_notify_flags() {
        let config: SlackConfig =
            toml::from_str("webhook_url = \"https://hooks.slack.com/services/T/B/X\"")
                .expect("valid toml");
        assert!(config.notify_on_success);
        assert!(config.notify_on_failure);
        assert!(config.builder_filter.is_none());
        assert!(config.username.is_none());
    }

    #[test]
    fn parse_full_config() {
        let config: SlackConfig = toml::from_str(
            r#"
            webhook_url = "https://hooks.slack.com/services/T/B/X"
            localhost_replace = "ci.example.com"
            username = "buildbot"
            icon = ":rocket:"
            notify_on_success = false
            builder_filter = ["build1", "build2"]
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.localhost_replace.as_deref(), Some("ci.example.com"));
        assert!(!config.notify_on_success);
        assert!(config.notify_on_failure);
        assert_eq!(
            config.builder_filter,
            Some(vec!["build1".to_string(), "build2".to_string()])
        );
    }

    #[test]
    fn validate_rejects_empty_url() {
        let config = SlackConfig::new("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_malformed_url() {
        let config = SlackConfig::new("not a url");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_scheme() {
        let config = SlackConfig::new("ftp://hooks.slack.com/x");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_https_url() {
        let config = SlackConfig::new("https://hooks.slack.com/services/T/B/X");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_filter_restricts_notifications() {
        let mut config = SlackConfig::new("https://hooks.slack.com/x");
        config.builder_filter = Some(vec!["build1".to_string()]);
        assert!(config.should_notify("build1", BuildResult::Failure));
        assert!(!config.should_notify("build2", BuildResult::Failure));
    }

    #[test]
    fn empty_builder_filter_allows_all() {
        let mut config = SlackConfig::new("https://hooks.slack.com/x");
        config.builder_filter = Some(vec![]);
        assert!(config.should_notify("anything", BuildResult::Success));
    }

    #[test]
    fn notify_on_success_toggle() {
        let mut config = SlackConfig::new("https://hooks.slack.com/x");
        config.notify_on_success = false;
        assert!(!config.should_notify("b", BuildResult::Success));
        assert!(config.should_notify("b", BuildResult::Failure));
    }

    #[test]
    fn notify_on_failure_covers_all_non_success_results() {
        let mut config = SlackConfig::new("https://hooks.slack.com/x");
        config.notify_on_failure = false;
        assert!(config.should_notify("b", BuildResult::Success));
        for result in [
            BuildResult::Warnings,
            BuildResult::Failure,
            BuildResult::Exception,
            BuildResult::Skipped,
            BuildResult::Retry,
        ] {
            assert!(!config.should_notify("b", result));
        }
    }

    #[test]
    fn rewrite_url_replaces_localhost() {
        let mut config = SlackConfig::new("https://hooks.slack.com/x");
        config.localhost_replace = Some("buildbot.example.com".to_string());
        assert_eq!(
            config.rewrite_url("http://localhost:8010/builders/x"),
            "http://buildbot.example.com:8010/builders/x"
        );
        assert_eq!(
            config.rewrite_url("http://ci.internal/builders/x"),
            "http://ci.internal/builders/x"
        );
    }

    #[test]
    fn rewrite_url_is_identity_when_unconfigured() {
        let config = SlackConfig::new("https://hooks.slack.com/x");
        assert_eq!(
            config.rewrite_url("http://localhost:8010/"),
            "http://localhost:8010/"
        );
    }

    #[test]
    fn load_config_reads_and_validates_file() {
        let path =
            std::env::temp_dir().join(format!("slack_notify_cfg_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "webhook_url = \"https://hooks.slack.com/services/T/B/X\"\n",
        )
        .expect("write config");

        let config = load_config(&path).expect("loads");
        assert_eq!(config.webhook_url, "https://hooks.slack.com/services/T/B/X");
        assert!(config.notify_on_success);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn load_config_missing_file_is_config_error() {
        let err = load_config("/nonexistent/slack_notify.toml").unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }
}
