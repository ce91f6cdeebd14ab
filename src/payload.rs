//! Message payload construction.
//!
//! Pure projection from (config, build event) to the Slack webhook body.
//! Nothing in here performs I/O or mutates its inputs.

use serde::Serialize;

use crate::SlackConfig;
use crate::host::{BuildEvent, BuildResult};

/// One title/value entry of a message attachment.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub title: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short: Option<bool>,
}

impl Field {
    fn new(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: None,
        }
    }

    /// Field marked for side-by-side display.
    fn short(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: Some(true),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub fallback: String,
    pub text: String,
    pub color: String,
    pub mrkdwn_in: Vec<&'static str>,
    pub fields: Vec<Field>,
}

/// Outbound webhook body. Optional members are omitted from the JSON
/// entirely when unset.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub text: String,
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Title line for the attachment, keyed by result.
fn message_title(event: &BuildEvent) -> String {
    let detected = match event.result {
        BuildResult::Failure => "a failed build",
        BuildResult::Warnings => "a problem in the build",
        BuildResult::Success => "a passing build",
        BuildResult::Exception => "a build exception",
        BuildResult::Skipped | BuildResult::Retry => "a finished build",
    };

    let projects: Vec<&str> = event
        .source_stamps
        .iter()
        .filter_map(|ss| non_empty(&ss.project))
        .collect();
    let project = if projects.is_empty() {
        event.master_title.clone()
    } else {
        projects.join(", ")
    };

    format!(
        "The Buildbot has detected {} on builder {} for project {}",
        detected, event.builder_name, project
    )
}

fn message_color(result: BuildResult) -> &'static str {
    match result {
        BuildResult::Success | BuildResult::Retry => "good",
        BuildResult::Warnings => "warning",
        BuildResult::Failure | BuildResult::Exception | BuildResult::Skipped => "danger",
    }
}

/// Repository/Revision/Branch fields per source stamp, then the blamelist.
/// Stamps contributing no non-empty value emit no fields.
fn revision_fields(event: &BuildEvent) -> Vec<Field> {
    let mut fields = Vec::new();
    for ss in &event.source_stamps {
        if let Some(repository) = non_empty(&ss.repository) {
            fields.push(Field::new("Repository", repository));
        }
        if let Some(revision) = non_empty(&ss.revision) {
            fields.push(Field::short("Revision", revision));
        }
        if let Some(branch) = non_empty(&ss.branch) {
            fields.push(Field::short("Branch", branch));
        }
    }

    fields.push(Field::new("Blamelist", event.responsible_users.join(", ")));
    fields
}

/// Build-details and master-base-URL fields, each passed through the
/// localhost rewrite rule.
fn link_fields(config: &SlackConfig, event: &BuildEvent) -> Vec<Field> {
    let mut fields = Vec::new();
    if let Some(url) = &event.build_url {
        fields.push(Field::new("Build details", config.rewrite_url(url)));
    }
    if let Some(url) = &event.buildbot_url {
        fields.push(Field::new("Buildbot URL", config.rewrite_url(url)));
    }
    fields
}

/// Render the webhook body for one finished build.
pub fn build_payload(config: &SlackConfig, event: &BuildEvent) -> MessagePayload {
    let title = message_title(event);

    let mut fields = vec![
        Field::short("Status", event.result.label()),
        Field::short("Buildslave", &event.worker_name),
        Field::new("Build Reason", &event.reason),
    ];
    fields.extend(revision_fields(event));
    fields.extend(link_fields(config, event));

    let mut payload = MessagePayload {
        text: " ".to_string(),
        attachments: vec![Attachment {
            fallback: title.clone(),
            text: title,
            color: message_color(event.result).to_string(),
            mrkdwn_in: vec!["text", "title", "fallback"],
            fields,
        }],
        username: config.username.clone(),
        icon_emoji: None,
        icon_url: None,
    };

    if let Some(icon) = &config.icon {
        if icon.starts_with(':') {
            payload.icon_emoji = Some(icon.clone());
        } else {
            payload.icon_url = Some(icon.clone());
        }
    }

    payload
}
