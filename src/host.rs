//! Interface boundary to the build master.
//!
//! The master owns the build model and the subscription machinery; this
//! module only defines the traits the notifier consumes and the owned
//! snapshot it takes per finished build.

use std::fmt;
use std::sync::Arc;

/// Result of a finished build, as reported by the build master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    Success,
    Warnings,
    Failure,
    Skipped,
    Exception,
    Retry,
}

impl BuildResult {
    /// Bridge from the master's conventional numeric result codes.
    ///
    /// Unknown codes yield `None`; a bridging host should log and drop
    /// the event rather than hand it to the notifier.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Warnings),
            2 => Some(Self::Failure),
            3 => Some(Self::Skipped),
            4 => Some(Self::Exception),
            5 => Some(Self::Retry),
            _ => None,
        }
    }

    /// Upper-case status label used in the message payload.
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Warnings => "WARNINGS",
            Self::Failure => "FAILURE",
            Self::Skipped => "SKIPPED",
            Self::Exception => "EXCEPTION",
            Self::Retry => "RETRY",
        }
    }
}

/// One source stamp of a build. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct SourceStamp {
    pub repository: Option<String>,
    pub revision: Option<String>,
    pub branch: Option<String>,
    pub project: Option<String>,
}

/// Read-only view of a finished build, supplied by the master for the
/// duration of one notification.
pub trait BuildView {
    fn source_stamps(&self) -> Vec<SourceStamp>;
    fn responsible_users(&self) -> Vec<String>;
    fn worker_name(&self) -> String;
    fn reason(&self) -> String;
}

/// Error from a host-side (un)registration call.
#[derive(Debug)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host: {}", self.0)
    }
}

impl std::error::Error for HostError {}

/// Listener registered with the master and with individual builders.
pub trait StatusListener: Send + Sync {
    /// Called once per builder the master knows at subscribe time and once
    /// per builder added later. Returning true subscribes the listener at
    /// builder level; `build_finished` is only delivered for builders
    /// subscribed this way.
    fn builder_added(&self, name: &str, builder: Arc<dyn BuilderStatus>) -> bool;

    /// Called when a build finishes on a builder this listener watches.
    fn build_finished(&self, builder_name: &str, build: &dyn BuildView, result: BuildResult);
}

/// Per-builder registration handle.
pub trait BuilderStatus: Send + Sync {
    fn name(&self) -> &str;
    fn subscribe(&self, listener: Arc<dyn StatusListener>);
    fn unsubscribe(&self, listener: &dyn StatusListener) -> Result<(), HostError>;
}

/// Master-status handle: top-level subscription plus link and title
/// accessors.
pub trait MasterStatus: Send + Sync {
    /// Title of the build master, used when no source stamp names a
    /// project.
    fn title(&self) -> String;

    /// Public base URL of the master's web UI, if configured.
    fn buildbot_url(&self) -> Option<String>;

    /// Details URL for one build, if the master can resolve it.
    fn build_url(&self, build: &dyn BuildView) -> Option<String>;

    /// Register a listener. Implementations must invoke
    /// [`StatusListener::builder_added`] for every builder currently known
    /// and for each builder added later.
    fn subscribe(&self, listener: Arc<dyn StatusListener>);

    fn unsubscribe(&self, listener: &dyn StatusListener) -> Result<(), HostError>;
}

/// Owned snapshot of everything one notification needs, taken from the
/// host views inside the build-finished callback and discarded after
/// dispatch.
#[derive(Debug, Clone)]
pub struct BuildEvent {
    pub builder_name: String,
    pub result: BuildResult,
    pub source_stamps: Vec<SourceStamp>,
    pub responsible_users: Vec<String>,
    pub worker_name: String,
    pub reason: String,
    pub build_url: Option<String>,
    pub buildbot_url: Option<String>,
    pub master_title: String,
}

impl BuildEvent {
    /// Capture a snapshot for one finished build.
    pub fn capture(
        builder_name: &str,
        build: &dyn BuildView,
        result: BuildResult,
        master: &dyn MasterStatus,
    ) -> Self {
        Self {
            builder_name: builder_name.to_string(),
            result,
            source_stamps: build.source_stamps(),
            responsible_users: build.responsible_users(),
            worker_name: build.worker_name(),
            reason: build.reason(),
            build_url: master.build_url(build).filter(|u| !u.is_empty()),
            buildbot_url: master.buildbot_url().filter(|u| !u.is_empty()),
            master_title: master.title(),
        }
    }
}
