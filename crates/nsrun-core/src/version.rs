use semver::Version;
use std::fmt;

/// Lowest CLI release the run commands are known to work with
pub const DEFAULT_MIN_CLI_VERSION: &str = "2.5.0";

/// Supported range of CLI versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionBounds {
    pub min: Version,
    pub max: Option<Version>,
}

impl Default for VersionBounds {
    fn default() -> Self {
        Self {
            min: Version::new(2, 5, 0),
            max: None,
        }
    }
}

impl VersionBounds {
    pub fn new(min: Version, max: Option<Version>) -> Self {
        Self { min, max }
    }

    /// Classify `version` against the bounds, ignoring pre-release and build tags
    pub fn classify(&self, version: &Version) -> CliVersionState {
        let found = release(version);
        if found < release(&self.min) {
            return CliVersionState::OlderThanSupported;
        }
        match &self.max {
            Some(max) if found > release(max) => CliVersionState::NewerThanSupported,
            _ => CliVersionState::Compatible,
        }
    }
}

fn release(version: &Version) -> (u64, u64, u64) {
    (version.major, version.minor, version.patch)
}

/// Outcome of comparing the installed CLI against the supported range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVersionState {
    NotExisting,
    OlderThanSupported,
    NewerThanSupported,
    Compatible,
}

/// Parsed CLI version plus its compatibility verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    version: Option<Version>,
    state: CliVersionState,
    error_message: Option<String>,
}

impl VersionInfo {
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn state(&self) -> CliVersionState {
        self.state
    }

    pub fn is_compatible(&self) -> bool {
        self.state == CliVersionState::Compatible
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{version}"),
            None => f.write_str("not installed"),
        }
    }
}

/// Evaluate the raw `--version` output of the CLI.
///
/// `None`, empty output, or output without any recognizable version all mean
/// the CLI is not installed.
pub fn evaluate(raw: Option<&str>, bounds: &VersionBounds) -> VersionInfo {
    let Some(version) = raw.and_then(parse_version) else {
        return VersionInfo {
            version: None,
            state: CliVersionState::NotExisting,
            error_message: Some(
                "NativeScript CLI not found, please run 'npm -g install nativescript' to install it."
                    .to_string(),
            ),
        };
    };

    let state = bounds.classify(&version);
    let error_message = match state {
        CliVersionState::OlderThanSupported => Some(format!(
            "The existing NativeScript extension is compatible with NativeScript CLI v{} or greater. \
             The currently installed NativeScript CLI is v{version}. \
             You can update the NativeScript CLI by executing 'npm install -g nativescript'.",
            bounds.min
        )),
        CliVersionState::NewerThanSupported => Some(format!(
            "The existing NativeScript extension is compatible with NativeScript CLI up to v{}. \
             The currently installed NativeScript CLI is v{version}.",
            bounds.max.as_ref().unwrap_or(&bounds.min)
        )),
        CliVersionState::Compatible | CliVersionState::NotExisting => None,
    };

    VersionInfo {
        version: Some(version),
        state,
        error_message,
    }
}

/// Extract a version from CLI output.
///
/// The CLI may print update notices around the version, so the last
/// non-empty line that is a version on its own wins. A leading `v` is
/// accepted and `major.minor` is padded.
pub fn parse_version(raw: &str) -> Option<Version> {
    raw.lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find_map(parse_line)
}

fn parse_line(line: &str) -> Option<Version> {
    let token = line.strip_prefix('v').unwrap_or(line);
    if let Ok(version) = Version::parse(token) {
        return Some(version);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), None) => Some(Version::new(
            major.parse().ok()?,
            minor.parse().ok()?,
            0,
        )),
        _ => None,
    }
}
