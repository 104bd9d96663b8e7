//! Error types for release-rail with contextual messages and exit codes
//!
//! One error type flows through the whole engine. Configuration problems (bad JSON,
//! unknown release kinds, dependency cycles) are always fatal; host failures carry the
//! HTTP status so callers can decide whether a retry makes sense.

use std::fmt;
use std::io;

/// Exit codes for release-rail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (host API, git, I/O)
  System = 2,
  /// Validation failure (duplicate releases, pending tags)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for release-rail
#[derive(Debug)]
pub enum ReleaseError {
  /// Configuration errors
  Config(ConfigError),

  /// VCS host errors
  Host(HostError),

  /// I/O errors
  Io(io::Error),

  /// Several independent failures collected from sibling operations
  Aggregate(Vec<ReleaseError>),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl ReleaseError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ReleaseError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Shorthand for an invalid configuration error
  pub fn config(scope: impl Into<String>, message: impl Into<String>) -> Self {
    ReleaseError::Config(ConfigError::Invalid {
      scope: scope.into(),
      message: message.into(),
    })
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ReleaseError::Message { message, context, help } => ReleaseError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      ReleaseError::Io(err) => ReleaseError::Message {
        message: format!("I/O error: {}", err),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  /// Whether the failed call may succeed if attempted again
  pub fn is_retryable(&self) -> bool {
    matches!(self, ReleaseError::Host(e) if e.is_retryable())
  }

  /// Whether this error reports an already existing release tag
  pub fn is_duplicate_release(&self) -> bool {
    matches!(self, ReleaseError::Host(HostError::DuplicateRelease { .. }))
  }

  /// Whether this error reports a missing file on the host
  pub fn is_file_not_found(&self) -> bool {
    matches!(self, ReleaseError::Host(HostError::FileNotFound { .. }))
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ReleaseError::Config(_) => ExitCode::User,
      ReleaseError::Host(HostError::DuplicateRelease { .. }) => ExitCode::Validation,
      ReleaseError::Host(_) => ExitCode::System,
      ReleaseError::Io(_) => ExitCode::System,
      ReleaseError::Aggregate(errors) => errors.first().map(|e| e.exit_code()).unwrap_or(ExitCode::System),
      ReleaseError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::Config(e) => e.help_message(),
      ReleaseError::Host(e) => e.help_message(),
      ReleaseError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::Config(e) => write!(f, "{}", e),
      ReleaseError::Host(e) => write!(f, "{}", e),
      ReleaseError::Io(e) => write!(f, "I/O error: {}", e),
      ReleaseError::Aggregate(errors) => {
        write!(f, "{} operation(s) failed", errors.len())?;
        for err in errors {
          write!(f, "\n  - {}", err)?;
        }
        Ok(())
      }
      ReleaseError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for ReleaseError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ReleaseError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for ReleaseError {
  fn from(err: io::Error) -> Self {
    ReleaseError::Io(err)
  }
}

impl From<String> for ReleaseError {
  fn from(msg: String) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<&str> for ReleaseError {
  fn from(msg: &str) -> Self {
    ReleaseError::message(msg)
  }
}

impl From<ConfigError> for ReleaseError {
  fn from(err: ConfigError) -> Self {
    ReleaseError::Config(err)
  }
}

impl From<HostError> for ReleaseError {
  fn from(err: HostError) -> Self {
    ReleaseError::Host(err)
  }
}

impl From<toml_edit::TomlError> for ReleaseError {
  fn from(err: toml_edit::TomlError) -> Self {
    ReleaseError::message(format!("TOML parse error: {}", err))
  }
}

impl From<toml_edit::de::Error> for ReleaseError {
  fn from(err: toml_edit::de::Error) -> Self {
    ReleaseError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for ReleaseError {
  fn from(err: serde_json::Error) -> Self {
    ReleaseError::message(format!("JSON error: {}", err))
  }
}

impl From<quick_xml::Error> for ReleaseError {
  fn from(err: quick_xml::Error) -> Self {
    ReleaseError::message(format!("XML error: {}", err))
  }
}

impl From<regex::Error> for ReleaseError {
  fn from(err: regex::Error) -> Self {
    ReleaseError::message(format!("Invalid pattern: {}", err))
  }
}

impl From<semver::Error> for ReleaseError {
  fn from(err: semver::Error) -> Self {
    ReleaseError::message(format!("Invalid version: {}", err))
  }
}

impl From<std::string::FromUtf8Error> for ReleaseError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    ReleaseError::message(format!("UTF-8 conversion error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// Invalid configuration value, scoped to a releaser or file
  Invalid { scope: String, message: String },

  /// A config or manifest file that must exist is missing
  MissingRequiredFile { path: String, kind: String },

  /// Release kind not known to the strategy factory
  UnknownReleaseType { name: String },

  /// Dependency cycle found while ordering a workspace
  GraphCycle { path: Vec<String> },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::MissingRequiredFile { kind, .. } => Some(format!(
        "Create the {} on the target branch, or point to it with --config-file / --manifest-file.",
        kind
      )),
      ConfigError::UnknownReleaseType { .. } => {
        Some("Supported release types: simple, rust, node, maven, java.".to_string())
      }
      ConfigError::GraphCycle { .. } => {
        Some("Workspace packages must not depend on each other in a loop. Break the cycle and retry.".to_string())
      }
      ConfigError::Invalid { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::Invalid { scope, message } => write!(f, "{}: {}", scope, message),
      ConfigError::MissingRequiredFile { path, kind } => {
        write!(f, "Missing required {}: {}", kind, path)
      }
      ConfigError::UnknownReleaseType { name } => write!(f, "Unknown release type: {}", name),
      ConfigError::GraphCycle { path } => {
        write!(f, "found cycle in dependency graph: {}", path.join(" -> "))
      }
    }
  }
}

/// Errors reported by the VCS host
#[derive(Debug)]
pub enum HostError {
  /// Host API call failed with an HTTP status
  Api { status: u16, message: String },

  /// Credentials rejected
  Auth { message: String },

  /// File missing on the requested branch
  FileNotFound { path: String },

  /// Release tag already exists
  DuplicateRelease { tag: String },
}

impl HostError {
  /// Server-side failures are transient; everything else is not
  pub fn is_retryable(&self) -> bool {
    matches!(self, HostError::Api { status, .. } if *status >= 500)
  }

  fn help_message(&self) -> Option<String> {
    match self {
      HostError::Auth { .. } => Some("Check the token used to talk to the host and its repository scopes.".to_string()),
      HostError::DuplicateRelease { .. } => Some(
        "The tag already exists. Remove the pending label from the pull request if it was released manually."
          .to_string(),
      ),
      _ => None,
    }
  }
}

impl fmt::Display for HostError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      HostError::Api { status, message } => write!(f, "Host API error ({}): {}", status, message),
      HostError::Auth { message } => write!(f, "Host authentication failed: {}", message),
      HostError::FileNotFound { path } => write!(f, "File not found: {}", path),
      HostError::DuplicateRelease { tag } => write!(f, "Release already exists for tag: {}", tag),
    }
  }
}

/// Result type alias for release-rail
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ReleaseError>,
{
  fn context(self, ctx: impl Into<String>) -> ReleaseResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ReleaseResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ReleaseError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}
