//! config
//!
//! `.pwclientrc` loading, validation, migration, and resolution.
//!
//! # Overview
//!
//! The config file is an INI-style document with one `[options]` section
//! (global defaults) and one section per project:
//!
//! ```ini
//! [options]
//! default = alpha
//! signoff = yes
//!
//! [alpha]
//! url = https://patchwork.example.com/api/
//! backend = rest
//! token = abc123
//! ```
//!
//! # Legacy format
//!
//! Files predating multi-project support carry a `[base]` section with a
//! single implicit project plus an `[auth]` section:
//!
//! ```ini
//! [base]
//! project = alpha
//! url = https://patchwork.example.com/xmlrpc/
//!
//! [auth]
//! username = jdoe
//! password = hunter2
//! ```
//!
//! Loading such a file transparently produces the equivalent multi-project
//! model and marks the in-memory config as upgraded. The file on disk is
//! never rewritten unless [`Config::persist`] is called explicitly.
//!
//! # Locations
//!
//! `$PWCLIENTRC` if set, else `~/.pwclientrc`.

pub mod ini;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::backend::BackendKind;
use ini::Ini;

/// Name synthesized for the implicit project when a legacy `[base]`
/// section has no `project` key of its own.
const LEGACY_PROJECT_FALLBACK: &str = "default";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("no project specified and no default project configured")]
    NoProjectSpecified,

    #[error("no project '{0}' is configured")]
    UnknownProject(String),

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("home directory not found")]
    NoHomeDir,
}

/// Global boolean options from `[options]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Append a Signed-off-by trailer when applying.
    pub signoff: bool,
    /// Attempt a three-way merge when applying.
    pub three_way: bool,
    /// Insert a Message-Id trailer when applying.
    pub msgid: bool,
}

/// Connection parameters for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Project name (the section name, and the Patchwork linkname).
    pub name: String,
    /// Instance URL. Required and non-empty.
    pub url: String,
    /// Explicit backend choice; `None` means infer from the URL.
    pub backend: Option<BackendKind>,
    /// Basic-auth username.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// API token (REST only).
    pub token: Option<String>,
    /// Per-project override of `options.signoff`.
    pub signoff: Option<bool>,
    /// Per-project override of `options.3way`.
    pub three_way: Option<bool>,
    /// Per-project override of `options.msgid`.
    pub msgid: Option<bool>,
}

/// The loaded configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Project used when the caller requests none.
    pub default_project: Option<String>,
    /// Global apply options.
    pub options: Options,
    /// Projects keyed by name.
    pub projects: BTreeMap<String, ProjectConfig>,
    upgraded: bool,
}

impl Config {
    /// The default config path: `$PWCLIENTRC`, else `~/.pwclientrc`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os("PWCLIENTRC") {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".pwclientrc"))
            .ok_or(ConfigError::NoHomeDir)
    }

    /// Load and validate the config file at `path`.
    ///
    /// Legacy-format files are upgraded in memory; loading never fails
    /// solely because the file is legacy-shaped.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is absent; `Parse` on malformed INI syntax,
    /// a bad boolean token, an unknown `backend` value, a missing or empty
    /// `url`, or a `default` naming a project with no section.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let doc = Ini::parse(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        if !doc.has_section("options") && doc.has_section("base") {
            return Self::from_legacy(&doc).map_err(parse_err);
        }
        Self::from_current(&doc).map_err(parse_err)
    }

    /// Whether this config was upgraded from the legacy format at load time.
    pub fn was_upgraded(&self) -> bool {
        self.upgraded
    }

    /// Resolve the active project.
    ///
    /// Returns `requested` if given, else the configured default.
    ///
    /// # Errors
    ///
    /// `NoProjectSpecified` if neither is present; `UnknownProject` if the
    /// name has no section.
    pub fn resolve(&self, requested: Option<&str>) -> Result<&ProjectConfig, ConfigError> {
        let name = match requested {
            Some(name) => name,
            None => self
                .default_project
                .as_deref()
                .ok_or(ConfigError::NoProjectSpecified)?,
        };
        self.projects
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProject(name.to_string()))
    }

    /// Effective apply options for a project: global defaults with the
    /// project's overrides applied.
    pub fn effective_options(&self, project: &ProjectConfig) -> Options {
        Options {
            signoff: project.signoff.unwrap_or(self.options.signoff),
            three_way: project.three_way.unwrap_or(self.options.three_way),
            msgid: project.msgid.unwrap_or(self.options.msgid),
        }
    }

    /// Write the config back to disk in the current format.
    ///
    /// The document is written to a temporary file in the same directory
    /// and atomically renamed over `path`, so a crash mid-write never
    /// corrupts an existing file.
    pub fn persist(&self, path: &Path) -> Result<(), ConfigError> {
        let doc = self.to_ini();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        fs::write(tmp.path(), doc.to_string()).map_err(write_err)?;
        tmp.persist(path).map_err(|err| ConfigError::Write {
            path: path.to_path_buf(),
            source: err.error,
        })?;
        Ok(())
    }

    fn from_current(doc: &Ini) -> Result<Config, String> {
        let mut config = Config::default();

        if let Some(options) = doc.section("options") {
            for (key, value) in options.entries() {
                match key {
                    "default" => config.default_project = Some(value.to_string()),
                    "signoff" => config.options.signoff = parse_bool(value)?,
                    "3way" => config.options.three_way = parse_bool(value)?,
                    "msgid" => config.options.msgid = parse_bool(value)?,
                    _ => {
                        return Err(format!("unknown key '{key}' in [options]"));
                    }
                }
            }
        }

        for section in doc.sections().filter(|s| s.name != "options") {
            let project = Self::parse_project(&section.name, |key| section.get(key))?;
            config.projects.insert(section.name.clone(), project);
        }

        config.validate()?;
        Ok(config)
    }

    /// Pure transform from the legacy `[base]`/`[auth]` shape.
    fn from_legacy(doc: &Ini) -> Result<Config, String> {
        let name = doc
            .get("base", "project")
            .unwrap_or(LEGACY_PROJECT_FALLBACK)
            .to_string();
        let url = doc
            .get("base", "url")
            .ok_or_else(|| "no 'url' key in [base]".to_string())?
            .to_string();

        let project = ProjectConfig {
            name: name.clone(),
            url,
            username: doc.get("auth", "username").map(str::to_string),
            password: doc.get("auth", "password").map(str::to_string),
            ..Default::default()
        };

        let mut projects = BTreeMap::new();
        projects.insert(name.clone(), project);

        let config = Config {
            default_project: Some(name),
            options: Options::default(),
            projects,
            upgraded: true,
        };
        config.validate()?;
        Ok(config)
    }

    fn parse_project<'a>(
        name: &str,
        get: impl Fn(&str) -> Option<&'a str>,
    ) -> Result<ProjectConfig, String> {
        let url = get("url")
            .ok_or_else(|| format!("no 'url' key in project section [{name}]"))?
            .to_string();

        let backend = match get("backend") {
            Some(value) => Some(
                BackendKind::parse(value)
                    .ok_or_else(|| format!("unknown backend '{value}' in [{name}]"))?,
            ),
            None => None,
        };

        let parse_opt_bool = |key: &str| -> Result<Option<bool>, String> {
            get(key).map(parse_bool).transpose()
        };

        Ok(ProjectConfig {
            name: name.to_string(),
            url,
            backend,
            username: get("username").map(str::to_string),
            password: get("password").map(str::to_string),
            token: get("token").map(str::to_string),
            signoff: parse_opt_bool("signoff")?,
            three_way: parse_opt_bool("3way")?,
            msgid: parse_opt_bool("msgid")?,
        })
    }

    fn validate(&self) -> Result<(), String> {
        for (name, project) in &self.projects {
            if project.url.trim().is_empty() {
                return Err(format!("project '{name}' has an empty url"));
            }
        }
        if let Some(default) = &self.default_project {
            if !self.projects.contains_key(default) {
                return Err(format!(
                    "default project '{default}' has no matching section"
                ));
            }
        }
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let mut doc = Ini::new();

        if let Some(default) = &self.default_project {
            doc.set("options", "default", default.clone());
        }
        if self.options.signoff {
            doc.set("options", "signoff", "yes");
        }
        if self.options.three_way {
            doc.set("options", "3way", "yes");
        }
        if self.options.msgid {
            doc.set("options", "msgid", "yes");
        }

        for (name, project) in &self.projects {
            doc.set(name, "url", project.url.clone());
            if let Some(backend) = project.backend {
                doc.set(name, "backend", backend.name());
            }
            if let Some(username) = &project.username {
                doc.set(name, "username", username.clone());
            }
            if let Some(password) = &project.password {
                doc.set(name, "password", password.clone());
            }
            if let Some(token) = &project.token {
                doc.set(name, "token", token.clone());
            }
            for (key, value) in [
                ("signoff", project.signoff),
                ("3way", project.three_way),
                ("msgid", project.msgid),
            ] {
                if let Some(value) = value {
                    doc.set(name, key, if value { "yes" } else { "no" });
                }
            }
        }

        doc
    }
}

/// Parse a boolean token the way configparser does.
///
/// Accepts `1 yes true on` / `0 no false off`, case-insensitively.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        other => Err(format!("not a boolean: '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(text: &str) -> Result<Config, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pwclientrc");
        fs::write(&path, text).unwrap();
        Config::load(&path)
    }

    const CURRENT: &str = "\
[options]
default = alpha
signoff = yes

[alpha]
url = https://example.com/api/
backend = rest
token = abc123

[beta]
url = https://example.com/xmlrpc/
username = jdoe
password = hunter2
";

    #[test]
    fn load_current_format() {
        let config = load_str(CURRENT).unwrap();
        assert!(!config.was_upgraded());
        assert_eq!(config.default_project.as_deref(), Some("alpha"));
        assert!(config.options.signoff);
        assert!(!config.options.three_way);

        let alpha = &config.projects["alpha"];
        assert_eq!(alpha.backend, Some(BackendKind::Rest));
        assert_eq!(alpha.token.as_deref(), Some("abc123"));

        let beta = &config.projects["beta"];
        assert_eq!(beta.backend, None);
        assert_eq!(beta.username.as_deref(), Some("jdoe"));
    }

    #[test]
    fn resolve_default_and_requested() {
        let config = load_str(CURRENT).unwrap();
        assert_eq!(config.resolve(None).unwrap().name, "alpha");
        assert_eq!(config.resolve(Some("beta")).unwrap().name, "beta");
        assert!(matches!(
            config.resolve(Some("gamma")),
            Err(ConfigError::UnknownProject(name)) if name == "gamma"
        ));
    }

    #[test]
    fn resolve_without_default_fails() {
        let config = load_str("[alpha]\nurl = https://example.com/api/\n").unwrap();
        assert!(matches!(
            config.resolve(None),
            Err(ConfigError::NoProjectSpecified)
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("absent")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn bad_bool_is_parse_error() {
        let err = load_str("[options]\nsignoff = maybe\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn unknown_backend_is_parse_error() {
        let err = load_str("[alpha]\nurl = x\nbackend = soap\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_url_is_parse_error() {
        let err = load_str("[alpha]\nusername = jdoe\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn dangling_default_is_parse_error() {
        let err = load_str("[options]\ndefault = gamma\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn legacy_is_upgraded_and_equivalent() {
        let legacy = "\
[base]
project = alpha
url = https://example.com/xmlrpc/

[auth]
username = jdoe
password = hunter2
";
        let current = "\
[options]
default = alpha

[alpha]
url = https://example.com/xmlrpc/
username = jdoe
password = hunter2
";
        let from_legacy = load_str(legacy).unwrap();
        let from_current = load_str(current).unwrap();

        assert!(from_legacy.was_upgraded());
        assert_eq!(
            from_legacy.resolve(None).unwrap(),
            from_current.resolve(None).unwrap()
        );
    }

    #[test]
    fn legacy_without_project_key_uses_fallback_name() {
        let config = load_str("[base]\nurl = https://example.com/\n").unwrap();
        assert_eq!(config.default_project.as_deref(), Some("default"));
        assert!(config.projects.contains_key("default"));
    }

    #[test]
    fn legacy_without_url_is_parse_error() {
        let err = load_str("[base]\nproject = alpha\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn persist_then_load_round_trips() {
        let config = load_str(CURRENT).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pwclientrc");
        config.persist(&path).unwrap();

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(config, reloaded);

        // And a second round trip is byte-identical.
        let first = fs::read_to_string(&path).unwrap();
        reloaded.persist(&path).unwrap();
        assert_eq!(first, fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn effective_options_apply_project_overrides() {
        let config = load_str(
            "\
[options]
signoff = yes
msgid = no

[alpha]
url = x
signoff = no
3way = yes
",
        )
        .unwrap();
        let alpha = config.resolve(Some("alpha")).unwrap();
        let options = config.effective_options(alpha);
        assert!(!options.signoff);
        assert!(options.three_way);
        assert!(!options.msgid);
    }

    #[test]
    fn parse_bool_tokens() {
        for token in ["1", "yes", "Yes", "TRUE", "on"] {
            assert_eq!(parse_bool(token), Ok(true), "{token}");
        }
        for token in ["0", "no", "False", "OFF"] {
            assert_eq!(parse_bool(token), Ok(false), "{token}");
        }
        assert!(parse_bool("maybe").is_err());
        assert!(parse_bool("").is_err());
    }
}
