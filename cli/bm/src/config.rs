//! Layered configuration store.
//!
//! Every configuration variable is resolved, highest precedence first, from:
//! - the in-memory memo (flags and explicit `set` calls)
//! - a file named after the variable inside the config directory
//! - a per-variable environment variable
//! - a hard-coded default
//!
//! Each resolved value carries its provenance as a [`Source`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "BM_CONFIG_DIR";

/// Config directory name under the user's home directory.
const DEFAULT_DIR_NAME: &str = ".bm";

pub const DEFAULT_ENDPOINT: &str = "https://uk0.bigv.io";
pub const DEFAULT_AUTH_ENDPOINT: &str = "https://auth.bytemark.co.uk";

/// Variables reported by [`ConfigStore::get_all`], in display order.
pub const CONFIG_VARS: &[&str] = &[
    "endpoint",
    "auth-endpoint",
    "user",
    "account",
    "group",
    "token",
    "debug-level",
    "yubikey",
];

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Set by a command-line flag.
    Flag(String),
    /// Read from an environment variable.
    Env(String),
    /// Read from a file in the config directory.
    File(PathBuf),
    /// Hard-coded default.
    Code,
    /// Obtained from the auth endpoint.
    Auth,
    /// Entered at an interactive prompt.
    Interaction,
    /// Cleared after being rejected.
    Invalid,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Flag(flag) => write!(f, "FLAG {flag}"),
            Source::Env(var) => write!(f, "ENV {var}"),
            Source::File(path) => write!(f, "FILE {}", path.display()),
            Source::Code => f.write_str("CODE"),
            Source::Auth => f.write_str("AUTH"),
            Source::Interaction => f.write_str("INTERACTION"),
            Source::Invalid => f.write_str("INVALID"),
        }
    }
}

/// A resolved configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigVariable {
    pub name: String,
    pub value: String,
    pub source: Source,
}

impl ConfigVariable {
    fn new(name: &str, value: impl Into<String>, source: Source) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            source,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read config variable '{name}' from {}", path.display())]
    Read {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("couldn't write config variable '{name}' to {}", path.display())]
    Write {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config directory {} is invalid: {reason}", path.display())]
    DirInvalid { path: PathBuf, reason: String },
}

/// Snapshot of the process environment.
///
/// Captured once at startup so nothing below `main` reads ambient state.
#[derive(Debug, Clone, Default)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    pub fn capture() -> Self {
        std::env::vars().collect()
    }

    /// Look up a variable. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A parsed set of flags that can feed the configuration memo.
pub trait FlagSet {
    /// Config variables explicitly given as flags, as `(variable, value)`.
    fn config_flags(&self) -> Vec<(&'static str, String)>;

    /// Positional arguments left over after flag parsing.
    fn positional(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Layered key/value store backed by one file per variable.
#[derive(Debug)]
pub struct ConfigStore {
    dir: PathBuf,
    memo: HashMap<String, ConfigVariable>,
    env: Environment,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl ConfigStore {
    /// Resolve the config directory from a flag, `BM_CONFIG_DIR`, or the
    /// home directory, in that order.
    pub fn resolve_dir(flag: Option<&Path>, env: &Environment) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = flag {
            return Ok(dir.to_path_buf());
        }
        if let Some(dir) = env.get(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(DEFAULT_DIR_NAME))
            .ok_or_else(|| ConfigError::DirInvalid {
                path: PathBuf::from("~").join(DEFAULT_DIR_NAME),
                reason: "could not determine home directory".to_string(),
            })
    }

    /// Open a store on `dir`, creating the directory if needed, and import
    /// the global flags into the memo.
    pub fn open(dir: PathBuf, env: Environment, flags: &impl FlagSet) -> Result<Self, ConfigError> {
        ensure_dir(&dir)?;

        let mut store = Self {
            dir,
            memo: HashMap::new(),
            env,
        };
        store.import_flags(flags);
        Ok(store)
    }

    /// The config directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy explicitly-given flags into the memo and return the positional
    /// arguments.
    pub fn import_flags(&mut self, flags: &impl FlagSet) -> Vec<String> {
        for (name, value) in flags.config_flags() {
            self.set(name, value, Source::Flag(name.to_string()));
        }
        flags.positional()
    }

    /// Resolve a variable's value.
    pub fn get(&self, name: &str) -> Result<String, ConfigError> {
        self.get_v(name).map(|var| var.value)
    }

    /// Resolve a variable's value, treating errors as empty.
    pub fn get_ignore_err(&self, name: &str) -> String {
        self.get(name).unwrap_or_default()
    }

    /// Resolve a variable as a boolean.
    ///
    /// Only `""` and `"false"` are false. Note that `"0"` is true.
    pub fn get_bool(&self, name: &str) -> Result<bool, ConfigError> {
        let value = self.get(name)?;
        Ok(!(value.is_empty() || value == "false"))
    }

    /// Resolve a variable with its provenance.
    pub fn get_v(&self, name: &str) -> Result<ConfigVariable, ConfigError> {
        let name = key(name);

        if let Some(var) = self.memo.get(&name) {
            return Ok(var.clone());
        }

        if let Some(var) = self.read_file(&name)? {
            return Ok(var);
        }

        self.env_or_default(&name)
    }

    /// Resolve every variable in [`CONFIG_VARS`].
    pub fn get_all(&self) -> Result<Vec<ConfigVariable>, ConfigError> {
        CONFIG_VARS.iter().map(|name| self.get_v(name)).collect()
    }

    /// Set a variable in memory only.
    pub fn set(&mut self, name: &str, value: impl Into<String>, source: Source) {
        let name = key(name);
        let var = ConfigVariable::new(&name, value, source);
        self.memo.insert(name, var);
    }

    /// Set a variable in memory and write it to its file.
    ///
    /// The in-memory value is updated even if the write fails.
    pub fn set_persistent(
        &mut self,
        name: &str,
        value: impl Into<String>,
        source: Source,
    ) -> Result<(), ConfigError> {
        let value = value.into();
        self.set(name, value.clone(), source.clone());

        let name = key(name);
        let path = self.path_for(&name);
        write_private(&path, &value).map_err(|source| ConfigError::Write {
            name: name.clone(),
            path: path.clone(),
            source,
        })?;

        debug!(variable = %name, source = %source, path = %path.display(), "Persisted config variable");
        Ok(())
    }

    /// Remove a variable from memory and delete its file.
    pub fn unset(&mut self, name: &str) -> Result<(), ConfigError> {
        let name = key(name);
        self.memo.remove(&name);

        let path = self.path_for(&name);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(variable = %name, path = %path.display(), "Removed config variable");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConfigError::Write { name, path, source }),
        }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn read_file(&self, name: &str) -> Result<Option<ConfigVariable>, ConfigError> {
        let path = self.path_for(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(ConfigVariable::new(
                name,
                contents.trim(),
                Source::File(path),
            ))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ConfigError::Read {
                name: name.to_string(),
                path,
                source,
            }),
        }
    }

    fn from_env(&self, name: &str, var: &str, default: &str) -> ConfigVariable {
        match self.env.get(var) {
            Some(value) => ConfigVariable::new(name, value, Source::Env(var.to_string())),
            None => ConfigVariable::new(name, default, Source::Code),
        }
    }

    fn env_or_default(&self, name: &str) -> Result<ConfigVariable, ConfigError> {
        let var = match name {
            "endpoint" => self.from_env(name, "BM_ENDPOINT", DEFAULT_ENDPOINT),
            "auth-endpoint" => self.from_env(name, "BM_AUTH", DEFAULT_AUTH_ENDPOINT),
            "group" => self.from_env(name, "BM_GROUP", "default"),
            "debug-level" => self.from_env(name, "BM_DEBUG", "0"),
            "user" => match self.env.get("BM_USER") {
                Some(_) => self.from_env(name, "BM_USER", ""),
                None => self.from_env(name, "USER", ""),
            },
            "account" => match self.env.get("BM_ACCOUNT") {
                Some(_) => self.from_env(name, "BM_ACCOUNT", ""),
                None => {
                    let user = self.get_v("user")?;
                    ConfigVariable::new(name, user.value, user.source)
                }
            },
            _ => ConfigVariable::new(name, "", Source::Code),
        };
        Ok(var)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::DirInvalid {
            path: dir.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            create_private_dir(dir).map_err(|e| ConfigError::DirInvalid {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })
        }
        Err(e) => Err(ConfigError::DirInvalid {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
    }

    #[cfg(not(unix))]
    {
        fs::create_dir_all(dir)
    }
}

fn write_private(path: &Path, contents: &str) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        file.write_all(contents.as_bytes())
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    struct Flags(Vec<(&'static str, String)>);

    impl FlagSet for Flags {
        fn config_flags(&self) -> Vec<(&'static str, String)> {
            self.0.clone()
        }

        fn positional(&self) -> Vec<String> {
            vec!["server.group".to_string()]
        }
    }

    fn no_flags() -> Flags {
        Flags(Vec::new())
    }

    fn store_with(dir: &TempDir, env: &[(&str, &str)], flags: Flags) -> ConfigStore {
        let env: Environment = env.iter().copied().collect();
        ConfigStore::open(dir.path().to_path_buf(), env, &flags).unwrap()
    }

    #[test]
    fn test_source_display() {
        assert_eq!(Source::Flag("debug-level".into()).to_string(), "FLAG debug-level");
        assert_eq!(Source::Env("BM_USER".into()).to_string(), "ENV BM_USER");
        assert_eq!(Source::File("/tmp/x".into()).to_string(), "FILE /tmp/x");
        assert_eq!(Source::Code.to_string(), "CODE");
        assert_eq!(Source::Invalid.to_string(), "INVALID");
    }

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[], no_flags());

        let group = store.get_v("group").unwrap();
        assert_eq!(group.value, "default");
        assert_eq!(group.source, Source::Code);
        assert_eq!(store.get("debug-level").unwrap(), "0");
        assert_eq!(store.get("endpoint").unwrap(), DEFAULT_ENDPOINT);
        assert_eq!(store.get("token").unwrap(), "");
    }

    #[rstest]
    #[case("endpoint", "BM_ENDPOINT", DEFAULT_ENDPOINT)]
    #[case("auth-endpoint", "BM_AUTH", DEFAULT_AUTH_ENDPOINT)]
    #[case("group", "BM_GROUP", "default")]
    #[case("debug-level", "BM_DEBUG", "0")]
    #[case("user", "BM_USER", "")]
    #[case("account", "BM_ACCOUNT", "")]
    fn test_precedence_flag_file_env_default(
        #[case] name: &'static str,
        #[case] env_var: &str,
        #[case] default: &str,
    ) {
        let dir = TempDir::new().unwrap();
        let env = [(env_var, "from-env")];

        let store = store_with(&dir, &[], no_flags());
        let var = store.get_v(name).unwrap();
        assert_eq!(var.value, default);
        assert_eq!(var.source, Source::Code);

        let store = store_with(&dir, &env, no_flags());
        let var = store.get_v(name).unwrap();
        assert_eq!(var.value, "from-env");
        assert_eq!(var.source, Source::Env(env_var.to_string()));

        fs::write(dir.path().join(name), "from-file\n").unwrap();
        let store = store_with(&dir, &env, no_flags());
        let var = store.get_v(name).unwrap();
        assert_eq!(var.value, "from-file");
        assert_eq!(var.source, Source::File(dir.path().join(name)));

        let store = store_with(&dir, &env, Flags(vec![(name, "from-flag".into())]));
        let var = store.get_v(name).unwrap();
        assert_eq!(var.value, "from-flag");
        assert_eq!(var.source, Source::Flag(name.to_string()));
    }

    #[test]
    fn test_account_follows_user_until_overridden() {
        let dir = TempDir::new().unwrap();

        let store = store_with(&dir, &[("USER", "login")], no_flags());
        let var = store.get_v("account").unwrap();
        assert_eq!(var.value, "login");
        assert_eq!(var.source, Source::Env("USER".into()));

        let env = [("USER", "login"), ("BM_USER", "alice")];
        let store = store_with(&dir, &env, no_flags());
        let var = store.get_v("account").unwrap();
        assert_eq!(var.value, "alice");
        assert_eq!(var.source, Source::Env("BM_USER".into()));

        fs::write(dir.path().join("account"), "acme").unwrap();
        let store = store_with(&dir, &env, no_flags());
        let var = store.get_v("account").unwrap();
        assert_eq!(var.value, "acme");
        assert_eq!(var.source, Source::File(dir.path().join("account")));
    }

    #[test]
    fn test_memo_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());

        store.set("Debug-Level", "2", Source::Code);
        assert_eq!(store.get("debug-level").unwrap(), "2");
        assert_eq!(store.get("DEBUG-LEVEL").unwrap(), "2");
    }

    #[test]
    fn test_set_then_get() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());

        store.set("user", "alice", Source::Interaction);
        let var = store.get_v("user").unwrap();
        assert_eq!(var.value, "alice");
        assert_eq!(var.source, Source::Interaction);
        assert!(!dir.path().join("user").exists());
    }

    #[test]
    fn test_set_persistent_survives_new_store() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());
        store.set_persistent("token", "abc123", Source::Auth).unwrap();
        assert_eq!(store.get_v("token").unwrap().source, Source::Auth);

        let fresh = store_with(&dir, &[], no_flags());
        let var = fresh.get_v("token").unwrap();
        assert_eq!(var.value, "abc123");
        assert_eq!(var.source, Source::File(dir.path().join("token")));
        assert_eq!(
            var.source.to_string(),
            format!("FILE {}", dir.path().join("token").display())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_persisted_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());
        store.set_persistent("token", "secret", Source::Auth).unwrap();

        let mode = fs::metadata(dir.path().join("token")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_set_persistent_write_failure_still_updates_memo() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());
        fs::create_dir(dir.path().join("token")).unwrap();

        let err = store.set_persistent("token", "abc", Source::Auth).unwrap_err();
        assert!(matches!(err, ConfigError::Write { ref name, .. } if name == "token"));
        assert_eq!(store.get("token").unwrap(), "abc");
    }

    #[test]
    fn test_unset_falls_back() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[("BM_GROUP", "env-group")], no_flags());

        store.set_persistent("group", "file-group", Source::Code).unwrap();
        assert_eq!(store.get("group").unwrap(), "file-group");

        store.unset("group").unwrap();
        assert!(!dir.path().join("group").exists());
        assert_eq!(store.get("group").unwrap(), "env-group");

        // Unsetting something that was never set is fine.
        store.unset("group").unwrap();
    }

    #[test]
    fn test_read_failure_is_not_silently_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("endpoint")).unwrap();
        let store = store_with(&dir, &[], no_flags());

        let err = store.get("endpoint").unwrap_err();
        assert!(matches!(err, ConfigError::Read { ref name, .. } if name == "endpoint"));
        assert_eq!(store.get_ignore_err("endpoint"), "");
        assert!(store.get_all().is_err());
    }

    #[test]
    fn test_get_bool() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());

        assert!(!store.get_bool("yubikey").unwrap());
        store.set("yubikey", "false", Source::Code);
        assert!(!store.get_bool("yubikey").unwrap());
        store.set("yubikey", "true", Source::Code);
        assert!(store.get_bool("yubikey").unwrap());
        store.set("yubikey", "no", Source::Code);
        assert!(store.get_bool("yubikey").unwrap());
    }

    #[test]
    fn test_get_bool_zero_is_true() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());

        store.set("force", "0", Source::Code);
        assert!(store.get_bool("force").unwrap());
    }

    #[test]
    fn test_user_falls_back_to_login_name() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[("USER", "shell-user")], no_flags());
        assert_eq!(
            store.get_v("user").unwrap().source,
            Source::Env("USER".into())
        );

        let store = store_with(&dir, &[("USER", "shell-user"), ("BM_USER", "bm-user")], no_flags());
        assert_eq!(store.get("user").unwrap(), "bm-user");
    }

    #[test]
    fn test_account_derives_from_user() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[("BM_USER", "alice")], no_flags());
        assert_eq!(store.get("account").unwrap(), "alice");

        store.set("user", "bob", Source::Flag("user".into()));
        assert_eq!(store.get("account").unwrap(), "bob");

        let store = store_with(&dir, &[("BM_USER", "alice"), ("BM_ACCOUNT", "acme")], no_flags());
        assert_eq!(store.get("account").unwrap(), "acme");
    }

    #[test]
    fn test_get_all_order() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir, &[], no_flags());

        let names: Vec<String> = store.get_all().unwrap().into_iter().map(|v| v.name).collect();
        assert_eq!(names, CONFIG_VARS);
    }

    #[test]
    fn test_import_flags_returns_positional() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir, &[], no_flags());

        let rest = store.import_flags(&Flags(vec![("account", "acme".into())]));
        assert_eq!(rest, vec!["server.group".to_string()]);
        assert_eq!(store.get_v("account").unwrap().source, Source::Flag("account".into()));
    }

    #[test]
    fn test_resolve_dir() {
        let env: Environment = [(CONFIG_DIR_ENV, "/from/env")].into_iter().collect();
        assert_eq!(
            ConfigStore::resolve_dir(Some(Path::new("/from/flag")), &env).unwrap(),
            PathBuf::from("/from/flag")
        );
        assert_eq!(
            ConfigStore::resolve_dir(None, &env).unwrap(),
            PathBuf::from("/from/env")
        );
    }

    #[test]
    fn test_open_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        ConfigStore::open(nested.clone(), Environment::default(), &no_flags()).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_open_rejects_file_as_dir() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let err = ConfigStore::open(file, Environment::default(), &no_flags()).unwrap_err();
        assert!(matches!(err, ConfigError::DirInvalid { .. }));
    }
}
