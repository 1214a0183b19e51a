//! Server and group name resolution.
//!
//! Names may be given fully qualified (`server.group.account`) or partially;
//! missing parts come from the `group` and `account` config values.

use std::fmt;

use crate::config::ConfigStore;
use crate::error::CliError;

/// A fully-qualified group name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupName {
    pub group: String,
    pub account: String,
}

/// A fully-qualified server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerName {
    pub server: String,
    pub group: String,
    pub account: String,
}

fn split_name<'a>(kind: &str, name: &'a str, max_parts: usize) -> Result<Vec<&'a str>, CliError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::Usage(format!("{kind} name cannot be empty")));
    }

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > max_parts || parts.iter().any(|part| part.is_empty()) {
        return Err(CliError::Usage(format!("invalid {kind} name '{name}'")));
    }
    Ok(parts)
}

impl GroupName {
    /// Parse `group[.account]`.
    pub fn parse(name: &str, default_account: &str) -> Result<Self, CliError> {
        let parts = split_name("group", name, 2)?;
        Ok(Self {
            group: parts[0].to_string(),
            account: parts.get(1).copied().unwrap_or(default_account).to_string(),
        })
    }

    /// Parse a group name using config defaults. No name means the
    /// configured default group.
    pub fn resolve(name: Option<&str>, store: &ConfigStore) -> Result<Self, CliError> {
        let account = store.get("account")?;
        let group = match name {
            Some(name) => name.to_string(),
            None => store.get("group")?,
        };
        Self::parse(&group, &account)
    }
}

impl ServerName {
    /// Parse `server[.group[.account]]`.
    pub fn parse(name: &str, default_group: &str, default_account: &str) -> Result<Self, CliError> {
        let parts = split_name("server", name, 3)?;
        Ok(Self {
            server: parts[0].to_string(),
            group: parts.get(1).copied().unwrap_or(default_group).to_string(),
            account: parts.get(2).copied().unwrap_or(default_account).to_string(),
        })
    }

    /// Parse a server name using config defaults.
    pub fn resolve(name: &str, store: &ConfigStore) -> Result<Self, CliError> {
        Self::parse(name, &store.get("group")?, &store.get("account")?)
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.account)
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.server, self.group, self.account)
    }
}
