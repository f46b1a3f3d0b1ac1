// pydeps-net/src/netrc.rs
//! Credentials from a user netrc file.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use pydeps_common::error::{PydepsError, Result};
use tracing::debug;
use url::Url;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Netrc {
    machines: BTreeMap<String, Credentials>,
    default: Option<Credentials>,
}

#[derive(Default)]
struct Entry {
    machine: Option<String>,
    is_default: bool,
    login: Option<String>,
    password: Option<String>,
}

impl Netrc {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PydepsError::Config(format!("Failed to read netrc file {}: {e}", path.display()))
        })?;
        let netrc = Self::parse(&text);
        debug!(
            "Loaded {} machine entries from {}",
            netrc.machines.len(),
            path.display()
        );
        Ok(netrc)
    }

    pub fn parse(text: &str) -> Self {
        let mut netrc = Self::default();
        let mut entry: Option<Entry> = None;
        let mut in_macdef = false;
        let mut pending_key: Option<String> = None;

        for line in text.lines() {
            if in_macdef {
                if line.trim().is_empty() {
                    in_macdef = false;
                }
                continue;
            }
            if line.trim_start().starts_with('#') {
                continue;
            }
            for token in line.split_whitespace() {
                if let Some(key) = pending_key.take() {
                    if let Some(current) = entry.as_mut() {
                        match key.as_str() {
                            "machine" => current.machine = Some(token.to_string()),
                            "login" => current.login = Some(token.to_string()),
                            "password" => current.password = Some(token.to_string()),
                            _ => {}
                        }
                    }
                    continue;
                }
                match token {
                    "machine" => {
                        netrc.finish(entry.take());
                        entry = Some(Entry::default());
                        pending_key = Some("machine".to_string());
                    }
                    "default" => {
                        netrc.finish(entry.take());
                        entry = Some(Entry {
                            is_default: true,
                            ..Entry::default()
                        });
                    }
                    "login" | "password" | "account" => pending_key = Some(token.to_string()),
                    "macdef" => {
                        in_macdef = true;
                        break;
                    }
                    _ => {}
                }
            }
        }
        netrc.finish(entry);
        netrc
    }

    fn finish(&mut self, entry: Option<Entry>) {
        let Some(entry) = entry else { return };
        let credentials = Credentials {
            login: entry.login.unwrap_or_default(),
            password: entry.password.unwrap_or_default(),
        };
        if entry.is_default {
            self.default = Some(credentials);
        } else if let Some(machine) = entry.machine {
            self.machines.entry(machine).or_insert(credentials);
        }
    }

    /// Looks up `host:port`, then `host`, then the `default` entry. Entries
    /// without both a login and a password do not count.
    pub fn credentials_for_url(&self, url: &str) -> Option<Credentials> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let netloc = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        [
            self.machines.get(&netloc),
            self.machines.get(host),
            self.default.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find(|c| !c.login.is_empty() && !c.password.is_empty())
        .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETRC: &str = "\
# private index
machine pypi.example.com login alice password s3cret
machine other.example:8443
    login bob
    password hunter2
macdef init
machine ignored.example login x password y

machine nopass.example login carol
default login anon password anon-pass
";

    #[test]
    fn looks_up_by_host_and_port() {
        let netrc = Netrc::parse(NETRC);
        let alice = netrc
            .credentials_for_url("https://pypi.example.com/simple/")
            .unwrap();
        assert_eq!(alice.login, "alice");
        assert_eq!(alice.password, "s3cret");

        let bob = netrc
            .credentials_for_url("https://other.example:8443/simple")
            .unwrap();
        assert_eq!(bob.login, "bob");
    }

    #[test]
    fn macdef_bodies_and_incomplete_entries_are_skipped() {
        let netrc = Netrc::parse(NETRC);
        assert_eq!(
            netrc
                .credentials_for_url("https://ignored.example/")
                .map(|c| c.login),
            Some("anon".to_string())
        );
        assert_eq!(
            netrc
                .credentials_for_url("https://nopass.example/")
                .map(|c| c.login),
            Some("anon".to_string())
        );
    }

    #[test]
    fn no_default_means_no_credentials() {
        let netrc = Netrc::parse("machine a.example login u password p\n");
        assert!(netrc.credentials_for_url("https://b.example/").is_none());
        assert!(format!("{:?}", netrc).contains("<redacted>"));
    }
}
