// Static configuration shared by the portal and the server processes.

use std::{
    collections::{BTreeMap, HashMap},
    fs::read_to_string,
    path::Path
};

use toml;

use serde_derive::Deserialize;

use crate::{
    error::ConfigError,
    protocols::Protocol
};

// Interface names every deployment gets, before any [interfaces] overrides.
const DEFAULT_INTERFACES: &[(&str, &str)] = &[
    ("loopback", "127.0.0.1"),
    ("internal", "127.0.0.1"),
    ("localhost", "127.0.0.1"),
    ("external", "0.0.0.0"),
    ("public", "0.0.0.0"),
    ("any", "0.0.0.0"),
];

#[derive(Deserialize, Debug, Clone)]
pub struct Keys {
    pub key: String,
    pub pem: String
}

#[derive(Deserialize, Debug, Clone)]
pub struct ListenerConfig {
    pub tls: Option<String>,
    pub protocol: Protocol,
    pub interface: String,
    pub port: i64
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LinkConfig {
    pub interface: String,
    pub port: i64
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            interface: String::from("localhost"),
            port: 7998
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub interfaces: HashMap<String, String>,
    pub tls: HashMap<String, Keys>,
    pub listeners: BTreeMap<String, ListenerConfig>,
    pub link: LinkConfig,
    pub mssp: BTreeMap<String, String>
}

impl Default for Config {
    fn default() -> Self {
        let mut listeners = BTreeMap::new();
        listeners.insert(String::from("telnet"), ListenerConfig {
            tls: None,
            protocol: Protocol::Telnet,
            interface: String::from("any"),
            port: 7999
        });

        Self {
            interfaces: Default::default(),
            tls: Default::default(),
            listeners,
            link: Default::default(),
            mssp: Default::default()
        }
    }
}

impl Config {
    // Reads a toml file. Sections left out keep their defaults.
    pub fn from_file<P: AsRef<Path>>(file_name: P) -> Result<Self, ConfigError> {
        let path = file_name.as_ref();
        let conf_txt = read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source
        })?;
        Self::parse(&conf_txt)
    }

    pub fn parse(conf_txt: &str) -> Result<Self, ConfigError> {
        let conf: Self = toml::from_str(conf_txt)?;
        Ok(conf)
    }

    /// Maps an interface name to a host, configured names taking precedence.
    pub fn resolve_interface(&self, name: &str) -> Option<String> {
        if let Some(host) = self.interfaces.get(name) {
            return Some(host.clone());
        }
        DEFAULT_INTERFACES.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    /// Host and port of the portal<->server link.
    pub fn link_addr(&self) -> Result<(String, u16), ConfigError> {
        let host = self.resolve_interface(&self.link.interface)
            .ok_or_else(|| ConfigError::UnknownInterface(self.link.interface.clone()))?;
        let port = check_port(self.link.port)?;
        Ok((host, port))
    }

    pub fn mssp_pairs(&self) -> Vec<(String, String)> {
        self.mssp.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

pub fn check_port(port: i64) -> Result<u16, ConfigError> {
    u16::try_from(port).map_err(|_| ConfigError::InvalidPort(port))
}
