// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::*;

use serde::{Deserialize, Serialize};

use std::io::Read;

/// Valid listening ports. Ports below 1024 are privileged; port 0 is
/// reserved for tests binding an ephemeral port through the library entry
/// point.
const PORT_MIN: u16 = 1024;

// struct definitions
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct PetrelConfig {
    // application modules
    #[serde(default)]
    server: Server,
    #[serde(default)]
    worker: Worker,
    #[serde(default)]
    db: Db,
    #[serde(default)]
    debug: Debug,
}

// trait implementations
impl ServerConfig for PetrelConfig {
    fn server(&self) -> &Server {
        &self.server
    }
}

impl WorkerConfig for PetrelConfig {
    fn worker(&self) -> &Worker {
        &self.worker
    }
}

impl DbConfig for PetrelConfig {
    fn db(&self) -> &Db {
        &self.db
    }
}

impl DebugConfig for PetrelConfig {
    fn debug(&self) -> &Debug {
        &self.debug
    }
}

// implementation
impl PetrelConfig {
    pub fn load(file: &str) -> Result<Self, std::io::Error> {
        let mut file = std::fs::File::open(file)?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        match toml::from_str(&content) {
            Ok(t) => Ok(t),
            Err(e) => {
                error!("{}", e);
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "Error parsing config",
                ))
            }
        }
    }

    /// Validate startup constraints which the sections cannot check on
    /// their own.
    pub fn validate(&self) -> Result<(), String> {
        match self.server.port().parse::<u16>() {
            Ok(port) if port >= PORT_MIN => Ok(()),
            Ok(port) => Err(format!("port {} out of range [{}, 65535]", port, PORT_MIN)),
            Err(_) => Err(format!("invalid port: {}", self.server.port())),
        }
    }

    pub fn print(&self) {
        println!("{:#?}", self);
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PetrelConfig::default();
        assert_eq!(config.server().port(), "1316");
        assert_eq!(config.server().timeout_ms(), 60_000);
        assert_eq!(config.server().backlog(), 6);
        assert_eq!(config.server().max_connections(), 65536);
        assert_eq!(config.worker().threads(), 6);
        assert_eq!(config.db().pool_size(), 12);
        assert_eq!(config.debug().log_level(), 1);
        assert_eq!(config.debug().log_queue_depth(), 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_toml() {
        let content = "
            [server]
            port = \"8080\"
            timeout_ms = 500

            [worker]
            threads = 2
        ";
        let config: PetrelConfig = toml::from_str(content).unwrap();
        assert_eq!(config.server().port(), "8080");
        assert_eq!(config.server().timeout_ms(), 500);
        assert_eq!(config.worker().threads(), 2);
        // untouched sections keep their defaults
        assert_eq!(config.db().port(), 5432);
    }

    #[test]
    fn validate_rejects_privileged_ports() {
        let mut config = PetrelConfig::default();
        config.server_mut().set_port("80".to_string());
        assert!(config.validate().is_err());
        config.server_mut().set_port("no".to_string());
        assert!(config.validate().is_err());
        config.server_mut().set_port("1024".to_string());
        assert!(config.validate().is_ok());
    }
}
