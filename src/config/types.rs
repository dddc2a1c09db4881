use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::btle::LinkTiming;
use crate::device::constants::{CONNECT_DEADLINE, DISCOVER_DEADLINE, SUBSCRIBE_DEADLINE};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Index of the bluetooth adapter to use, in the order the OS lists them
    pub adapter: usize,
    pub connect_deadline: String,
    pub discover_deadline: String,
    pub subscribe_deadline: String,
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::InvalidDuration { field, source })
}

impl Config {
    pub fn link_timing(&self) -> Result<LinkTiming, ConfigError> {
        Ok(LinkTiming {
            connect: parse_duration("connectDeadline", &self.connect_deadline)?,
            discover: parse_duration("discoverDeadline", &self.discover_deadline)?,
            subscribe: parse_duration("subscribeDeadline", &self.subscribe_deadline)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            adapter: 0,
            connect_deadline: humantime::format_duration(CONNECT_DEADLINE).to_string(),
            discover_deadline: humantime::format_duration(DISCOVER_DEADLINE).to_string(),
            subscribe_deadline: humantime::format_duration(SUBSCRIBE_DEADLINE).to_string(),
        }
    }
}
