//! Command lines accepted from the console.
//!
//! One JSON object per line:
//!
//! ```json
//! {"command": "setHomeTemperature", "roomNumber": 3, "value": 21.5}
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Setpoint commands a room accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    SetHomeTemperature,
    SetAwayTemperature,
    SetSleepTemperature,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::SetHomeTemperature => "setHomeTemperature",
            CommandKind::SetAwayTemperature => "setAwayTemperature",
            CommandKind::SetSleepTemperature => "setSleepTemperature",
        }
    }
}

impl FromStr for CommandKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "setHomeTemperature" => Ok(CommandKind::SetHomeTemperature),
            "setAwayTemperature" => Ok(CommandKind::SetAwayTemperature),
            "setSleepTemperature" => Ok(CommandKind::SetSleepTemperature),
            other => Err(BridgeError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed command line; the kind is checked when it is executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub command: String,
    pub room_number: u8,
    pub value: f64,
}

impl Command {
    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }

    pub fn kind(&self) -> Result<CommandKind> {
        self.command.parse()
    }
}
