//! Wire messages exchanged with clients.
//!
//! Every message is a single JSON object. Clients send either a simulation
//! request or a `{"cmd": "server", "param": [...]}` command; the server
//! answers with messages tagged by `type`.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::BuildError;
use crate::result::{NestedArray, PortraitInfo};

pub type ClientId = u64;
pub type JobId = u64;


/// Triangle coordinates, either a flat array or the legacy map keyed by
/// decimal index strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coordinates {
    Flat(Vec<f64>),
    Keyed(BTreeMap<String, f64>),
}

impl Coordinates {
    /// Flattens into index order. Map keys must be exactly `0..n`.
    pub fn to_flat(&self) -> Result<Vec<f64>, BuildError> {
        match self {
            Coordinates::Flat(values) => Ok(values.clone()),
            Coordinates::Keyed(map) => {
                let mut indexed = map
                    .iter()
                    .map(|(key, value)| {
                        key.parse::<usize>()
                            .map(|i| (i, *value))
                            .map_err(|_| BuildError::MissingCoordinates)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                indexed.sort_unstable_by_key(|(i, _)| *i);
                if indexed.iter().enumerate().any(|(pos, (i, _))| pos != *i) {
                    return Err(BuildError::MissingCoordinates);
                }
                Ok(indexed.into_iter().map(|(_, v)| v).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A request to compute one portrait.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationRequest {
    pub data: Option<Coordinates>,
    pub visible_triangles: Option<Vec<bool>>,
    #[serde(deserialize_with = "integral")]
    pub freq_band: i64,
    #[serde(deserialize_with = "integral")]
    pub polar_radiation: i64,
    #[serde(deserialize_with = "integral")]
    pub polar_recive: i64,
    /// Elevation axis.
    pub type_angle: bool,
    /// Azimuth axis.
    pub type_azimut: bool,
    /// Range axis.
    pub type_length: bool,
    /// Ground plane.
    pub pplane: bool,
    pub direct_vector: Option<DirectVector>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    pub cmd: String,
    #[serde(default)]
    pub param: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCommand {
    Status,
    WhoConnect,
    Pause,
    Continue,
    Stop,
}

impl CommandMessage {
    pub fn server_command(&self) -> Result<ServerCommand, String> {
        if self.cmd != "server" {
            return Err(format!("unknown command target '{}'", self.cmd));
        }
        match self.param.first().map(String::as_str) {
            Some("status") => Ok(ServerCommand::Status),
            Some("whoconnect") => Ok(ServerCommand::WhoConnect),
            Some("pause") => Ok(ServerCommand::Pause),
            Some("continue") => Ok(ServerCommand::Continue),
            Some("stop") => Ok(ServerCommand::Stop),
            Some(other) => Err(format!("unknown server command '{}'", other)),
            None => Err("server command without parameter".to_string()),
        }
    }
}

/// Integer codes, also accepted as integral JSON floats such as `5.0`.
fn integral<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(D::Error::custom(format!("expected an integer, got {value}")));
    }
    Ok(value as i64)
}

/// Anything a client may send.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Command(CommandMessage),
    Simulation(Box<SimulationRequest>),
}

impl ClientMessage {
    /// Objects with a `cmd` key are commands, every other object is a
    /// simulation request.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(serde_json::Error::custom("expected a JSON object"));
        }
        if value.get("cmd").is_some() {
            serde_json::from_value(value).map(ClientMessage::Command)
        } else {
            serde_json::from_value(value)
                .map(|request| ClientMessage::Simulation(Box::new(request)))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Run,
    Work,
    Done,
}

/// The finished portrait as sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub id: JobId,
    pub content: String,
    pub dimension_type: i32,
    #[serde(rename = "absEout")]
    pub abs_eout: NestedArray,
    #[serde(rename = "normEout")]
    pub norm_eout: NestedArray,
    #[serde(rename = "info_absEout")]
    pub info_abs_eout: PortraitInfo,
    #[serde(rename = "info_normEout")]
    pub info_norm_eout: PortraitInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Answer {
        msg: String,
    },
    ProgressBar {
        id: JobId,
        status: ProgressStatus,
        content: f64,
    },
    Result(Box<ResultMessage>),
}

impl ServerMessage {
    pub fn answer(msg: impl Into<String>) -> Self {
        ServerMessage::Answer { msg: msg.into() }
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
