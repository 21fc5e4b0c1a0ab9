//! Inbound command decoding and routing
//!
//! One inbound line is a JSON object keyed by target. The [`CONTROL_TARGET`]
//! addresses the recorder itself; any other key is a sensor short name. Each
//! inner key/value pair becomes one [`Command`]:
//!
//! ```json
//! {"CTRL": {"freq": 100, "run": true}, "OIS": {"amps": 40}}
//! ```
//!
//! Pairs are applied in the order they arrive on the line. A bad pair only
//! invalidates itself; the rest of the line is still applied.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use log::warn;
use serde::de::{self, Deserialize, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value as JsonValue;

use crate::config::{CONTROL_TARGET, NAME_CAPACITY};
use crate::error::{CommandError, LinkError};
use crate::sensors::{SensorExt, SensorRegistry};

/// Command addressed to the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// New target rate, applied right away
    Frequency(f32),
    /// Start (`true`) or stop (`false`) recording
    Run(bool),
    /// New persisted device name
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Control(ControlCommand),
    Sensor {
        target: String,
        key: String,
        value: JsonValue,
    },
}

/// Object members in arrival order.
///
/// `serde_json::Map` is a sorted `BTreeMap` without std, so inbound objects
/// are read through this instead.
struct Members<V>(Vec<(String, V)>);

/// Body of one target: an object of pairs, or anything else.
enum TargetBody {
    Pairs(Vec<(String, JsonValue)>),
    Invalid,
}

fn collect_members<'de, A, V>(mut map: A) -> Result<Vec<(String, V)>, A::Error>
where
    A: MapAccess<'de>,
    V: Deserialize<'de>,
{
    let mut members = Vec::new();
    while let Some(entry) = map.next_entry()? {
        members.push(entry);
    }
    Ok(members)
}

impl<'de> Deserialize<'de> for Members<TargetBody> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LineVisitor;

        impl<'de> Visitor<'de> for LineVisitor {
            type Value = Members<TargetBody>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object keyed by target")
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                collect_members(map).map(Members)
            }
        }

        deserializer.deserialize_map(LineVisitor)
    }
}

impl<'de> Deserialize<'de> for TargetBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BodyVisitor;

        impl<'de> Visitor<'de> for BodyVisitor {
            type Value = TargetBody;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                collect_members(map).map(TargetBody::Pairs)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(TargetBody::Invalid)
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
                Ok(TargetBody::Invalid)
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> Result<Self::Value, E> {
                Ok(TargetBody::Invalid)
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> Result<Self::Value, E> {
                Ok(TargetBody::Invalid)
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> Result<Self::Value, E> {
                Ok(TargetBody::Invalid)
            }

            fn visit_str<E: de::Error>(self, _: &str) -> Result<Self::Value, E> {
                Ok(TargetBody::Invalid)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(TargetBody::Invalid)
            }
        }

        deserializer.deserialize_any(BodyVisitor)
    }
}

/// Decode one inbound line.
///
/// The outer error rejects the whole line; inner errors reject single pairs.
pub fn parse_line(line: &str) -> Result<Vec<Result<Command, CommandError>>, LinkError> {
    let line = line.trim();
    let Members(targets) = serde_json::from_str::<Members<TargetBody>>(line).map_err(|_| {
        match serde_json::from_str::<IgnoredAny>(line) {
            Ok(_) => LinkError::NotAnObject,
            Err(_) => LinkError::Malformed,
        }
    })?;

    let mut commands = Vec::new();
    for (target, body) in targets {
        let TargetBody::Pairs(pairs) = body else {
            commands.push(Err(CommandError::InvalidValue(target)));
            continue;
        };
        if target == CONTROL_TARGET {
            commands.extend(pairs.iter().map(|(k, v)| parse_control(k, v).map(Command::Control)));
        } else {
            commands.extend(sensor_commands(&target, pairs));
        }
    }
    Ok(commands)
}

fn sensor_commands(
    target: &str,
    pairs: Vec<(String, JsonValue)>,
) -> impl Iterator<Item = Result<Command, CommandError>> + '_ {
    pairs.into_iter().map(move |(key, value)| {
        Ok(Command::Sensor {
            target: target.into(),
            key,
            value,
        })
    })
}

/// Decode one key/value pair addressed to [`CONTROL_TARGET`].
pub fn parse_control(key: &str, value: &JsonValue) -> Result<ControlCommand, CommandError> {
    let invalid = || CommandError::InvalidValue(key.into());
    match key {
        "freq" | "frequency" => {
            let hz = value.as_f64().ok_or_else(invalid)?;
            Ok(ControlCommand::Frequency(hz as f32))
        }
        "run" => value.as_bool().map(ControlCommand::Run).ok_or_else(invalid),
        "name" => {
            let name = value.as_str().ok_or_else(invalid)?;
            if name.len() > NAME_CAPACITY {
                return Err(CommandError::NameTooLong(NAME_CAPACITY));
            }
            Ok(ControlCommand::Name(name.into()))
        }
        _ => Err(CommandError::UnknownKey(key.into())),
    }
}

/// Forward a sensor command to the sensor with the matching short name.
pub fn route_to_sensor(
    registry: &mut SensorRegistry<'_>,
    target: &str,
    key: &str,
    value: &JsonValue,
) -> Result<(), CommandError> {
    let Some(sensor) = registry.find_mut(target) else {
        warn!("{} not found in sensor list", target);
        return Err(CommandError::UnknownSensor(target.into()));
    };
    sensor.handle_command(key, value)
}
