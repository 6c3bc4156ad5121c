use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed identifier for a submitted action, backed by ULID.
///
/// Returned from every enqueue so producers can correlate their submission
/// with the structured log lines emitted when the action is drained.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct ActionId(pub ulid::Ulid);

impl ActionId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ActionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(ActionId(id))
    }
}

impl Serialize for ActionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ActionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<ActionId>()
            .map_err(|_| serde::de::Error::custom("invalid action id"))
    }
}

/// Strongly typed identifier for a dispatcher instance, backed by ULID.
///
/// Used by the binding layer to tell duplicate instances apart during
/// culling and teardown.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct LoopId(pub ulid::Ulid);

impl LoopId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for LoopId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LoopId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LoopId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(LoopId(id))
    }
}

impl Serialize for LoopId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for LoopId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<LoopId>()
            .map_err(|_| serde::de::Error::custom("invalid loop id"))
    }
}
