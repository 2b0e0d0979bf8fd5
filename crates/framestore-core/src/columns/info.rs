//! Per-axis annotations persisted with a table.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{InfoConflictSnafu, StoreResult};

/// Logical type of a non-index axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisType {
    /// Single-level labels.
    Index,
    /// Multi-level labels.
    MultiIndex,
}

/// Annotations recorded for one column or axis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisInfo {
    /// Frequency of a regular index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<String>,
    /// Timezone of timestamp values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
    /// Name of the index the column came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    /// Level names of a non-index axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<Option<String>>>,
    /// Logical type of a non-index axis.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<AxisType>,
}

/// Annotations keyed by column or axis name.
pub type InfoMap = BTreeMap<String, AxisInfo>;

/// Which annotation slot an update targets.
#[derive(Debug, Clone, Copy)]
pub(crate) enum InfoKey {
    Freq,
    Tz,
    IndexName,
}

impl InfoKey {
    fn name(self) -> &'static str {
        match self {
            InfoKey::Freq => "freq",
            InfoKey::Tz => "tz",
            InfoKey::IndexName => "index_name",
        }
    }

    fn slot(self, info: &mut AxisInfo) -> &mut Option<String> {
        match self {
            InfoKey::Freq => &mut info.freq,
            InfoKey::Tz => &mut info.tz,
            InfoKey::IndexName => &mut info.index_name,
        }
    }
}

/// Record `value` under `column`/`key`, returning the value the column keeps.
///
/// A conflicting frequency or index name is reset to unknown with a warning;
/// a conflicting timezone is an error.
pub(crate) fn update_info(
    info: &mut InfoMap,
    column: &str,
    key: InfoKey,
    value: Option<String>,
) -> StoreResult<Option<String>> {
    let entry = info.entry(column.to_string()).or_default();
    let slot = key.slot(entry);
    match (slot.clone(), value.as_ref()) {
        (Some(existing), Some(new)) if &existing != new => match key {
            InfoKey::Freq | InfoKey::IndexName => {
                warn!(
                    "the [{}] attribute of [{column}] cannot be set because it conflicts with the existing value [{existing}]; resetting it to None",
                    key.name()
                );
                *slot = None;
                Ok(None)
            }
            InfoKey::Tz => InfoConflictSnafu {
                column,
                key: key.name(),
                existing,
                new: new.clone(),
            }
            .fail(),
        },
        _ => {
            *slot = value.clone();
            Ok(value)
        }
    }
}
