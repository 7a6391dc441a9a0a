use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// One of the two survey deployments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Wave {
    Baseline,
    Endline,
}

impl Wave {
    pub const ALL: [Wave; 2] = [Wave::Baseline, Wave::Endline];

    pub fn as_str(&self) -> &'static str {
        match self {
            Wave::Baseline => "baseline",
            Wave::Endline => "endline",
        }
    }

    /// Column prefix used in the combined report.
    pub fn prefix(&self) -> &'static str {
        match self {
            Wave::Baseline => "bl",
            Wave::Endline => "el",
        }
    }
}

impl fmt::Display for Wave {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Wave {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "baseline" | "bl" => Ok(Wave::Baseline),
            "endline" | "el" => Ok(Wave::Endline),
            other => Err(format!("unknown wave '{other}' (expected baseline or endline)")),
        }
    }
}

/// Review task category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pool {
    #[serde(rename = "avg")]
    Average,
    #[serde(rename = "app")]
    App,
}

impl Pool {
    pub const ALL: [Pool; 2] = [Pool::Average, Pool::App];

    pub fn prefix(&self) -> &'static str {
        match self {
            Pool::Average => "avg",
            Pool::App => "app",
        }
    }

    /// Screenshot path columns that make a candidate eligible for this pool.
    pub fn path_fields(&self) -> &'static [&'static str] {
        match self {
            Pool::Average => &["total_screenshot_path"],
            Pool::App => &[
                "app_screenshot1_path",
                "app_screenshot2_path",
                "app_screenshot3_path",
            ],
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Pool {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "avg" | "average" => Ok(Pool::Average),
            "app" | "app-level" => Ok(Pool::App),
            other => Err(format!("unknown pool '{other}' (expected avg or app)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Device {
    #[serde(rename = "iOS")]
    Ios,
    #[serde(rename = "Android")]
    Android,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Ios => "iOS",
            Device::Android => "Android",
            Device::Unknown => "unknown",
        }
    }

    /// Reads back a label this crate wrote. Anything else is `Unknown`.
    pub fn from_label(value: &str) -> Device {
        match value.trim() {
            "iOS" => Device::Ios,
            "Android" => Device::Android,
            _ => Device::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Device::Unknown
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Screen-time quantity reported as an (hours, minutes) pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Total,
    Instagram,
    Facebook,
    Tiktok,
    Twitter,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Total,
        Metric::Instagram,
        Metric::Facebook,
        Metric::Tiktok,
        Metric::Twitter,
    ];

    pub const APPS: [Metric; 4] = [
        Metric::Instagram,
        Metric::Facebook,
        Metric::Tiktok,
        Metric::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Total => "total",
            Metric::Instagram => "instagram",
            Metric::Facebook => "facebook",
            Metric::Tiktok => "tiktok",
            Metric::Twitter => "twitter",
        }
    }
}

/// Screenshot upload slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Total,
    App1,
    App2,
    App3,
}

impl Slot {
    pub const ALL: [Slot; 4] = [Slot::Total, Slot::App1, Slot::App2, Slot::App3];
    pub const APPS: [Slot; 3] = [Slot::App1, Slot::App2, Slot::App3];

    /// Stem shared by the `_file_id` and `_path` output columns.
    pub fn column_stem(&self) -> &'static str {
        match self {
            Slot::Total => "total_screenshot",
            Slot::App1 => "app_screenshot1",
            Slot::App2 => "app_screenshot2",
            Slot::App3 => "app_screenshot3",
        }
    }

    pub fn from_path_column(column: &str) -> Option<Slot> {
        Slot::ALL
            .into_iter()
            .find(|slot| column.strip_suffix("_path") == Some(slot.column_stem()))
    }
}
