use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Platform battery sensor failure. Never fatal: the caller keeps its last value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("battery sensor unavailable: {0}")]
    Unavailable(String),
    #[error("battery reading {0} outside 0..=100")]
    OutOfRange(u32),
}

/// "Read current level" capability of the host platform.
pub trait BatterySensor: Send + Sync {
    fn name(&self) -> &str;

    /// Current charge in percent. Must return promptly.
    fn read_percent(&self) -> Result<u32, SensorError>;
}

/// Default power-supply class directory on Linux.
pub const SYSFS_POWER_SUPPLY: &str = "/sys/class/power_supply";

/// Reads `capacity` of the first power supply whose `type` is `Battery`.
/// Supplies are re-scanned on every read so a hot-plugged pack is picked up.
#[derive(Debug, Clone)]
pub struct SysfsBattery {
    root: PathBuf,
}

impl SysfsBattery {
    pub fn new() -> Self {
        Self::with_root(SYSFS_POWER_SUPPLY)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find_battery(&self) -> Result<PathBuf, SensorError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            SensorError::Unavailable(format!("{}: {e}", self.root.display()))
        })?;

        let mut supplies: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        supplies.sort();
        supplies
            .into_iter()
            .find(|dir| is_battery(dir))
            .ok_or_else(|| {
                SensorError::Unavailable(format!("no battery under {}", self.root.display()))
            })
    }
}

fn is_battery(dir: &Path) -> bool {
    fs::read_to_string(dir.join("type"))
        .map(|t| t.trim() == "Battery")
        .unwrap_or(false)
}

impl Default for SysfsBattery {
    fn default() -> Self {
        Self::new()
    }
}

impl BatterySensor for SysfsBattery {
    fn name(&self) -> &str {
        "sysfs"
    }

    fn read_percent(&self) -> Result<u32, SensorError> {
        let dir = self.find_battery()?;
        let raw = fs::read_to_string(dir.join("capacity"))
            .map_err(|e| SensorError::Unavailable(format!("{}: {e}", dir.display())))?;
        raw.trim()
            .parse::<u32>()
            .map_err(|_| SensorError::Unavailable(format!("unreadable capacity {:?}", raw.trim())))
    }
}

/// Mock sensor for testing. Starts unavailable until a reading is set.
#[derive(Debug, Default)]
pub struct MockSensor {
    reading: Mutex<Option<u32>>,
}

impl MockSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_percent(pct: u32) -> Self {
        Self { reading: Mutex::new(Some(pct)) }
    }

    pub fn set_percent(&self, pct: u32) {
        *self.reading.lock().unwrap_or_else(|p| p.into_inner()) = Some(pct);
    }

    /// Make subsequent reads fail.
    pub fn disconnect(&self) {
        *self.reading.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl BatterySensor for MockSensor {
    fn name(&self) -> &str {
        "mock"
    }

    fn read_percent(&self) -> Result<u32, SensorError> {
        let reading = *self.reading.lock().unwrap_or_else(|p| p.into_inner());
        reading.ok_or_else(|| SensorError::Unavailable("mock sensor disconnected".into()))
    }
}
