//! Display Settings
//!
//! Panel and touch configuration persisted under the `display` namespace.
//!
//! # Keys
//!
//! - `bright` - Backlight brightness (0-255, default 128)
//! - `timeout` - Backlight timeout in seconds (0 = never, default 30)
//! - `offset` - Vertical panel offset in pixels (default 0)
//! - `gamma` - Gamma correction (default 2.2)
//! - `inverted` - Invert colors (default false)
//! - `theme` - UI theme name (default "light")
//! - `touch_cal` - Touch calibration, 4 [`TouchPoint`] records

use crate::core::settings::{PersistenceStream, SettingsGroup};
use crate::platform::Result;
use nvs_settings_core::{Pod, Zeroable};

/// Number of touch calibration points (one per corner)
pub const TOUCH_POINTS: usize = 4;

/// One touch calibration sample
///
/// Stored as raw records, so the field layout is part of the stored format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TouchPoint {
    /// Raw controller X reading
    pub raw_x: u16,
    /// Raw controller Y reading
    pub raw_y: u16,
    /// Screen X coordinate the reading maps to
    pub screen_x: u16,
    /// Screen Y coordinate the reading maps to
    pub screen_y: u16,
}

impl TouchPoint {
    pub const fn new(raw_x: u16, raw_y: u16, screen_x: u16, screen_y: u16) -> Self {
        Self {
            raw_x,
            raw_y,
            screen_x,
            screen_y,
        }
    }
}

/// Uncalibrated 12-bit controller mapped onto a 320x240 panel
const DEFAULT_TOUCH_CAL: [TouchPoint; TOUCH_POINTS] = [
    TouchPoint::new(0, 0, 0, 0),
    TouchPoint::new(4095, 0, 319, 0),
    TouchPoint::new(0, 4095, 0, 239),
    TouchPoint::new(4095, 4095, 319, 239),
];

/// Display settings group
#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    /// Backlight brightness
    pub brightness: u8,
    /// Backlight timeout in seconds (0 = never)
    pub timeout_s: u16,
    /// Vertical panel offset in pixels
    pub offset: i16,
    /// Gamma correction
    pub gamma: f32,
    /// Invert colors
    pub inverted: bool,
    /// UI theme name
    pub theme: String,
    /// Touch calibration, one point per corner
    pub touch_cal: [TouchPoint; TOUCH_POINTS],
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            brightness: 128,
            timeout_s: 30,
            offset: 0,
            gamma: 2.2,
            inverted: false,
            theme: "light".into(),
            touch_cal: DEFAULT_TOUCH_CAL,
        }
    }
}

impl SettingsGroup for DisplaySettings {
    fn namespace(&self) -> &'static str {
        "display"
    }

    fn on_read(&mut self, stream: &PersistenceStream<'_>) {
        let defaults = Self::default();

        self.brightness = stream.get("bright", defaults.brightness);
        self.timeout_s = stream.get("timeout", defaults.timeout_s);
        self.offset = stream.get("offset", defaults.offset);
        self.gamma = stream.get("gamma", defaults.gamma);
        self.inverted = stream.get("inverted", defaults.inverted);
        self.theme = stream.get_string("theme", &defaults.theme);

        // Keep the whole table or none of it
        let mut cal = [TouchPoint::zeroed(); TOUCH_POINTS];
        self.touch_cal = if stream.get_object("touch_cal", &mut cal) {
            cal
        } else {
            defaults.touch_cal
        };
    }

    fn on_write(&self, stream: &PersistenceStream<'_>) -> Result<()> {
        stream.set("bright", self.brightness)?;
        stream.set("timeout", self.timeout_s)?;
        stream.set("offset", self.offset)?;
        stream.set("gamma", self.gamma)?;
        stream.set("inverted", self.inverted)?;
        stream.set_string("theme", &self.theme)?;
        stream.set_object("touch_cal", &self.touch_cal)
    }
}
