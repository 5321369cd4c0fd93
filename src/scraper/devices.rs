//! Built-in device emulation presets.

use crate::config::Viewport;
use crate::error::ScrapeError;
use super::page::ContextOptions;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePreset {
    pub name: &'static str,
    pub viewport: Viewport,
    pub user_agent: &'static str,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
}

impl DevicePreset {
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            viewport: Some(self.viewport),
            user_agent: Some(self.user_agent.to_string()),
            device_scale_factor: Some(self.device_scale_factor),
            is_mobile: self.is_mobile,
            has_touch: self.has_touch,
        }
    }
}

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 14_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1";
const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 14_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.3 Mobile/15E148 Safari/604.1";
const PIXEL_UA: &str = "Mozilla/5.0 (Linux; Android 11; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/90.0.4430.91 Mobile Safari/537.36";
const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const DEVICES: &[DevicePreset] = &[
    DevicePreset {
        name: "iPhone 12",
        viewport: Viewport { width: 390, height: 844 },
        user_agent: IPHONE_UA,
        device_scale_factor: 3.0,
        is_mobile: true,
        has_touch: true,
    },
    DevicePreset {
        name: "iPhone SE",
        viewport: Viewport { width: 375, height: 667 },
        user_agent: IPHONE_UA,
        device_scale_factor: 2.0,
        is_mobile: true,
        has_touch: true,
    },
    DevicePreset {
        name: "Pixel 5",
        viewport: Viewport { width: 393, height: 851 },
        user_agent: PIXEL_UA,
        device_scale_factor: 2.75,
        is_mobile: true,
        has_touch: true,
    },
    DevicePreset {
        name: "iPad Pro 11",
        viewport: Viewport { width: 834, height: 1194 },
        user_agent: IPAD_UA,
        device_scale_factor: 2.0,
        is_mobile: true,
        has_touch: true,
    },
    DevicePreset {
        name: "Desktop 1080p",
        viewport: Viewport { width: 1920, height: 1080 },
        user_agent: DESKTOP_UA,
        device_scale_factor: 1.0,
        is_mobile: false,
        has_touch: false,
    },
];

/// Case-insensitive preset lookup
pub fn find_device(name: &str) -> Result<&'static DevicePreset, ScrapeError> {
    let wanted = name.trim();
    DEVICES
        .iter()
        .find(|device| device.name.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| {
            let known: Vec<&str> = DEVICES.iter().map(|d| d.name).collect();
            ScrapeError::config(format!("unknown device '{}' (known: {})", name, known.join(", ")))
        })
}

/// Context options for an optional device and an optional explicit viewport.
/// The explicit viewport wins over the device's.
pub fn context_options(device: Option<&str>, viewport: Option<Viewport>) -> Result<ContextOptions, ScrapeError> {
    let mut options = match device {
        Some(name) => find_device(name)?.context_options(),
        None => ContextOptions::default(),
    };
    if viewport.is_some() {
        options.viewport = viewport;
    }
    Ok(options)
}
