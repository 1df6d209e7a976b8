//! Caller-facing scan configuration.
//!
//! Every optional field left as `None` means "leave the device alone".
//! Negotiation writes the values the source actually applied back into the
//! record, so after a scan it describes what was used.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::{
    Fix32, FlipRotation, Frame, Orientation, PageSize, PixelType, TransferMechanism, Units,
};

/// Transfer count meaning "every page the source has".
pub const TRANSFER_ALL_PAGES: i16 = -1;

/// Colour mode requested for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColourMode {
    /// Keep whatever the source is set to.
    #[default]
    Default,
    BlackAndWhite,
    GreyScale,
    Colour,
}

impl ColourMode {
    pub fn pixel_type(&self) -> Option<PixelType> {
        match self {
            ColourMode::Default => None,
            ColourMode::BlackAndWhite => Some(PixelType::BlackAndWhite),
            ColourMode::GreyScale => Some(PixelType::Grey),
            ColourMode::Colour => Some(PixelType::Rgb),
        }
    }

    pub fn bit_depth(&self) -> Option<u16> {
        match self {
            ColourMode::Default => None,
            ColourMode::BlackAndWhite => Some(1),
            ColourMode::GreyScale => Some(8),
            ColourMode::Colour => Some(24),
        }
    }

    pub fn from_pixel_type(pixel_type: PixelType) -> Self {
        match pixel_type {
            PixelType::BlackAndWhite => ColourMode::BlackAndWhite,
            PixelType::Grey => ColourMode::GreyScale,
            PixelType::Rgb => ColourMode::Colour,
            _ => ColourMode::Default,
        }
    }
}

/// Transfer mechanisms this crate can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferMode {
    #[default]
    Native,
    Memory,
}

impl TransferMode {
    pub fn mechanism(&self) -> TransferMechanism {
        match self {
            TransferMode::Native => TransferMechanism::Native,
            TransferMode::Memory => TransferMechanism::Memory,
        }
    }

    pub fn from_mechanism(mechanism: TransferMechanism) -> Option<Self> {
        match mechanism {
            TransferMechanism::Native => Some(TransferMode::Native),
            TransferMechanism::Memory => Some(TransferMode::Memory),
            _ => None,
        }
    }
}

/// Area of interest, in the source's current units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AreaSettings {
    pub top: f32,
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
}

impl AreaSettings {
    pub fn new(top: f32, left: f32, bottom: f32, right: f32) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn to_frame(&self) -> Frame {
        Frame {
            left: Fix32::from_f32(self.left),
            top: Fix32::from_f32(self.top),
            right: Fix32::from_f32(self.right),
            bottom: Fix32::from_f32(self.bottom),
        }
    }

    pub fn from_frame(frame: &Frame) -> Self {
        Self::new(
            frame.top.to_f32(),
            frame.left.to_f32(),
            frame.bottom.to_f32(),
            frame.right.to_f32(),
        )
    }
}

/// Scan configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Ask the source to show its own dialog.
    pub show_driver_ui: bool,
    /// Progress indicator while scanning (`CAP_INDICATORS`).
    pub show_progress_ui: Option<bool>,
    pub use_document_feeder: Option<bool>,
    pub use_auto_feeder: Option<bool>,
    pub use_auto_scan_cache: Option<bool>,
    /// Fail with `FeederEmpty` when the feeder reports no paper.
    pub abort_when_no_paper_detectable: bool,
    /// Pages to transfer; `TRANSFER_ALL_PAGES` for all.
    pub transfer_count: Option<i16>,
    pub use_duplex: Option<bool>,
    pub data_transfer_mode: Option<TransferMode>,
    pub units: Option<Units>,
    pub dpi: Option<f32>,
    pub colour_mode: ColourMode,
    pub page_size: Option<PageSize>,
    pub orientation: Option<Orientation>,
    pub automatic_rotate: Option<bool>,
    pub automatic_deskew: Option<bool>,
    pub automatic_border_detection: Option<bool>,
    pub flip_rotation: Option<FlipRotation>,
    /// Keep the source enabled after a transfer batch (errors still close it).
    pub keep_open: bool,
    /// Log every supported capability while opening.
    pub debug_capabilities: bool,
    /// Applied only when units negotiation succeeds.
    pub area: Option<AreaSettings>,
}

impl ScanSettings {
    /// Whether every page should be transferred.
    pub fn transfers_all_pages(&self) -> bool {
        self.transfer_count == Some(TRANSFER_ALL_PAGES)
    }

    pub fn set_transfer_all_pages(&mut self, all: bool) {
        self.transfer_count = Some(if all { TRANSFER_ALL_PAGES } else { 1 });
    }

    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: ScanSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colour_mode_mapping() {
        assert_eq!(ColourMode::Colour.pixel_type(), Some(PixelType::Rgb));
        assert_eq!(ColourMode::GreyScale.bit_depth(), Some(8));
        assert_eq!(ColourMode::Default.bit_depth(), None);
        assert_eq!(ColourMode::from_pixel_type(PixelType::Grey), ColourMode::GreyScale);
        assert_eq!(ColourMode::from_pixel_type(PixelType::Cmyk), ColourMode::Default);
    }

    #[test]
    fn test_area_frame_conversion() {
        let area = AreaSettings::new(0.5, 0.25, 11.0, 8.5);
        let frame = area.to_frame();
        assert_eq!(frame.left, Fix32::from_f32(0.25));
        assert_eq!(frame.bottom, Fix32::from_f32(11.0));
        assert_eq!(AreaSettings::from_frame(&frame), area);
    }

    #[test]
    fn test_transfer_all_pages() {
        let mut settings = ScanSettings::default();
        assert!(!settings.transfers_all_pages());
        settings.set_transfer_all_pages(true);
        assert_eq!(settings.transfer_count, Some(-1));
        settings.set_transfer_all_pages(false);
        assert_eq!(settings.transfer_count, Some(1));
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let settings = ScanSettings {
            dpi: Some(300.0),
            colour_mode: ColourMode::GreyScale,
            units: Some(Units::Centimeters),
            data_transfer_mode: Some(TransferMode::Memory),
            area: Some(AreaSettings::new(0.0, 0.0, 10.0, 8.0)),
            transfer_count: Some(TRANSFER_ALL_PAGES),
            ..Default::default()
        };

        let path = std::env::temp_dir().join(format!("twain-settings-{}.toml", std::process::id()));
        settings.save_to_file(&path).unwrap();
        let loaded = ScanSettings::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: ScanSettings = toml::from_str(
            r#"
            dpi = 150.0
            colour_mode = "Colour"
            use_duplex = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.dpi, Some(150.0));
        assert_eq!(settings.colour_mode, ColourMode::Colour);
        assert_eq!(settings.use_duplex, Some(true));
        assert_eq!(settings.units, None);
        assert!(!settings.show_driver_ui);
    }
}
