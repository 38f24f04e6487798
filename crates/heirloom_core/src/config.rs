/*
    Heirloom

    Copyright 2025-2026 The Heirloom Developers

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    config.rs

    Machine configuration and the providers of disk and ROM images.

*/

//! A machine is described by a TOML document deserialized into [MachineConfig]. Every section
//! is optional; a missing device table leaves the device enabled with its default update
//! interval. Image paths in the configuration are resolved through an [ImageProvider], so the
//! emulator never touches the filesystem directly.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use fxhash::FxHashMap;
use serde::{self, Deserializer};
use serde_derive::Deserialize;

use crate::{
    devices::{fdc::CarrierType, rtc::BootDevice},
    error::ConfigError,
    module::ModuleType,
};

/// Default system BIOS offset, 0xF0000.
pub const DEFAULT_BIOS_OFFSET: u32 = 983040;
/// Default video BIOS offset, 0xC0000.
pub const DEFAULT_VIDEO_BIOS_OFFSET: u32 = 786432;

const fn _default_true() -> bool {
    true
}

const fn _default_cpu_bits() -> u8 {
    16
}

const fn _default_speed_mhz() -> u32 {
    crate::devices::clock::DEFAULT_CPU_SPEED_MHZ
}

const fn _default_iteration_us() -> u32 {
    crate::devices::clock::DEFAULT_ITERATION_US
}

fn _default_boot_order() -> Vec<BootDevice> {
    vec![BootDevice::Floppy, BootDevice::HardDisk, BootDevice::None]
}

impl<'de> serde::Deserialize<'de> for CarrierType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CarrierVisitor;

        impl serde::de::Visitor<'_> for CarrierVisitor {
            type Value = CarrierType;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("`160K`, `180K`, `320K`, `360K`, `720K`, `1.2M`, `1.44M` or `2.88M`")
            }

            fn visit_str<E>(self, value: &str) -> Result<CarrierType, E>
            where
                E: serde::de::Error,
            {
                CarrierType::from_str(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(CarrierVisitor)
    }
}

/// A DOS drive letter, stored as its index from A.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DriveLetter(pub usize);

impl FromStr for DriveLetter {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String> {
        let trimmed = s.trim().trim_end_matches(':');
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok(DriveLetter((c.to_ascii_uppercase() as u8 - b'A') as usize)),
            _ => Err(format!("invalid drive letter: {}", s)),
        }
    }
}

impl<'de> serde::Deserialize<'de> for DriveLetter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DriveVisitor;

        impl serde::de::Visitor<'_> for DriveVisitor {
            type Value = DriveLetter;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a drive letter such as `A` or `C:`")
            }

            fn visit_str<E>(self, value: &str) -> Result<DriveLetter, E>
            where
                E: serde::de::Error,
            {
                DriveLetter::from_str(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(DriveVisitor)
    }
}

/// Boot devices are written as drive letters (`A` for floppy, `C` for hard disk) or by name.
impl<'de> serde::Deserialize<'de> for BootDevice {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BootVisitor;

        impl serde::de::Visitor<'_> for BootVisitor {
            type Value = BootDevice;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("`A`, `C`, `floppy`, `harddisk`, `cdrom` or `none`")
            }

            fn visit_str<E>(self, value: &str) -> Result<BootDevice, E>
            where
                E: serde::de::Error,
            {
                match value.to_lowercase().as_str() {
                    "floppy" | "a" | "a:" => Ok(BootDevice::Floppy),
                    "harddisk" | "hdd" | "c" | "c:" => Ok(BootDevice::HardDisk),
                    "cdrom" => Ok(BootDevice::CdRom),
                    "none" => Ok(BootDevice::None),
                    _ => Err(E::custom(format!("invalid boot device: {}", value))),
                }
            }
        }

        deserializer.deserialize_str(BootVisitor)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmulatorConfig {
    /// Sleep when virtual time runs ahead of host time.
    #[serde(default = "_default_true")]
    pub throttle: bool,
    #[serde(default = "_default_iteration_us")]
    pub iteration_us: u32,
    #[serde(default)]
    pub debug_motherboard: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            throttle: true,
            iteration_us: _default_iteration_us(),
            debug_motherboard: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CpuConfig {
    #[serde(default = "_default_cpu_bits")]
    pub bits: u8,
    #[serde(default = "_default_speed_mhz")]
    pub speed_mhz: u32,
    #[serde(default)]
    pub debug: bool,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            bits: _default_cpu_bits(),
            speed_mhz: _default_speed_mhz(),
            debug: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MemoryConfig {
    /// Memory above the first megabyte.
    #[serde(default)]
    pub extended_kb: u32,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RomConfig {
    pub path: String,
    /// Load address, written in decimal.
    pub offset: u32,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct BiosConfig {
    pub system: Option<RomConfig>,
    pub video: Option<RomConfig>,
}

/// Settings shared by every bus-attached device.
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "_default_true")]
    pub enabled: bool,
    /// Microseconds between updates. Zero or negative selects the device default.
    #[serde(default)]
    pub update_interval: i64,
    #[serde(default)]
    pub debug: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            update_interval: 0,
            debug: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct FloppyConfig {
    pub drive: DriveLetter,
    /// The drive mechanism, which sets the CMOS drive type.
    #[serde(rename = "type")]
    pub drive_type: CarrierType,
    /// Image to insert at startup.
    pub image: Option<String>,
    /// Media format of the image. Guessed from its size when absent.
    pub format: Option<CarrierType>,
    #[serde(default)]
    pub write_protected: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FdcConfig {
    #[serde(flatten)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub floppy: Vec<FloppyConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HardDiskConfig {
    #[serde(default)]
    pub channel: usize,
    #[serde(default)]
    pub drive: usize,
    pub image: String,
    pub cylinders: Option<u16>,
    pub heads: Option<u8>,
    pub sectors_per_track: Option<u8>,
}

impl HardDiskConfig {
    /// The configured geometry, if all three values are present.
    pub fn geometry(&self) -> Option<(u16, u8, u8)> {
        Some((self.cylinders?, self.heads?, self.sectors_per_track?))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AtaConfig {
    #[serde(flatten)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub harddisk: Vec<HardDiskConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BootConfig {
    #[serde(default = "_default_boot_order")]
    pub order: Vec<BootDevice>,
    #[serde(default = "_default_true")]
    pub check_floppy_signature: bool,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            order: _default_boot_order(),
            check_floppy_signature: true,
        }
    }
}

impl BootConfig {
    /// The boot order as the three CMOS slots, padded with [BootDevice::None].
    pub fn slots(&self) -> [BootDevice; 3] {
        let mut slots = [BootDevice::None; 3];
        for (slot, device) in slots.iter_mut().zip(self.order.iter()) {
            *slot = *device;
        }
        slots
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub cpu: CpuConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub bios: BiosConfig,
    #[serde(default)]
    pub pic: DeviceConfig,
    #[serde(default)]
    pub pit: DeviceConfig,
    #[serde(default)]
    pub rtc: DeviceConfig,
    #[serde(default)]
    pub keyboard: DeviceConfig,
    #[serde(default)]
    pub mouse: DeviceConfig,
    #[serde(default)]
    pub serial: DeviceConfig,
    #[serde(default)]
    pub parallel: DeviceConfig,
    #[serde(default)]
    pub video: DeviceConfig,
    #[serde(default)]
    pub screen: DeviceConfig,
    #[serde(default)]
    pub fdc: FdcConfig,
    #[serde(default)]
    pub ata: AtaConfig,
    #[serde(default)]
    pub boot: BootConfig,
}

impl MachineConfig {
    pub fn from_toml(toml_string: impl AsRef<str>) -> Result<Self, ConfigError> {
        let config: MachineConfig = toml::from_str(toml_string.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_string = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(toml_string)
    }

    /// Reject values the machine can't be built with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cpu.bits != 16 && self.cpu.bits != 32 {
            return Err(ConfigError::Invalid(format!("CPU width must be 16 or 32, not {}", self.cpu.bits)));
        }
        for floppy in &self.fdc.floppy {
            if floppy.drive.0 > 1 {
                return Err(ConfigError::Invalid(format!(
                    "floppy drives are A: and B:, not drive index {}",
                    floppy.drive.0
                )));
            }
        }
        for disk in &self.ata.harddisk {
            if disk.channel > 1 || disk.drive > 1 {
                return Err(ConfigError::Invalid(format!(
                    "no hard disk slot at channel {} drive {}",
                    disk.channel, disk.drive
                )));
            }
        }
        if self.boot.order.len() > 3 {
            return Err(ConfigError::Invalid(String::from("at most three boot devices may be listed")));
        }
        Ok(())
    }

    /// Per-device settings for a module type, None for modules without a device table.
    pub fn device(&self, kind: ModuleType) -> Option<&DeviceConfig> {
        match kind {
            ModuleType::Pic => Some(&self.pic),
            ModuleType::Pit => Some(&self.pit),
            ModuleType::Rtc => Some(&self.rtc),
            ModuleType::Keyboard => Some(&self.keyboard),
            ModuleType::Mouse => Some(&self.mouse),
            ModuleType::Serial => Some(&self.serial),
            ModuleType::Parallel => Some(&self.parallel),
            ModuleType::Video => Some(&self.video),
            ModuleType::Screen => Some(&self.screen),
            ModuleType::Fdc => Some(&self.fdc.device),
            ModuleType::Ata => Some(&self.ata.device),
            ModuleType::Clock | ModuleType::Memory | ModuleType::Cpu | ModuleType::Motherboard => None,
        }
    }

    /// Devices without a table are always present.
    pub fn enabled(&self, kind: ModuleType) -> bool {
        self.device(kind).map(|d| d.enabled).unwrap_or(true)
    }

    pub fn debug(&self, kind: ModuleType) -> bool {
        match kind {
            ModuleType::Cpu => self.cpu.debug,
            ModuleType::Memory => self.memory.debug,
            ModuleType::Motherboard => self.emulator.debug_motherboard,
            ModuleType::Clock => false,
            _ => self.device(kind).map(|d| d.debug).unwrap_or(false),
        }
    }
}

/// Source of the opaque byte images named in a configuration.
pub trait ImageProvider {
    fn read_image(&self, path: &str) -> Result<Vec<u8>, ConfigError>;
}

/// Reads images from the filesystem, relative to an optional base directory.
#[derive(Clone, Debug, Default)]
pub struct FileImageProvider {
    base: Option<PathBuf>,
}

impl FileImageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: Some(base.into()) }
    }
}

impl ImageProvider for FileImageProvider {
    fn read_image(&self, path: &str) -> Result<Vec<u8>, ConfigError> {
        let full_path = match &self.base {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        };
        std::fs::read(&full_path).map_err(|source| ConfigError::Io {
            path: full_path.display().to_string(),
            source,
        })
    }
}

/// Serves images from memory, keyed by the path used in the configuration.
#[derive(Clone, Debug, Default)]
pub struct MemoryImageProvider {
    images: FxHashMap<String, Vec<u8>>,
}

impl MemoryImageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, image: Vec<u8>) {
        self.images.insert(path.into(), image);
    }

    pub fn with_image(mut self, path: impl Into<String>, image: Vec<u8>) -> Self {
        self.insert(path, image);
        self
    }
}

impl ImageProvider for MemoryImageProvider {
    fn read_image(&self, path: &str) -> Result<Vec<u8>, ConfigError> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| ConfigError::MissingImage(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MACHINE_TOML: &str = r#"
        [emulator]
        throttle = false
        iteration_us = 500

        [cpu]
        bits = 32
        speed_mhz = 25

        [memory]
        extended_kb = 3072

        [bios.system]
        path = "bios.bin"
        offset = 983040

        [mouse]
        enabled = false

        [video]
        update_interval = 20000
        debug = true

        [[fdc.floppy]]
        drive = "A:"
        type = "1.44M"
        image = "dos.img"
        format = "720K"

        [[ata.harddisk]]
        image = "c.img"
        cylinders = 306
        heads = 4
        sectors_per_track = 17

        [boot]
        order = ["C", "A"]
    "#;

    #[test]
    fn test_parse_machine() {
        let config = MachineConfig::from_toml(MACHINE_TOML).expect("valid config");
        assert!(!config.emulator.throttle);
        assert_eq!(config.cpu.bits, 32);
        assert_eq!(config.memory.extended_kb, 3072);
        assert_eq!(config.bios.system.as_ref().map(|r| r.offset), Some(DEFAULT_BIOS_OFFSET));
        assert!(config.bios.video.is_none());

        assert!(!config.enabled(ModuleType::Mouse));
        assert!(config.enabled(ModuleType::Keyboard));
        assert!(config.debug(ModuleType::Video));
        assert_eq!(config.video.update_interval, 20000);
        assert_eq!(config.pit.update_interval, 0);

        let floppy = &config.fdc.floppy[0];
        assert_eq!(floppy.drive, DriveLetter(0));
        assert_eq!(floppy.drive_type, CarrierType::Floppy1440K);
        assert_eq!(floppy.format, Some(CarrierType::Floppy720K));
        assert!(config.fdc.device.enabled);

        assert_eq!(config.ata.harddisk[0].geometry(), Some((306, 4, 17)));
        assert_eq!(
            config.boot.slots(),
            [BootDevice::HardDisk, BootDevice::Floppy, BootDevice::None]
        );
    }

    #[test]
    fn test_empty_config_defaults() {
        let config = MachineConfig::from_toml("").expect("empty config");
        assert_eq!(config.cpu.bits, 16);
        assert_eq!(config.emulator.iteration_us, 1000);
        assert!(config.enabled(ModuleType::Video));
        assert!(config.fdc.floppy.is_empty());
        assert_eq!(config.boot.slots()[0], BootDevice::Floppy);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            MachineConfig::from_toml("[cpu]\nbits = 8\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MachineConfig::from_toml("[[fdc.floppy]]\ndrive = \"C\"\ntype = \"360K\"\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            MachineConfig::from_toml("[[fdc.floppy]]\ndrive = \"A\"\ntype = \"1.7M\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_drive_letters() {
        assert_eq!(DriveLetter::from_str("b"), Ok(DriveLetter(1)));
        assert_eq!(DriveLetter::from_str("C:"), Ok(DriveLetter(2)));
        assert!(DriveLetter::from_str("AB").is_err());
        assert!(DriveLetter::from_str("1").is_err());
    }

    #[test]
    fn test_memory_provider() {
        let provider = MemoryImageProvider::new().with_image("bios.bin", vec![0xEA; 16]);
        assert_eq!(provider.read_image("bios.bin").map(|i| i.len()).ok(), Some(16));
        assert!(matches!(provider.read_image("missing.bin"), Err(ConfigError::MissingImage(_))));
    }
}
