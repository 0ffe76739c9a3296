//! Device enumeration and selection on top of cpal.

use crate::error::StartupError;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, DevicesError, Host};
use std::fmt;

/// One enumerated device, in driver order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

/// How the user picked a device on the command line or in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Default,
    Index(usize),
    Name(String),
}

impl DeviceSelector {
    /// `"default"` (or empty), a numeric index from `list`, or a device name.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            Self::Default
        } else if let Ok(index) = s.parse::<usize>() {
            Self::Index(index)
        } else {
            Self::Name(s.to_string())
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Index(index) => write!(f, "{}", index),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Exact name match wins over a case-insensitive substring match.
pub fn resolve<'a>(
    devices: &'a [DeviceDescriptor],
    selector: &DeviceSelector,
) -> Option<&'a DeviceDescriptor> {
    match selector {
        DeviceSelector::Default => devices.iter().find(|d| d.is_default),
        DeviceSelector::Index(index) => devices.get(*index),
        DeviceSelector::Name(name) => {
            let needle = name.to_lowercase();
            devices
                .iter()
                .find(|d| d.name == *name)
                .or_else(|| devices.iter().find(|d| d.name.to_lowercase().contains(&needle)))
        }
    }
}

fn describe(devices: &[Device], default_name: Option<&str>) -> Vec<DeviceDescriptor> {
    devices
        .iter()
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let is_default = default_name == Some(name.as_str());
            DeviceDescriptor {
                index,
                name,
                is_default,
            }
        })
        .collect()
}

fn pick(
    devices: Vec<Device>,
    default_name: Option<String>,
    selector: &DeviceSelector,
) -> Option<Device> {
    let descriptors = describe(&devices, default_name.as_deref());
    let index = resolve(&descriptors, selector)?.index;
    devices.into_iter().nth(index)
}

/// Enumeration failures belong to the audio subsystem, not to one device.
fn collect_devices<I>(
    devices: Result<I, DevicesError>,
    kind: &str,
) -> Result<Vec<Device>, StartupError>
where
    I: Iterator<Item = Device>,
{
    devices.map(Iterator::collect).map_err(|e| {
        StartupError::Host(anyhow!(e).context(format!("Failed to enumerate {} devices", kind)))
    })
}

pub fn input_devices(host: &Host) -> Result<Vec<DeviceDescriptor>, StartupError> {
    let devices = collect_devices(host.input_devices(), "input")?;
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    Ok(describe(&devices, default_name.as_deref()))
}

pub fn output_devices(host: &Host) -> Result<Vec<DeviceDescriptor>, StartupError> {
    let devices = collect_devices(host.output_devices(), "output")?;
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    Ok(describe(&devices, default_name.as_deref()))
}

pub fn find_input(host: &Host, selector: &DeviceSelector) -> Result<Device> {
    if *selector == DeviceSelector::Default {
        return host
            .default_input_device()
            .context("No default input device found");
    }
    let devices = collect_devices(host.input_devices(), "input")?;
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    pick(devices, default_name, selector)
        .with_context(|| format!("Input device '{}' not found", selector))
}

pub fn find_output(host: &Host, selector: &DeviceSelector) -> Result<Device> {
    if *selector == DeviceSelector::Default {
        return host
            .default_output_device()
            .context("No default output device found");
    }
    let devices = collect_devices(host.output_devices(), "output")?;
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    pick(devices, default_name, selector)
        .with_context(|| format!("Output device '{}' not found", selector))
}

/// Prints both device lists the way `duplexmic list` shows them.
pub fn print_devices(host: &Host) -> Result<(), StartupError> {
    print_section("Capture", &input_devices(host)?);
    print_section("Playback", &output_devices(host)?);
    Ok(())
}

fn print_section(kind: &str, devices: &[DeviceDescriptor]) {
    println!("\n=== {} Devices ===", kind);
    if devices.is_empty() {
        println!("  (none)");
    }
    for device in devices {
        if device.is_default {
            println!("[{}] {} (default)", device.index, device.name);
        } else {
            println!("[{}] {}", device.index, device.name);
        }
    }
}
