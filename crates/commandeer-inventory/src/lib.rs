//! Device inventory: resolves device names to connection endpoints and
//! attributes, with filtering and grouping. Carries no execution logic.
//!
//! Two on-disk formats are supported:
//! - YAML: a `devices:` list of mappings (`name`, `address`, optional
//!   `model`/`site`/`role`)
//! - text: one device per line, `address[,name[,model[,site[,role]]]]`,
//!   `#` comments allowed

use commandeer_core::Device;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

mod error;

pub use error::InventoryError;

/// Device inventory keyed by device name. Names are unique.
#[derive(Debug, Default)]
pub struct Inventory {
    devices: BTreeMap<String, Device>,
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
struct DeviceEntry {
    name: String,
    address: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    site: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an inventory file, choosing the parser by extension
    /// (`.yaml`/`.yml` for YAML, anything else as text).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        let path = path.as_ref();
        let mut inventory = Self::new();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => inventory.load_yaml(path)?,
            _ => inventory.load_txt(path)?,
        }
        Ok(inventory)
    }

    /// Load devices from a YAML file with a top-level `devices:` list.
    pub fn load_yaml(&mut self, path: impl AsRef<Path>) -> Result<(), InventoryError> {
        let path = path.as_ref();
        let contents = read_file(path)?;
        let file: InventoryFile =
            serde_yaml::from_str(&contents).map_err(|e| InventoryError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        for entry in file.devices {
            let device = build_device(entry)?;
            self.add(device)?;
        }

        tracing::debug!(count = self.devices.len(), path = %path.display(), "loaded inventory");
        Ok(())
    }

    /// Load devices from a text file, one per line:
    /// `address[,name[,model[,site[,role]]]]`. Blank lines and `#` comments
    /// are skipped. A bare address doubles as the device name.
    pub fn load_txt(&mut self, path: impl AsRef<Path>) -> Result<(), InventoryError> {
        let path = path.as_ref();
        let contents = read_file(path)?;

        for (line_no, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(',').map(str::trim).collect();
            let address = parts[0].to_string();
            let name = parts
                .get(1)
                .filter(|s| !s.is_empty())
                .map_or_else(|| address.clone(), |s| s.to_string());

            let entry = DeviceEntry {
                name,
                address,
                model: field(&parts, 2),
                site: field(&parts, 3),
                role: field(&parts, 4),
            };

            let device = build_device(entry).map_err(|e| InventoryError::Line {
                path: path.to_path_buf(),
                line: line_no + 1,
                message: e.to_string(),
            })?;
            self.add(device).map_err(|e| InventoryError::Line {
                path: path.to_path_buf(),
                line: line_no + 1,
                message: e.to_string(),
            })?;
        }

        tracing::debug!(count = self.devices.len(), path = %path.display(), "loaded inventory");
        Ok(())
    }

    /// Add a single device. Duplicate names are rejected.
    pub fn add(&mut self, device: Device) -> Result<(), InventoryError> {
        if self.devices.contains_key(&device.name) {
            return Err(InventoryError::DuplicateName(device.name));
        }
        self.devices.insert(device.name.clone(), device);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Device, InventoryError> {
        self.devices
            .remove(name)
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.get(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// All devices in name order.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.values().cloned().collect()
    }

    /// Devices matching the filter, in name order.
    pub fn filter(&self, filter: &DeviceFilter) -> Result<Vec<Device>, InventoryError> {
        let name_re = filter
            .name_pattern
            .as_deref()
            .map(|p| Regex::new(&format!("(?i){p}")))
            .transpose()
            .map_err(|e| InventoryError::BadFilter(e.to_string()))?;

        Ok(self
            .devices
            .values()
            .filter(|d| {
                filter.model.as_deref().is_none_or(|m| d.model.as_deref() == Some(m))
                    && filter.site.as_deref().is_none_or(|s| d.site.as_deref() == Some(s))
                    && filter.role.as_deref().is_none_or(|r| d.role.as_deref() == Some(r))
                    && name_re.as_ref().is_none_or(|re| re.is_match(&d.name))
            })
            .cloned()
            .collect())
    }

    /// Distinct non-empty values of one attribute across the inventory.
    pub fn unique_values(&self, attribute: DeviceAttribute) -> Vec<String> {
        let mut values: Vec<String> = self
            .devices
            .values()
            .filter_map(|d| match attribute {
                DeviceAttribute::Model => d.model.clone(),
                DeviceAttribute::Site => d.site.clone(),
                DeviceAttribute::Role => d.role.clone(),
            })
            .collect();
        values.sort();
        values.dedup();
        values
    }
}

/// Attribute selector for [`Inventory::unique_values`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAttribute {
    Model,
    Site,
    Role,
}

/// Filter over device attributes. All populated fields must match.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub model: Option<String>,
    pub site: Option<String>,
    pub role: Option<String>,
    /// Case-insensitive regex matched against device names.
    pub name_pattern: Option<String>,
}

impl DeviceFilter {
    /// Parse a CLI-style filter expression: comma-separated `key=value`
    /// pairs with keys `model`, `site`, `role`, `name`.
    pub fn parse(expr: &str) -> Result<Self, InventoryError> {
        let mut filter = Self::default();
        for pair in expr.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| InventoryError::BadFilter(format!("expected key=value, got '{pair}'")))?;
            match key.trim() {
                "model" => filter.model = Some(value.trim().to_string()),
                "site" => filter.site = Some(value.trim().to_string()),
                "role" => filter.role = Some(value.trim().to_string()),
                "name" => filter.name_pattern = Some(value.trim().to_string()),
                other => {
                    return Err(InventoryError::BadFilter(format!(
                        "unknown filter key '{other}' (expected model/site/role/name)"
                    )));
                }
            }
        }
        Ok(filter)
    }
}

fn field(parts: &[&str], index: usize) -> Option<String> {
    parts
        .get(index)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn build_device(entry: DeviceEntry) -> Result<Device, InventoryError> {
    validate_address(&entry.address)?;
    Ok(Device {
        name: entry.name,
        address: entry.address,
        model: entry.model,
        site: entry.site,
        role: entry.role,
    })
}

/// Accept dotted-quad IPv4 addresses or plausible hostnames.
fn validate_address(address: &str) -> Result<(), InventoryError> {
    static IPV4: OnceLock<Regex> = OnceLock::new();
    static HOSTNAME: OnceLock<Regex> = OnceLock::new();

    let ipv4 = IPV4.get_or_init(|| {
        Regex::new(
            r"^(?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$",
        )
        .expect("static regex")
    });
    let hostname = HOSTNAME
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\.\-]*[A-Za-z0-9])?$").expect("static regex"));

    if ipv4.is_match(address) || hostname.is_match(address) {
        Ok(())
    } else {
        Err(InventoryError::BadAddress(address.to_string()))
    }
}

fn read_file(path: &Path) -> Result<String, InventoryError> {
    if !path.exists() {
        return Err(InventoryError::NotFoundFile(path.to_path_buf()));
    }
    fs::read_to_string(path).map_err(|e| InventoryError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str, ext: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_yaml_inventory() {
        let file = write_temp(
            "devices:\n  - name: sw1\n    address: 10.0.0.1\n    model: 2960X\n    site: hq\n  - name: sw2\n    address: 10.0.0.2\n    role: access\n",
            "yaml",
        );
        let inventory = Inventory::load(file.path()).unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.get("sw1").unwrap().model.as_deref(), Some("2960X"));
        assert_eq!(inventory.get("sw2").unwrap().role.as_deref(), Some("access"));
    }

    #[test]
    fn loads_txt_inventory_with_comments_and_bare_addresses() {
        let file = write_temp(
            "# core switches\n10.0.0.1,sw1,2960X,hq,core\n\n10.0.0.2\n",
            "txt",
        );
        let inventory = Inventory::load(file.path()).unwrap();
        assert_eq!(inventory.len(), 2);
        assert_eq!(inventory.get("sw1").unwrap().site.as_deref(), Some("hq"));
        // A bare address doubles as the name.
        assert!(inventory.get("10.0.0.2").is_some());
    }

    #[test]
    fn duplicate_names_are_rejected_with_line_number() {
        let file = write_temp("10.0.0.1,sw1\n10.0.0.2,sw1\n", "txt");
        let err = Inventory::load(file.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("line 2"), "got: {message}");
    }

    #[test]
    fn invalid_address_is_rejected() {
        let file = write_temp("999.999.1.1!,sw1\n", "txt");
        assert!(Inventory::load(file.path()).is_err());
    }

    #[test]
    fn filter_by_attributes_and_name_pattern() {
        let mut inventory = Inventory::new();
        for (name, model, site) in [
            ("core-sw1", "3850", "hq"),
            ("core-sw2", "3850", "branch"),
            ("access-sw1", "2960", "hq"),
        ] {
            let mut device = Device::new(name, "10.0.0.1");
            device.model = Some(model.to_string());
            device.site = Some(site.to_string());
            inventory.add(device).unwrap();
        }

        let by_model = inventory
            .filter(&DeviceFilter::parse("model=3850").unwrap())
            .unwrap();
        assert_eq!(by_model.len(), 2);

        let combined = inventory
            .filter(&DeviceFilter::parse("model=3850,site=hq").unwrap())
            .unwrap();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].name, "core-sw1");

        let by_name = inventory
            .filter(&DeviceFilter::parse("name=^CORE").unwrap())
            .unwrap();
        assert_eq!(by_name.len(), 2);
    }

    #[test]
    fn unknown_filter_key_is_rejected() {
        assert!(DeviceFilter::parse("vendor=cisco").is_err());
    }

    #[test]
    fn unique_values_are_sorted_and_deduplicated() {
        let mut inventory = Inventory::new();
        for (name, site) in [("a", "hq"), ("b", "branch"), ("c", "hq")] {
            let mut device = Device::new(name, "10.0.0.1");
            device.site = Some(site.to_string());
            inventory.add(device).unwrap();
        }
        assert_eq!(
            inventory.unique_values(DeviceAttribute::Site),
            vec!["branch".to_string(), "hq".to_string()]
        );
    }
}
