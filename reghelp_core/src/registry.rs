use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{RegError, Result};

/// Predefined registry hives a lookup can start from.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone, Serialize, Deserialize)]
pub enum RootKey {
    #[serde(rename = "HKLM", alias = "HKEY_LOCAL_MACHINE")]
    LocalMachine,
    #[serde(rename = "HKU", alias = "HKEY_USERS")]
    Users,
    #[serde(rename = "HKCU", alias = "HKEY_CURRENT_USER")]
    CurrentUser,
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            RootKey::LocalMachine => "HKLM",
            RootKey::Users => "HKU",
            RootKey::CurrentUser => "HKCU",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for RootKey {
    type Err = RegError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Ok(RootKey::LocalMachine),
            "HKU" | "HKEY_USERS" => Ok(RootKey::Users),
            "HKCU" | "HKEY_CURRENT_USER" => Ok(RootKey::CurrentUser),
            _ => Err(RegError::InvalidRoot(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegValue {
    String(String),
    Integer(u64),
    Binary(Vec<u8>),
}

impl RegValue {
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            RegValue::String(ref s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            RegValue::Binary(ref bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }
}

impl fmt::Display for RegValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RegValue::String(ref s) => write!(f, "{}", s),
            RegValue::Integer(n) => write!(f, "{}", n),
            RegValue::Binary(ref bytes) => {
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Read access to a registry.
///
/// A `Key` is a scoped handle: it is released when dropped, so lookups hold
/// it only for the duration of a single call.
pub trait Registry {
    type Key;
    fn open_key(&self, root: RootKey, path: &str) -> Result<Self::Key>;
    fn enumerate_subkeys(&self, key: &Self::Key) -> Result<Vec<String>>;
    fn read_value(&self, key: &Self::Key, name: &str) -> Result<RegValue>;
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('\\').filter(|s| !s.is_empty())
}

/// Lowercased path with empty segments dropped, so `A\\B\` and `a\b` name the same key.
fn normalize_path(path: &str) -> String {
    path_segments(path)
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("\\")
}

#[derive(Debug, Default)]
struct MemoryKey {
    name: String,
    values: BTreeMap<String, RegValue>,
}

/// Case-insensitive registry tree held in memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    keys: BTreeMap<(RootKey, String), MemoryKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryKeyHandle {
    root: RootKey,
    path: String,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry::default()
    }

    /// Creates `path` under `root` along with every missing ancestor.
    pub fn insert_key(&mut self, root: RootKey, path: &str) {
        let mut normalized = String::new();
        for segment in path_segments(path) {
            if !normalized.is_empty() {
                normalized.push('\\');
            }
            normalized.push_str(&segment.to_lowercase());
            self.keys
                .entry((root, normalized.clone()))
                .or_insert_with(|| MemoryKey {
                    name: segment.to_string(),
                    values: BTreeMap::new(),
                });
        }
    }

    pub fn set_value(&mut self, root: RootKey, path: &str, name: &str, value: RegValue) {
        self.insert_key(root, path);
        self.keys
            .entry((root, normalize_path(path)))
            .or_default()
            .values
            .insert(name.to_lowercase(), value);
    }
}

impl Registry for MemoryRegistry {
    type Key = MemoryKeyHandle;

    fn open_key(&self, root: RootKey, path: &str) -> Result<MemoryKeyHandle> {
        let path = normalize_path(path);
        if path.is_empty() || self.keys.contains_key(&(root, path.clone())) {
            Ok(MemoryKeyHandle { root, path })
        } else {
            Err(RegError::NotFound(format!("{}\\{}", root, path)))
        }
    }

    fn enumerate_subkeys(&self, key: &MemoryKeyHandle) -> Result<Vec<String>> {
        let prefix = if key.path.is_empty() {
            String::new()
        } else {
            format!("{}\\", key.path)
        };

        let subkeys = self
            .keys
            .iter()
            .filter(|((root, path), _)| {
                *root == key.root
                    && !path.is_empty()
                    && path.starts_with(&prefix)
                    && !path[prefix.len()..].contains('\\')
            })
            .map(|(_, child)| child.name.clone())
            .collect();

        Ok(subkeys)
    }

    fn read_value(&self, key: &MemoryKeyHandle, name: &str) -> Result<RegValue> {
        self.keys
            .get(&(key.root, key.path.clone()))
            .and_then(|k| k.values.get(&name.to_lowercase()))
            .cloned()
            .ok_or_else(|| RegError::NotFound(format!("{}\\{} value {}", key.root, key.path, name)))
    }
}

/// The live registry of the running system.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct WinRegistry;

#[cfg(windows)]
impl Registry for WinRegistry {
    type Key = winreg::RegKey;

    fn open_key(&self, root: RootKey, path: &str) -> Result<winreg::RegKey> {
        use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_READ};

        let hkey = match root {
            RootKey::LocalMachine => HKEY_LOCAL_MACHINE,
            RootKey::Users => HKEY_USERS,
            RootKey::CurrentUser => HKEY_CURRENT_USER,
        };
        let key = winreg::RegKey::predef(hkey).open_subkey_with_flags(path, KEY_READ)?;
        Ok(key)
    }

    fn enumerate_subkeys(&self, key: &winreg::RegKey) -> Result<Vec<String>> {
        let names = key.enum_keys().collect::<std::io::Result<Vec<String>>>()?;
        Ok(names)
    }

    fn read_value(&self, key: &winreg::RegKey, name: &str) -> Result<RegValue> {
        use winreg::enums::RegType;

        let raw = key.get_raw_value(name)?;
        let value = match raw.vtype {
            RegType::REG_SZ | RegType::REG_EXPAND_SZ => RegValue::String(key.get_value::<String, _>(name)?),
            RegType::REG_DWORD => RegValue::Integer(u64::from(key.get_value::<u32, _>(name)?)),
            RegType::REG_QWORD => RegValue::Integer(key.get_value::<u64, _>(name)?),
            _ => RegValue::Binary(raw.bytes),
        };
        Ok(value)
    }
}

#[cfg(test)]
fn sample_registry() -> MemoryRegistry {
    let mut registry = MemoryRegistry::new();
    registry.insert_key(RootKey::LocalMachine, "SOFTWARE\\Vendor\\App");
    registry.insert_key(RootKey::LocalMachine, "SOFTWARE\\Other");
    registry.set_value(
        RootKey::LocalMachine,
        "SOFTWARE\\Vendor\\App",
        "InstallDir",
        RegValue::String("C:\\App".to_string()),
    );
    registry
}

#[test]
fn memory_registry_open_is_case_insensitive() {
    let registry = sample_registry();
    assert!(registry.open_key(RootKey::LocalMachine, "software\\VENDOR\\app").is_ok());
    assert!(registry.open_key(RootKey::LocalMachine, "SOFTWARE\\Vendor").is_ok());
    assert!(registry.open_key(RootKey::Users, "SOFTWARE\\Vendor").unwrap_err().is_not_found());
}

#[test]
fn memory_registry_enumerates_direct_children() {
    let registry = sample_registry();
    let key = registry.open_key(RootKey::LocalMachine, "SOFTWARE").unwrap();
    assert_eq!(registry.enumerate_subkeys(&key).unwrap(), vec!["Other", "Vendor"]);

    let root = registry.open_key(RootKey::LocalMachine, "").unwrap();
    assert_eq!(registry.enumerate_subkeys(&root).unwrap(), vec!["SOFTWARE"]);
}

#[test]
fn memory_registry_reads_values() {
    let registry = sample_registry();
    let key = registry.open_key(RootKey::LocalMachine, "SOFTWARE\\Vendor\\App").unwrap();
    let value = registry.read_value(&key, "installdir").unwrap();
    assert_eq!(value.as_str(), Some("C:\\App"));
    assert!(registry.read_value(&key, "Missing").unwrap_err().is_not_found());
}

#[test]
fn root_key_from_str() {
    assert_eq!("hklm".parse::<RootKey>().unwrap(), RootKey::LocalMachine);
    assert_eq!("HKEY_USERS".parse::<RootKey>().unwrap(), RootKey::Users);
    let err = "HKXX".parse::<RootKey>().unwrap_err();
    assert!(matches!(err, RegError::InvalidRoot(ref root) if root == "HKXX"));
    assert!(!err.is_not_found());
}

#[test]
fn memory_registry_ignores_doubled_separators() {
    let mut registry = MemoryRegistry::new();
    registry.set_value(
        RootKey::LocalMachine,
        "SOFTWARE\\\\Vendor\\",
        "Version",
        RegValue::Integer(7),
    );

    let key = registry.open_key(RootKey::LocalMachine, "software\\vendor").unwrap();
    assert_eq!(registry.read_value(&key, "Version").unwrap(), RegValue::Integer(7));

    let key = registry.open_key(RootKey::LocalMachine, "\\SOFTWARE\\\\Vendor").unwrap();
    assert_eq!(registry.read_value(&key, "version").unwrap(), RegValue::Integer(7));

    let software = registry.open_key(RootKey::LocalMachine, "SOFTWARE").unwrap();
    assert_eq!(registry.enumerate_subkeys(&software).unwrap(), vec!["Vendor"]);
}

#[test]
fn reg_value_display() {
    assert_eq!(RegValue::Binary(vec![0x01, 0xff]).to_string(), "01ff");
    assert_eq!(RegValue::Integer(42).to_string(), "42");
}
