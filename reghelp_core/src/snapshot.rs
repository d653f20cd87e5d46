use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{RegError, Result};
use crate::registry::{MemoryRegistry, RegValue, RootKey};

/// Registry contents captured for offline analysis.
#[derive(Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Snapshot {
    #[serde(default)]
    pub keys: Vec<SnapshotKey>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct SnapshotKey {
    pub root: RootKey,
    pub path: String,
    #[serde(default)]
    pub values: BTreeMap<String, RegValue>,
}

impl Snapshot {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let snapshot = Snapshot::new_from_string(&contents)?;

        info!("loaded registry snapshot with {} key(s)", snapshot.keys.len());

        Ok(snapshot)
    }

    pub fn new_from_string(contents: &str) -> Result<Self> {
        let snapshot: Snapshot = toml::from_str(contents).map_err(|e| RegError::Snapshot(e.to_string()))?;
        Ok(snapshot)
    }

    pub fn into_registry(self) -> MemoryRegistry {
        let mut registry = MemoryRegistry::new();
        for key in self.keys {
            registry.insert_key(key.root, &key.path);
            for (name, value) in key.values {
                registry.set_value(key.root, &key.path, &name, value);
            }
        }
        registry
    }
}

#[test]
fn snapshot_read() {
    let snapshot = Snapshot::new_from_string(include_str!("../test/snapshot.toml")).unwrap();
    assert_eq!(snapshot.keys[0].root, RootKey::LocalMachine);
    assert!(snapshot.keys[0].path.ends_with("ProfileList"));
    assert!(snapshot.keys[0].values.is_empty());

    let alice = snapshot
        .keys
        .iter()
        .find(|k| k.path.ends_with("S-1-5-21-1004336348-1177238915-682003330-1001"))
        .unwrap();
    assert_eq!(
        alice.values.get("ProfileImagePath"),
        Some(&RegValue::String("C:\\Users\\alice".to_string()))
    );
}

#[test]
fn snapshot_value_kinds() {
    let snapshot = Snapshot::new_from_string(
        r#"
[[keys]]
root = "HKEY_CURRENT_USER"
path = "Software\\Test"

[keys.values]
Name = "text"
Count = 3
MRUListEx = [1, 0, 0, 0, 255, 255, 255, 255]
"#,
    )
    .unwrap();

    let values = &snapshot.keys[0].values;
    assert_eq!(snapshot.keys[0].root, RootKey::CurrentUser);
    assert_eq!(values["Name"], RegValue::String("text".to_string()));
    assert_eq!(values["Count"], RegValue::Integer(3));
    assert_eq!(values["MRUListEx"], RegValue::Binary(vec![1, 0, 0, 0, 255, 255, 255, 255]));
}

#[test]
fn snapshot_rejects_unknown_root() {
    let err = Snapshot::new_from_string("[[keys]]\nroot = \"HKXX\"\npath = \"a\"\n").unwrap_err();
    assert!(matches!(err, RegError::Snapshot(_)));
}

#[test]
fn snapshot_write() {
    let mut values = BTreeMap::new();
    values.insert("USERNAME".to_string(), RegValue::String("alice".to_string()));
    let snapshot = Snapshot {
        keys: vec![SnapshotKey {
            root: RootKey::Users,
            path: "S-1-5-21-1-2-3-1001\\Volatile Environment".to_string(),
            values,
        }],
    };

    let text = toml::to_string(&snapshot).unwrap();
    assert_eq!(Snapshot::new_from_string(&text).unwrap(), snapshot);
}

#[test]
fn snapshot_from_file() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(include_bytes!("../test/snapshot.toml")).unwrap();

    let snapshot = Snapshot::new(file.path()).unwrap();
    assert!(!snapshot.keys.is_empty());
    assert!(Snapshot::new(file.path().with_extension("missing")).unwrap_err().is_not_found());
}
