use std::fmt;

use crate::error::{found, Result};
use crate::registry::{Registry, RootKey};

pub const PROFILE_LIST: &str = "SOFTWARE\\Microsoft\\Windows NT\\CurrentVersion\\ProfileList";
pub const PROFILE_IMAGE_PATH: &str = "ProfileImagePath";
pub const VOLATILE_ENVIRONMENT: &str = "Volatile Environment";

/// Domain and local user accounts share this prefix; built-in service
/// accounts (S-1-5-18 and friends) do not.
pub const USER_SID_PREFIX: &str = "S-1-5-21";

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize)]
pub enum AccountClass {
    #[serde(rename = "System")]
    System,
    #[serde(rename = "Non-system")]
    NonSystem,
}

impl fmt::Display for AccountClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AccountClass::System => write!(f, "System"),
            AccountClass::NonSystem => write!(f, "Non-system"),
        }
    }
}

fn trailing_segment(path: &str) -> &str {
    match path.rfind('\\') {
        Some(index) => &path[index + 1..],
        None => path,
    }
}

/// Returns the SID of the profile whose image path ends in `user_name`.
pub fn resolve_sid<R: Registry>(registry: &R, user_name: &str) -> Result<Option<String>> {
    let profiles = match found(registry.open_key(RootKey::LocalMachine, PROFILE_LIST))? {
        Some(key) => key,
        None => return Ok(None),
    };

    let wanted = user_name.to_lowercase();
    for sid in registry.enumerate_subkeys(&profiles)? {
        let path = format!("{}\\{}", PROFILE_LIST, sid);
        let profile = match found(registry.open_key(RootKey::LocalMachine, &path))? {
            Some(key) => key,
            None => continue,
        };

        let image_path = match found(registry.read_value(&profile, PROFILE_IMAGE_PATH))? {
            Some(value) => value,
            None => {
                debug!("profile {} has no {}", sid, PROFILE_IMAGE_PATH);
                continue;
            }
        };

        if let Some(image_path) = image_path.as_str() {
            if trailing_segment(image_path).to_lowercase() == wanted {
                debug!("user {} resolved to {}", user_name, sid);
                return Ok(Some(sid));
            }
        }
    }

    Ok(None)
}

/// Lists the SIDs of non-system user profiles, in enumeration order.
pub fn list_user_sids<R: Registry>(registry: &R) -> Result<Vec<String>> {
    let profiles = match found(registry.open_key(RootKey::LocalMachine, PROFILE_LIST))? {
        Some(key) => key,
        None => return Ok(Vec::new()),
    };

    let sids = registry
        .enumerate_subkeys(&profiles)?
        .into_iter()
        .filter(|sid| sid.starts_with(USER_SID_PREFIX))
        .collect();

    Ok(sids)
}

/// Name of the user logged on with `sid`, from its volatile environment.
pub fn live_session_username<R: Registry>(registry: &R, sid: &str) -> Result<Option<String>> {
    let path = format!("{}\\{}", sid, VOLATILE_ENVIRONMENT);
    let key = match found(registry.open_key(RootKey::Users, &path))? {
        Some(key) => key,
        None => return Ok(None),
    };

    let value = found(registry.read_value(&key, "USERNAME"))?;
    Ok(value.and_then(|v| v.as_str().map(str::to_string)))
}

/// Name of the profile directory registered for `sid`.
pub fn profile_username<R: Registry>(registry: &R, sid: &str) -> Result<Option<String>> {
    let path = format!("{}\\{}", PROFILE_LIST, sid);
    let key = match found(registry.open_key(RootKey::LocalMachine, &path))? {
        Some(key) => key,
        None => return Ok(None),
    };

    let value = found(registry.read_value(&key, PROFILE_IMAGE_PATH))?;
    Ok(value.and_then(|v| v.as_str().map(|p| trailing_segment(p).to_string())))
}

/// Classifies `sid` and resolves its user name.
///
/// Accounts with a live session are non-system; anything else falls back to
/// the profile list and is reported as a system account, with no name when
/// neither lookup finds one.
pub fn resolve_username<R: Registry>(registry: &R, sid: &str) -> Result<(AccountClass, Option<String>)> {
    if let Some(name) = live_session_username(registry, sid)? {
        return Ok((AccountClass::NonSystem, Some(name)));
    }

    trace!("no live session for {}, falling back to the profile list", sid);
    Ok((AccountClass::System, profile_username(registry, sid)?))
}

#[cfg(test)]
use crate::registry::{MemoryRegistry, RegValue};

#[cfg(test)]
fn profiles() -> MemoryRegistry {
    let mut registry = MemoryRegistry::new();
    let mut profile = |sid: &str, image_path: &str| {
        registry.set_value(
            RootKey::LocalMachine,
            &format!("{}\\{}", PROFILE_LIST, sid),
            PROFILE_IMAGE_PATH,
            RegValue::String(image_path.to_string()),
        );
    };
    profile("S-1-5-18", "%systemroot%\\system32\\config\\systemprofile");
    profile("S-1-5-19", "C:\\Windows\\ServiceProfiles\\LocalService");
    profile("S-1-5-21-111-222-333-1001", "C:\\Users\\Alice");
    profile("S-1-5-21-111-222-333-1002", "C:\\Users\\bob");

    registry.set_value(
        RootKey::Users,
        "S-1-5-21-111-222-333-1001\\Volatile Environment",
        "USERNAME",
        RegValue::String("alice".to_string()),
    );
    registry
}

#[test]
fn resolve_sid_matches_case_insensitively() {
    let registry = profiles();
    assert_eq!(resolve_sid(&registry, "ALICE").unwrap().as_deref(), Some("S-1-5-21-111-222-333-1001"));
    assert_eq!(resolve_sid(&registry, "bob").unwrap().as_deref(), Some("S-1-5-21-111-222-333-1002"));
    assert_eq!(resolve_sid(&registry, "systemprofile").unwrap().as_deref(), Some("S-1-5-18"));
    assert_eq!(resolve_sid(&registry, "carol").unwrap(), None);
}

#[test]
fn resolve_sid_without_profile_list() {
    let registry = MemoryRegistry::new();
    assert_eq!(resolve_sid(&registry, "alice").unwrap(), None);
    assert!(list_user_sids(&registry).unwrap().is_empty());
}

#[test]
fn list_user_sids_excludes_system_accounts() {
    let registry = profiles();
    assert_eq!(
        list_user_sids(&registry).unwrap(),
        vec!["S-1-5-21-111-222-333-1001", "S-1-5-21-111-222-333-1002"]
    );
}

#[test]
fn resolve_username_prefers_live_session() {
    let registry = profiles();
    let (class, name) = resolve_username(&registry, "S-1-5-21-111-222-333-1001").unwrap();
    assert_eq!(class, AccountClass::NonSystem);
    assert_eq!(name.as_deref(), Some("alice"));
}

#[test]
fn resolve_username_falls_back_to_profile_list() {
    let registry = profiles();
    let (class, name) = resolve_username(&registry, "S-1-5-21-111-222-333-1002").unwrap();
    assert_eq!(class, AccountClass::System);
    assert_eq!(name.as_deref(), Some("bob"));

    let (class, name) = resolve_username(&registry, "S-1-5-19").unwrap();
    assert_eq!(class, AccountClass::System);
    assert_eq!(name.as_deref(), Some("LocalService"));
}

#[test]
fn resolve_username_unknown_sid() {
    let registry = profiles();
    assert_eq!(resolve_username(&registry, "S-1-5-21-9-9-9-500").unwrap(), (AccountClass::System, None));
}

#[test]
fn account_class_display() {
    assert_eq!(AccountClass::System.to_string(), "System");
    assert_eq!(AccountClass::NonSystem.to_string(), "Non-system");
}
