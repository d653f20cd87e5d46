use reghelp_core::mru::{read_mru_entries, read_mru_list};
use reghelp_core::profile::{live_session_username, profile_username};
use reghelp_core::{
    list_user_sids, resolve_sid, resolve_username, sanitize, AccountClass, MemoryRegistry, RegValue, RootKey,
    Snapshot,
};

const ALICE: &str = "S-1-5-21-1004336348-1177238915-682003330-1001";
const BOB: &str = "S-1-5-21-1004336348-1177238915-682003330-1002";
const RECENT_DOCS: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs";

fn workstation() -> MemoryRegistry {
    Snapshot::new_from_string(include_str!("../test/snapshot.toml"))
        .unwrap()
        .into_registry()
}

#[test]
fn lists_only_user_profiles() {
    let registry = workstation();
    assert_eq!(list_user_sids(&registry).unwrap(), vec![ALICE, BOB]);
}

#[test]
fn resolves_names_to_sids() {
    let registry = workstation();
    assert_eq!(resolve_sid(&registry, "Alice").unwrap().as_deref(), Some(ALICE));
    assert_eq!(resolve_sid(&registry, "bob.contoso").unwrap().as_deref(), Some(BOB));
    assert_eq!(resolve_sid(&registry, "bob").unwrap(), None);
    assert_eq!(resolve_sid(&registry, "LocalService").unwrap().as_deref(), Some("S-1-5-19"));
}

#[test]
fn resolves_sids_to_names() {
    let registry = workstation();

    assert_eq!(
        resolve_username(&registry, ALICE).unwrap(),
        (AccountClass::NonSystem, Some("alice".to_string()))
    );
    assert_eq!(
        resolve_username(&registry, BOB).unwrap(),
        (AccountClass::System, Some("Bob.CONTOSO".to_string()))
    );
    assert_eq!(
        resolve_username(&registry, "S-1-5-18").unwrap(),
        (AccountClass::System, Some("systemprofile".to_string()))
    );
    assert_eq!(resolve_username(&registry, "S-1-5-21-1-2-3-500").unwrap(), (AccountClass::System, None));
}

#[test]
fn lookup_halves() {
    let registry = workstation();
    assert_eq!(live_session_username(&registry, BOB).unwrap(), None);
    assert_eq!(profile_username(&registry, ALICE).unwrap().as_deref(), Some("alice"));
}

#[test]
fn recent_docs_in_mru_order() {
    let registry = workstation();
    let path = format!("{}\\{}", ALICE, RECENT_DOCS);

    assert_eq!(read_mru_list(&registry, RootKey::Users, &path).unwrap(), Some(vec![2, 0, 1]));

    let names: Vec<String> = read_mru_entries(&registry, RootKey::Users, &path)
        .unwrap()
        .iter()
        .filter_map(|entry| match entry.value {
            RegValue::Binary(ref bytes) => Some(sanitize(bytes)),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["report.docx", "quarterly.xlsx", "notes.txt"]);
}

#[test]
fn missing_user_hive_has_no_recent_docs() {
    let registry = workstation();
    let path = format!("{}\\{}", BOB, RECENT_DOCS);
    assert!(read_mru_entries(&registry, RootKey::Users, &path).unwrap().is_empty());
}
