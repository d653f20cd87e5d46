#[macro_use]
extern crate prettytable;

use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use env_logger::{Builder, Env};
use log::{debug, error};
use prettytable::Table;

use reghelp_core::mru::read_mru_entries;
use reghelp_core::time::format_timestamp;
use reghelp_core::{decode_mru, decode_mru_strict, list_user_sids, resolve_sid, resolve_username, sanitize};
use reghelp_core::{Registry, RootKey, Snapshot};

#[derive(Debug, Parser)]
#[command(name = "reghelp", author, version, about = "windows registry forensic helpers")]
struct Cli {
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count, help = "Sets the level of verbosity")]
    verbose: u8,

    #[arg(short = 's', long = "snapshot", global = true, help = "read registry keys from a TOML snapshot instead of the live registry")]
    snapshot: Option<String>,

    #[arg(long = "json", global = true, action = ArgAction::SetTrue, help = "print results as JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "strip characters that are not allowed in file names")]
    Sanitize {
        input: String,
        #[arg(long = "hex", action = ArgAction::SetTrue, help = "treat [input] as hex-encoded bytes")]
        hex: bool,
    },

    #[command(about = "decode a hex-encoded MRUListEx value")]
    Mru {
        data: String,
        #[arg(long = "strict", action = ArgAction::SetTrue, help = "read little-endian indices up to the terminator")]
        strict: bool,
    },

    #[command(about = "convert a Windows FILETIME to UTC")]
    Timestamp { ticks: u64 },

    #[command(flatten)]
    Lookup(Lookup),
}

/// Subcommands that read from a registry.
#[derive(Debug, Subcommand)]
enum Lookup {
    #[command(name = "mru-key", about = "list the entries of a registry key's MRUListEx, most recent first")]
    MruKey { root: String, path: String },

    #[command(about = "list non-system user SIDs with their names")]
    Users,

    #[command(about = "find the SID of [user]")]
    Sid { user: String },

    #[command(about = "find the user name of [sid]")]
    Username { sid: String },
}

fn parse_hex(text: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", text).into());
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for i in (0..digits.len()).step_by(2) {
        let pair = digits.get(i..i + 2).ok_or_else(|| format!("invalid hex in '{}'", text))?;
        bytes.push(u8::from_str_radix(pair, 16)?);
    }
    Ok(bytes)
}

fn print_list<W: Write>(out: &mut W, values: &[String], json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(values)?)?;
    } else {
        for value in values {
            writeln!(out, "{}", value)?;
        }
    }
    Ok(())
}

fn print_optional<W: Write>(out: &mut W, value: Option<&str>, json: bool) -> Result<(), Box<dyn Error>> {
    if json {
        writeln!(out, "{}", serde_json::to_string(&value)?)?;
    } else {
        writeln!(out, "{}", value.unwrap_or("(unknown)"))?;
    }
    Ok(())
}

fn users<R: Registry, W: Write>(registry: &R, out: &mut W, json: bool) -> Result<(), Box<dyn Error>> {
    let mut rows = Vec::new();
    for sid in list_user_sids(registry)? {
        let (class, name) = resolve_username(registry, &sid)?;
        rows.push((sid, class, name));
    }

    if json {
        let users: Vec<_> = rows
            .iter()
            .map(|(sid, class, name)| serde_json::json!({ "sid": sid, "class": class, "name": name }))
            .collect();
        writeln!(out, "{}", serde_json::to_string_pretty(&users)?)?;
        return Ok(());
    }

    let mut table = Table::new();
    table.set_titles(row!["SID", "Class", "Name"]);
    for (sid, class, name) in &rows {
        table.add_row(row![sid, class, name.as_deref().unwrap_or("")]);
    }
    table.print(out)?;
    Ok(())
}

fn mru_key<R: Registry, W: Write>(registry: &R, out: &mut W, root: &str, path: &str, json: bool) -> Result<(), Box<dyn Error>> {
    let root: RootKey = root.parse()?;
    let entries = read_mru_entries(registry, root, path)?;
    debug!("{} mru entries under {}\\{}", entries.len(), root, path);

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    let mut table = Table::new();
    table.set_titles(row!["Slot", "Name"]);
    for entry in &entries {
        let name = match entry.value.as_bytes() {
            Some(bytes) => sanitize(bytes),
            None => entry.value.to_string(),
        };
        table.add_row(row![entry.index, name]);
    }
    table.print(out)?;
    Ok(())
}

fn run_lookup<R: Registry, W: Write>(registry: &R, out: &mut W, lookup: &Lookup, json: bool) -> Result<(), Box<dyn Error>> {
    match lookup {
        Lookup::Users => users(registry, out, json),
        Lookup::Sid { user } => print_optional(out, resolve_sid(registry, user)?.as_deref(), json),
        Lookup::Username { sid } => {
            let (class, name) = resolve_username(registry, sid)?;
            if json {
                writeln!(out, "{}", serde_json::json!({ "class": class, "name": name }))?;
            } else {
                writeln!(out, "{} ({})", name.as_deref().unwrap_or("(unknown)"), class)?;
            }
            Ok(())
        }
        Lookup::MruKey { root, path } => mru_key(registry, out, root, path, json),
    }
}

#[cfg(windows)]
fn run_live<W: Write>(out: &mut W, lookup: &Lookup, json: bool) -> Result<(), Box<dyn Error>> {
    run_lookup(&reghelp_core::WinRegistry, out, lookup, json)
}

#[cfg(not(windows))]
fn run_live<W: Write>(_out: &mut W, _lookup: &Lookup, _json: bool) -> Result<(), Box<dyn Error>> {
    Err("the live registry is only available on Windows, use --snapshot".into())
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<(), Box<dyn Error>> {
    match &cli.command {
        Commands::Sanitize { input, hex } => {
            let bytes = if *hex { parse_hex(input)? } else { input.as_bytes().to_vec() };
            print_optional(out, Some(sanitize(&bytes).as_str()), cli.json)
        }
        Commands::Mru { data, strict } => {
            let bytes = parse_hex(data)?;
            let indices = if *strict { decode_mru_strict(&bytes) } else { decode_mru(&bytes) };
            print_list(out, &indices.iter().map(u32::to_string).collect::<Vec<_>>(), cli.json)
        }
        Commands::Timestamp { ticks } => print_optional(out, Some(format_timestamp(*ticks).as_str()), cli.json),
        Commands::Lookup(lookup) => match &cli.snapshot {
            Some(path) => run_lookup(&Snapshot::new(path)?.into_registry(), out, lookup, cli.json),
            None => run_live(out, lookup, cli.json),
        },
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let min_log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let mut builder = Builder::from_env(Env::default().default_filter_or(min_log_level));
    builder.init();

    let stdout = io::stdout();
    match run(&cli, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("an unexpected error occured ({})", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::NamedTempFile;

    const ALICE: &str = "S-1-5-21-1004336348-1177238915-682003330-1001";
    const BOB: &str = "S-1-5-21-1004336348-1177238915-682003330-1002";

    fn snapshot_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(include_bytes!("../../reghelp_core/test/snapshot.toml")).unwrap();
        file
    }

    fn run_args(args: &[&str]) -> Result<String, Box<dyn Error>> {
        let cli = Cli::parse_from(args.iter().copied());
        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn run_on_snapshot(file: &NamedTempFile, args: &[&str]) -> String {
        let path = file.path().to_str().unwrap();
        let mut full = vec!["reghelp", "--snapshot", path];
        full.extend_from_slice(args);
        run_args(&full).unwrap()
    }

    #[test]
    fn parse_mru_strict() {
        let cli = Cli::parse_from(["reghelp", "--json", "mru", "--strict", "0100000002000000ffffffff"]);

        assert!(cli.json);
        match cli.command {
            Commands::Mru { data, strict } => {
                assert_eq!(data, "0100000002000000ffffffff");
                assert!(strict);
            }
            _ => panic!("expected mru command"),
        }
    }

    #[test]
    fn parse_username_with_snapshot() {
        let cli = Cli::parse_from(["reghelp", "username", "S-1-5-21-1-2-3-1001", "--snapshot", "host.toml", "-vv"]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.snapshot.as_deref(), Some("host.toml"));
        match cli.command {
            Commands::Lookup(Lookup::Username { sid }) => assert_eq!(sid, "S-1-5-21-1-2-3-1001"),
            _ => panic!("expected username command"),
        }
    }

    #[test]
    fn parse_mru_key() {
        let cli = Cli::parse_from(["reghelp", "mru-key", "HKCU", "Software\\RecentDocs"]);

        match cli.command {
            Commands::Lookup(Lookup::MruKey { root, path }) => {
                assert_eq!(root, "HKCU");
                assert_eq!(path, "Software\\RecentDocs");
            }
            _ => panic!("expected mru-key command"),
        }
    }

    #[test]
    fn parse_hex_bytes() {
        assert_eq!(parse_hex("01ff 2A").unwrap(), vec![0x01, 0xff, 0x2a]);
        assert_eq!(parse_hex("01,00,00,00").unwrap(), vec![1, 0, 0, 0]);
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn standalone_commands_need_no_registry() {
        assert_eq!(run_args(&["reghelp", "timestamp", "0"]).unwrap(), "Mon Jan  1 00:00:00 1601 UTC\n");
        assert_eq!(run_args(&["reghelp", "sanitize", "a:b*c"]).unwrap(), "abc\n");
        assert_eq!(run_args(&["reghelp", "sanitize", "--hex", "41004200"]).unwrap(), "AB\n");
        assert_eq!(run_args(&["reghelp", "mru", "0102030405060708"]).unwrap(), "10\n");
        assert_eq!(run_args(&["reghelp", "mru", "--strict", "0200000001000000ffffffff"]).unwrap(), "2\n1\n");
        assert_eq!(run_args(&["reghelp", "--json", "mru", "010203"]).unwrap(), "[]\n");
    }

    #[test]
    fn users_from_snapshot() {
        let file = snapshot_file();

        let table = run_on_snapshot(&file, &["users"]);
        assert!(table.contains(ALICE));
        assert!(table.contains("Non-system"));
        assert!(table.contains("Bob.CONTOSO"));
        assert!(!table.contains("S-1-5-18"));

        let json: serde_json::Value = serde_json::from_str(&run_on_snapshot(&file, &["--json", "users"])).unwrap();
        assert_eq!(json[0]["sid"], ALICE);
        assert_eq!(json[0]["class"], "Non-system");
        assert_eq!(json[0]["name"], "alice");
        assert_eq!(json[1]["sid"], BOB);
        assert_eq!(json[1]["class"], "System");
    }

    #[test]
    fn sid_and_username_from_snapshot() {
        let file = snapshot_file();

        assert_eq!(run_on_snapshot(&file, &["sid", "ALICE"]), format!("{}\n", ALICE));
        assert_eq!(run_on_snapshot(&file, &["sid", "nobody"]), "(unknown)\n");
        assert_eq!(run_on_snapshot(&file, &["--json", "sid", "nobody"]), "null\n");

        assert_eq!(run_on_snapshot(&file, &["username", ALICE]), "alice (Non-system)\n");
        assert_eq!(run_on_snapshot(&file, &["username", "S-1-5-21-1-2-3-500"]), "(unknown) (System)\n");

        let json: serde_json::Value = serde_json::from_str(&run_on_snapshot(&file, &["--json", "username", BOB])).unwrap();
        assert_eq!(json["class"], "System");
        assert_eq!(json["name"], "Bob.CONTOSO");
    }

    #[test]
    fn mru_key_from_snapshot() {
        let file = snapshot_file();
        let path = format!("{}\\Software\\Microsoft\\Windows\\CurrentVersion\\Explorer\\RecentDocs", ALICE);

        let table = run_on_snapshot(&file, &["mru-key", "HKU", &path]);
        let report = table.find("report.docx").unwrap();
        let notes = table.find("notes.txt").unwrap();
        assert!(report < notes);

        let json: serde_json::Value = serde_json::from_str(&run_on_snapshot(&file, &["--json", "mru-key", "HKU", &path])).unwrap();
        let slots: Vec<u64> = json.as_array().unwrap().iter().map(|e| e["index"].as_u64().unwrap()).collect();
        assert_eq!(slots, vec![2, 0, 1]);
    }

    #[test]
    fn mru_key_rejects_unknown_root() {
        let file = snapshot_file();
        let path = file.path().to_str().unwrap();
        let err = run_args(&["reghelp", "--snapshot", path, "mru-key", "HKXX", "Software"]).unwrap_err();
        assert_eq!(err.to_string(), "unknown root key: HKXX");
    }

    #[cfg(not(windows))]
    #[test]
    fn lookups_without_snapshot_need_windows() {
        let err = run_args(&["reghelp", "users"]).unwrap_err();
        assert!(err.to_string().contains("--snapshot"));
    }
}
