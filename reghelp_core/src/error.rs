use std::error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum RegError {
    NotFound(String),
    InvalidRoot(String),
    Io(io::Error),
    Snapshot(String),
}

pub type Result<T> = std::result::Result<T, RegError>;

impl RegError {
    pub fn is_not_found(&self) -> bool {
        matches!(*self, RegError::NotFound(_))
    }
}

impl fmt::Display for RegError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RegError::NotFound(ref what) => write!(f, "not found: {}", what),
            RegError::InvalidRoot(ref root) => write!(f, "unknown root key: {}", root),
            RegError::Io(ref err) => write!(f, "IO error: {}", err),
            RegError::Snapshot(ref msg) => write!(f, "invalid snapshot: {}", msg),
        }
    }
}

impl error::Error for RegError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            RegError::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for RegError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            RegError::NotFound(err.to_string())
        } else {
            RegError::Io(err)
        }
    }
}

/// Turns a `NotFound` failure into `Ok(None)`, passing every other error through.
pub fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RegError::NotFound(what)) => {
            trace!("recovered missing registry item ({})", what);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

#[test]
fn io_not_found_maps_to_not_found() {
    let err: RegError = io::Error::new(io::ErrorKind::NotFound, "missing key").into();
    assert!(err.is_not_found());

    let err: RegError = io::Error::new(io::ErrorKind::PermissionDenied, "access denied").into();
    assert!(!err.is_not_found());
    assert_eq!(err.to_string(), "IO error: access denied");
}

#[test]
fn found_recovers_only_not_found() {
    assert_eq!(found(Ok(3)).unwrap(), Some(3));
    assert_eq!(found::<u32>(Err(RegError::NotFound("x".to_string()))).unwrap(), None);

    let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
    assert!(found::<u32>(Err(RegError::Io(denied))).is_err());
}
