//! Keeps the receivers, their remotes and the last used device on disk, as
//! a RON file, so a quiz can be run against receivers registered earlier.

use crate::registry::Registry;
use crate::transport::DeviceDescriptor;

use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt, fs, io,
    path::{Path, PathBuf},
};

/// What the store file holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreData {
    /// Every registered receiver.
    pub registry: Registry,
    /// The hardware receiver used last.
    pub device: Option<DeviceDescriptor>,
}

#[derive(Debug)]
#[allow(missing_docs)]
pub enum StoreError {
    IoError(io::Error),
    RonError(ron::Error),
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use StoreError as SE;
        let msg = match self {
            SE::IoError(error) => Cow::from(format!("io error: {}", error)),
            SE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            SE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for StoreError {}

/// A [`StoreData`] tied to the file it came from.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    /// Changes are written by [`Store::save`].
    pub data: StoreData,
}

impl Store {
    /// Loads the store at `path`, or starts an empty one if there is no file
    /// yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(text) => ron::from_str(&text).map_err(StoreError::RonSpannedError)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No store at {}, starting empty", path.display());
                StoreData::default()
            }
            Err(e) => return Err(StoreError::IoError(e)),
        };
        Ok(Self { path, data })
    }

    /// The file this store is saved to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the store back, through a temporary file so a crash never
    /// leaves half a store behind.
    pub fn save(&self) -> Result<(), StoreError> {
        let text = ron::ser::to_string_pretty(&self.data, ron::ser::PrettyConfig::default())
            .map_err(StoreError::RonError)?;
        let tmp = self.path.with_extension("ron.tmp");
        fs::write(&tmp, text).map_err(StoreError::IoError)?;
        fs::rename(&tmp, &self.path).map_err(StoreError::IoError)?;
        debug!("Saved store to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistrationSession;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("store.ron")).unwrap();
        assert_eq!(store.data, StoreData::default());
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ron");

        let mut store = Store::open(&path).unwrap();
        let rid = store.data.registry.create_receiver("Lab").receiver_id.clone();
        let mut session = RegistrationSession::new();
        session.observe("T");
        session.observe("S1");
        store.data.registry.commit(&rid, &session).unwrap();
        store.data.device = Some(DeviceDescriptor {
            vendor_id: 0xB1B0,
            product_id: 0x5508,
            serial_number: Some("SN42".to_owned()),
            port: Some(PathBuf::from("/dev/ttyACM0")),
        });
        store.save().unwrap();

        let reloaded = Store::open(&path).unwrap();
        assert_eq!(reloaded.data, store.data);
        assert_eq!(reloaded.data.registry.current().unwrap().receiver_id, rid);
        assert!(!path.with_extension("ron.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.ron");
        fs::write(&path, "not ron at all (").unwrap();
        assert!(matches!(Store::open(&path), Err(StoreError::RonSpannedError(_))));
    }
}
