use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{info, warn};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::ledger::{Ledger, Transaction, TxKind};

pub const BALANCE_KEY: &str = "balance";
pub const TRANSACTIONS_KEY: &str = "transactions";

pub const STARTING_BALANCE: f64 = 0.000_001_00;

const EXPORT_SUFFIX_ALPHABET: &[char] = &[
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'j',
    'k', 'm', 'n', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// String key-value persistence, the only state that survives a restart.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// One file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(SimError::PersistenceRead {
                key: key.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        let write = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &target)
        };
        write().map_err(|source| SimError::PersistenceWrite {
            key: key.to_string(),
            source,
        })
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SimError::PersistenceWrite {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// The store the binary runs on. Falls back to memory when the data
/// directory is unusable, so the session still works without persistence.
#[derive(Debug)]
pub enum DataStore {
    File(FileStore),
    Memory(MemoryStore),
}

impl DataStore {
    pub fn open_or_memory(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match FileStore::open(dir.clone()) {
            Ok(store) => {
                info!("persisting to {}", store.dir().display());
                DataStore::File(store)
            }
            Err(err) => {
                warn!(
                    "data dir {} unusable ({err}); state will not survive a restart",
                    dir.display()
                );
                DataStore::Memory(MemoryStore::new())
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, DataStore::File(_))
    }
}

impl KeyValueStore for DataStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            DataStore::File(store) => store.get(key),
            DataStore::Memory(store) => store.get(key),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match self {
            DataStore::File(store) => store.set(key, value),
            DataStore::Memory(store) => store.set(key, value),
        }
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        match self {
            DataStore::File(store) => store.remove(key),
            DataStore::Memory(store) => store.remove(key),
        }
    }
}

pub fn seed_ledger() -> Ledger {
    let mut ledger = Ledger::default();
    if let Ok(tx) = Transaction::new("Welcome Bonus", STARTING_BALANCE, TxKind::Bonus) {
        ledger.push(tx);
    }
    ledger
}

/// Restores balance and ledger. Absent keys take the seed values; unreadable
/// ones are logged and take the seed values too.
pub fn load_state(store: &impl KeyValueStore) -> (f64, Ledger) {
    let balance = match read_balance(store) {
        Ok(Some(balance)) => balance,
        Ok(None) => STARTING_BALANCE,
        Err(err) => {
            warn!("{err}; using starting balance");
            STARTING_BALANCE
        }
    };
    let ledger = match read_ledger(store) {
        Ok(Some(ledger)) => ledger,
        Ok(None) => seed_ledger(),
        Err(err) => {
            warn!("{err}; reseeding ledger");
            seed_ledger()
        }
    };
    (balance, ledger)
}

fn read_balance(store: &impl KeyValueStore) -> Result<Option<f64>> {
    let Some(raw) = store.get(BALANCE_KEY)? else {
        return Ok(None);
    };
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|err: std::num::ParseFloatError| SimError::PersistenceRead {
            key: BALANCE_KEY.to_string(),
            reason: err.to_string(),
        })?;
    if !value.is_finite() || value < 0.0 {
        return Err(SimError::PersistenceRead {
            key: BALANCE_KEY.to_string(),
            reason: format!("{value} is not a valid balance"),
        });
    }
    Ok(Some(value))
}

fn read_ledger(store: &impl KeyValueStore) -> Result<Option<Ledger>> {
    let Some(raw) = store.get(TRANSACTIONS_KEY)? else {
        return Ok(None);
    };
    let entries: Vec<Transaction> =
        serde_json::from_str(&raw).map_err(|err| SimError::PersistenceRead {
            key: TRANSACTIONS_KEY.to_string(),
            reason: err.to_string(),
        })?;
    Ok(Some(Ledger::from_entries(entries)))
}

pub fn save_balance(store: &mut impl KeyValueStore, balance: f64) -> Result<()> {
    store.set(BALANCE_KEY, &balance.to_string())
}

pub fn save_ledger(store: &mut impl KeyValueStore, ledger: &Ledger) -> Result<()> {
    let json = serde_json::to_string(ledger.entries())?;
    store.set(TRANSACTIONS_KEY, &json)
}

pub fn clear(store: &mut impl KeyValueStore) -> Result<()> {
    store.remove(BALANCE_KEY)?;
    store.remove(TRANSACTIONS_KEY)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub balance: f64,
    pub transactions: Vec<Transaction>,
    pub export_date: DateTime<Utc>,
}

impl ExportDocument {
    pub fn new(balance: f64, ledger: &Ledger) -> Self {
        Self {
            balance,
            transactions: ledger.entries().to_vec(),
            export_date: Utc::now(),
        }
    }

    /// Writes the document as pretty JSON into `dir` and returns the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let name = format!(
            "mining-export-{}-{}.json",
            self.export_date.format("%Y%m%d-%H%M%S"),
            nanoid!(6, EXPORT_SUFFIX_ALPHABET)
        );
        let path = dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}
