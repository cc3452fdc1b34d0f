//! Per-user settings needed by the ledger: where the master file lives and
//! which surname goes into report file names.

use crate::error::Result;
use crate::schema::LedgerConfig;
use crate::workbook::write_atomically;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub type UserId = i64;

/// Lookup the engine needs from whatever stores users.
pub trait LedgerRegistry {
    fn master_path(&self, user_id: UserId) -> Result<Option<PathBuf>>;
    fn surname(&self, user_id: UserId) -> Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub second_name: Option<String>,
    #[serde(default)]
    pub master_filename: Option<String>,
}

impl UserRecord {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            second_name: None,
            master_filename: None,
        }
    }
}

/// `finance_report_<surname>.xlsx`, spaces turned into underscores, `user`
/// when no surname is known.
pub fn report_filename(config: &LedgerConfig, surname: Option<&str>) -> String {
    let name = surname.map(str::trim).unwrap_or_default().replace(' ', "_");
    let name = if name.is_empty() { "user".to_string() } else { name };
    format!("{}{}.xlsx", config.report_file_prefix, name)
}

/// Users stored one JSON object per line. Every write rewrites the file.
pub struct JsonLinesRegistry {
    path: PathBuf,
}

impl JsonLinesRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<UserRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        let mut users = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<UserRecord>(line) {
                Ok(user) => users.push(user),
                Err(err) => warn!(
                    "Skipping malformed line {} of {}: {}",
                    idx + 1,
                    self.path.display(),
                    err
                ),
            }
        }
        Ok(users)
    }

    fn write_all(&self, users: &[UserRecord]) -> Result<()> {
        let mut out = String::new();
        for user in users {
            out.push_str(&serde_json::to_string(user)?);
            out.push('\n');
        }
        write_atomically(&self.path, out.as_bytes())
    }

    pub fn load_user(&self, user_id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.read_all()?.into_iter().find(|u| u.user_id == user_id))
    }

    pub fn upsert(&self, record: UserRecord) -> Result<UserRecord> {
        let mut users = self.read_all()?;
        match users.iter_mut().find(|u| u.user_id == record.user_id) {
            Some(existing) => *existing = record.clone(),
            None => users.push(record.clone()),
        }
        self.write_all(&users)?;
        Ok(record)
    }

    /// Returns the stored record, or stores `candidate` if the id is new.
    pub fn get_or_create(&self, candidate: UserRecord) -> Result<UserRecord> {
        match self.load_user(candidate.user_id)? {
            Some(existing) => Ok(existing),
            None => self.upsert(candidate),
        }
    }

    pub fn set_second_name(&self, user_id: UserId, second_name: &str) -> Result<UserRecord> {
        self.update(user_id, |user| user.second_name = Some(second_name.to_string()))
    }

    pub fn set_master_filename(&self, user_id: UserId, filename: &str) -> Result<UserRecord> {
        self.update(user_id, |user| user.master_filename = Some(filename.to_string()))
    }

    fn update(&self, user_id: UserId, apply: impl FnOnce(&mut UserRecord)) -> Result<UserRecord> {
        let mut record = self
            .load_user(user_id)?
            .unwrap_or_else(|| UserRecord::new(user_id));
        apply(&mut record);
        self.upsert(record)
    }
}

impl LedgerRegistry for JsonLinesRegistry {
    fn master_path(&self, user_id: UserId) -> Result<Option<PathBuf>> {
        Ok(self
            .load_user(user_id)?
            .and_then(|u| u.master_filename)
            .map(PathBuf::from))
    }

    fn surname(&self, user_id: UserId) -> Result<Option<String>> {
        Ok(self.load_user(user_id)?.and_then(|u| u.second_name))
    }
}
