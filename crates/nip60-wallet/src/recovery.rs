//! Local recovery backups: a proof set is written to disk before it's
//! published, and the file is deleted once the owning event is confirmed.
//! This bridges the gap between "swap succeeded" and "relay acknowledged"
//! so a crash in between can't orphan spendable proofs.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use bitcoin::secp256k1::rand::RngCore;
use cashu_core::Proofs;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Error;

const BACKUP_SUBDIR: &str = ".cashu_nip60/proof_backups";

/// On-disk shape of a backup file: the proof set plus the provenance a
/// recovery tool needs without re-deriving it from the proofs themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupContents {
    pub timestamp: u64,
    pub proofs: Proofs,
    pub mint_urls: Vec<String>,
}

fn backup_dir(base_dir: Option<&Path>) -> Result<PathBuf, Error> {
    if let Some(dir) = base_dir {
        return Ok(dir.to_path_buf());
    }
    let home_dir = home::home_dir().ok_or_else(|| Error::Backup("could not determine home directory".into()))?;
    Ok(home_dir.join(BACKUP_SUBDIR))
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 4];
    bitcoin::secp256k1::rand::rngs::OsRng.fill_bytes(&mut bytes);
    cashu_core::keys::hex::encode(bytes)
}

/// A local backup file holding a proof set pending relay confirmation.
#[derive(Debug)]
pub struct RecoveryBackup {
    path: PathBuf,
}

impl RecoveryBackup {
    /// Write `proofs` to a fresh backup file under `base_dir` (or
    /// `~/.cashu_nip60/proof_backups` if `None`), creating the directory if
    /// needed.
    #[instrument(skip(proofs))]
    pub fn write(proofs: &Proofs, base_dir: Option<&Path>) -> Result<Self, Error> {
        let dir = backup_dir(base_dir)?;
        fs::create_dir_all(&dir).map_err(|e| Error::Backup(e.to_string()))?;

        let unix_ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let file_name = format!("proofs_{unix_ts}_{}.json", random_suffix());
        let path = dir.join(file_name);

        let mint_urls: BTreeSet<String> = proofs.iter().map(|p| p.mint_url.to_string()).collect();
        let contents = BackupContents {
            timestamp: unix_ts,
            proofs: proofs.clone(),
            mint_urls: mint_urls.into_iter().collect(),
        };
        let json = serde_json::to_vec_pretty(&contents).map_err(|e| Error::Backup(e.to_string()))?;
        fs::write(&path, json).map_err(|e| Error::Backup(e.to_string()))?;

        tracing::debug!(path = %path.display(), count = proofs.len(), "wrote recovery backup");
        Ok(Self { path })
    }

    /// The backup file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the backup file. Called once the proofs it covers are
    /// confirmed published (or intentionally discarded).
    #[instrument(skip(self))]
    pub fn confirm(self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Backup(e.to_string())),
        }
    }
}

/// List every backup file still present under `base_dir` (or the default
/// directory), for a recovery sweep at startup.
pub fn list_backups(base_dir: Option<&Path>) -> Result<Vec<PathBuf>, Error> {
    let dir = backup_dir(base_dir)?;
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| Error::Backup(e.to_string()))? {
        let entry = entry.map_err(|e| Error::Backup(e.to_string()))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Read and parse a backup file left over from a prior run.
pub fn read_backup(path: &Path) -> Result<BackupContents, Error> {
    let bytes = fs::read(path).map_err(|e| Error::Backup(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::Backup(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashu_core::{Amount, CurrencyUnit, KeysetId, MintUrl, Proof, PublicKey, Secret};
    use std::str::FromStr;

    fn sample_proof() -> Proof {
        let keys: cashu_core::Keys = [(1u64, PublicKey::from_slice(&[0x02; 33]).unwrap())].into_iter().collect();
        Proof {
            amount: Amount::from_sat(4),
            keyset_id: KeysetId::derive(&keys),
            secret: Secret::generate(),
            c: PublicKey::from_slice(&[0x02; 33]).unwrap(),
            mint_url: MintUrl::from_str("https://mint.example").unwrap(),
            unit: CurrencyUnit::Sat,
        }
    }

    #[test]
    fn test_write_list_confirm_roundtrip() {
        let tmp = std::env::temp_dir().join(format!("nip60-recovery-test-{}", random_suffix()));
        let proofs: Proofs = vec![sample_proof()];

        let backup = RecoveryBackup::write(&proofs, Some(&tmp)).unwrap();
        assert!(backup.path().exists());

        let listed = list_backups(Some(&tmp)).unwrap();
        assert_eq!(listed.len(), 1);

        let read_back = read_backup(&listed[0]).unwrap();
        assert_eq!(read_back.proofs.len(), 1);
        assert_eq!(read_back.proofs[0].amount, Amount::from_sat(4));
        assert_eq!(read_back.mint_urls, vec!["https://mint.example".to_string()]);
        assert!(read_back.timestamp > 0);

        backup.confirm().unwrap();
        assert!(list_backups(Some(&tmp)).unwrap().is_empty());

        let _ = fs::remove_dir_all(&tmp);
    }
}
