//! Persistence: save and load engine state to a file.
//! Enables recovery after restart: waitlist, campaigns, allocations, appointments and
//! next ids are restored.

use crate::error::PersistenceError;
use crate::store::EngineSnapshot;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedState {
    pub engine: EngineSnapshot,
}

/// File-based persistence: one JSON file. Save after state changes; load on startup.
///
/// Clones share the last written version, so saves from concurrent writers never replace
/// newer state with older state.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    path: std::path::PathBuf,
    written: Arc<Mutex<u64>>,
}

impl FilePersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save state to file. Writes a sibling temp file, then renames over the target.
    pub fn save(&self, state: &PersistedState) -> Result<(), PersistenceError> {
        let json = serde_json::to_string(state)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Save `state` tagged with a caller-assigned, increasing `version`. Returns `Ok(false)`
    /// without writing when a newer or equal version is already on disk.
    pub fn save_version(&self, version: u64, state: &PersistedState) -> Result<bool, PersistenceError> {
        // Held across the write: one writer at a time, and the temp file is not shared.
        let mut written = self.written.lock().unwrap_or_else(|e| e.into_inner());
        if version <= *written {
            return Ok(false);
        }
        self.save(state)?;
        *written = version;
        Ok(true)
    }

    /// Load state from file. `Ok(None)` if the file does not exist.
    pub fn load(&self) -> Result<Option<PersistedState>, PersistenceError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: PersistedState = serde_json::from_str(&data)?;
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CampaignRequest, DonorId, PatientId, ScreeningTypeId, WaitlistRequest};
    use crate::{Engine, EngineConfig};
    use rust_decimal::Decimal;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("screening_match_engine_{}_{}.json", name, std::process::id()))
    }

    #[test]
    fn load_missing_file_returns_none() {
        let p = FilePersistence::new(temp_path("missing"));
        let _ = std::fs::remove_file(p.path());
        assert!(p.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_restores_engine() {
        let mut engine = Engine::new(EngineConfig::seeded(1));
        engine
            .enqueue(
                WaitlistRequest {
                    patient_id: PatientId(1),
                    screening_type_id: ScreeningTypeId(1),
                    region: "Lagos".into(),
                    estimated_cost: Decimal::new(4550, 2),
                },
                1,
            )
            .unwrap();
        engine
            .create_campaign(
                CampaignRequest {
                    donor_id: DonorId(1),
                    title: "Breast screening drive".into(),
                    screening_type_ids: vec![ScreeningTypeId(1)],
                    regions: vec![],
                    initial_amount: Decimal::from(100),
                },
                1,
            )
            .unwrap();
        engine.run_matching(2);

        let p = FilePersistence::new(temp_path("roundtrip"));
        p.save(&PersistedState { engine: engine.snapshot() }).unwrap();
        let loaded = p.load().unwrap().unwrap();
        let _ = std::fs::remove_file(p.path());
        assert_eq!(loaded.engine, engine.snapshot());
        let restored = Engine::from_snapshot(EngineConfig::seeded(1), loaded.engine);
        assert_eq!(
            restored.campaigns()[0].available_amount,
            Decimal::new(5450, 2)
        );
    }

    #[test]
    fn stale_version_does_not_overwrite_newer_state() {
        let p = FilePersistence::new(temp_path("versioned"));
        let mut newer = PersistedState::default();
        newer.engine.general_pool = Decimal::from(20);
        let mut older = PersistedState::default();
        older.engine.general_pool = Decimal::from(10);

        assert!(p.save_version(2, &newer).unwrap());
        // A clone shares the version, as the API's background writers do.
        assert!(!p.clone().save_version(1, &older).unwrap());
        assert!(!p.save_version(2, &older).unwrap());
        let loaded = p.load().unwrap().unwrap();
        assert_eq!(loaded.engine.general_pool, Decimal::from(20));

        assert!(p.save_version(3, &older).unwrap());
        let loaded = p.load().unwrap().unwrap();
        let _ = std::fs::remove_file(p.path());
        assert_eq!(loaded.engine.general_pool, Decimal::from(10));
    }

    #[test]
    fn saved_file_is_compact_json() {
        let p = FilePersistence::new(temp_path("compact"));
        p.save(&PersistedState::default()).unwrap();
        let raw = std::fs::read_to_string(p.path()).unwrap();
        let _ = std::fs::remove_file(p.path());
        assert!(!raw.contains('\n'));
    }

    #[test]
    fn load_invalid_json_is_error() {
        let path = temp_path("invalid");
        std::fs::write(&path, "{not json").unwrap();
        let result = FilePersistence::new(&path).load();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(PersistenceError::Json(_))));
    }
}
