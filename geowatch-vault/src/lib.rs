//! Encrypted credential storage.
//!
//! The vault is the only component that reads or writes credential rows.
//! Values are JSON-serialized, AES-256-GCM encrypted, and base64-stored;
//! cleartext never hits persistence or logs.

mod cipher;

pub use cipher::VaultCipher;

use chrono::{DateTime, Utc};
use geowatch_core::{
    Credential, CredentialId, CredentialKind, CredentialScope, Engine, GeoError, Result,
    WorkspaceId,
};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Failure messages persisted on a credential are capped at this many chars.
const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub account: Option<String>,
    pub label: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A decrypted credential handed to an adapter.
#[derive(Debug, Clone)]
pub struct ActiveCredential {
    pub id: CredentialId,
    pub engine: Engine,
    pub kind: CredentialKind,
    pub account: String,
    pub value: serde_json::Value,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Credential metadata safe to list; never includes the value.
#[derive(Debug, Clone)]
pub struct CredentialInfo {
    pub id: CredentialId,
    pub engine: Engine,
    pub kind: CredentialKind,
    pub account: String,
    pub label: Option<String>,
    pub is_active: bool,
    pub is_expired: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct CredentialVault {
    cipher: VaultCipher,
    rows: RwLock<Vec<Credential>>,
}

impl CredentialVault {
    pub fn new(process_secret: &str) -> Self {
        Self {
            cipher: VaultCipher::from_secret(process_secret),
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Encrypt and store a credential value.
    pub fn store(
        &self,
        scope: CredentialScope,
        engine: Engine,
        kind: CredentialKind,
        value: &serde_json::Value,
        opts: StoreOptions,
    ) -> Result<CredentialId> {
        let encrypted_value = self.cipher.encrypt(value)?;
        let credential = Credential {
            id: CredentialId::new(),
            scope,
            engine,
            kind,
            account: opts.account.unwrap_or_else(|| "default".to_string()),
            encrypted_value,
            label: opts.label,
            is_active: true,
            expires_at: opts.expires_at,
            last_used_at: None,
            last_error: None,
            created_at: Utc::now(),
        };
        let id = credential.id;
        self.rows.write().unwrap().push(credential);
        debug!(%engine, ?kind, "stored credential");
        Ok(id)
    }

    /// Decrypt a credential by id.
    pub fn reveal(&self, id: CredentialId) -> Result<serde_json::Value> {
        let rows = self.rows.read().unwrap();
        let credential = rows
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| GeoError::NotFound(format!("credential {id}")))?;
        self.cipher.decrypt(&credential.encrypted_value)
    }

    /// First active, non-expired, decryptable credential for the lookup key,
    /// in insertion order. Rows that fail decryption are skipped, not errors.
    pub fn pick_active(
        &self,
        workspace: WorkspaceId,
        engine: Engine,
        kind: CredentialKind,
        account: &str,
    ) -> Option<ActiveCredential> {
        let now = Utc::now();
        let rows = self.rows.read().unwrap();
        for credential in rows.iter() {
            if credential.scope != CredentialScope::Workspace(workspace)
                || credential.engine != engine
                || credential.kind != kind
                || credential.account != account
                || !credential.is_active
                || credential.is_expired(now)
            {
                continue;
            }
            match self.cipher.decrypt(&credential.encrypted_value) {
                Ok(value) => {
                    return Some(ActiveCredential {
                        id: credential.id,
                        engine: credential.engine,
                        kind: credential.kind,
                        account: credential.account.clone(),
                        value,
                        expires_at: credential.expires_at,
                    });
                }
                Err(_) => {
                    warn!(id = %credential.id, %engine, "skipping undecryptable credential");
                    continue;
                }
            }
        }
        None
    }

    /// Re-encrypt a credential in place and clear any recorded failure.
    pub fn update_value(
        &self,
        id: CredentialId,
        value: &serde_json::Value,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let encrypted_value = self.cipher.encrypt(value)?;
        let mut rows = self.rows.write().unwrap();
        let credential = rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| GeoError::NotFound(format!("credential {id}")))?;
        credential.encrypted_value = encrypted_value;
        if expires_at.is_some() {
            credential.expires_at = expires_at;
        }
        credential.last_error = None;
        Ok(())
    }

    pub fn mark_used(&self, id: CredentialId) {
        let mut rows = self.rows.write().unwrap();
        if let Some(credential) = rows.iter_mut().find(|c| c.id == id) {
            credential.last_used_at = Some(Utc::now());
        }
    }

    pub fn mark_failed(&self, id: CredentialId, message: &str) {
        let mut rows = self.rows.write().unwrap();
        if let Some(credential) = rows.iter_mut().find(|c| c.id == id) {
            credential.last_error = Some(message.chars().take(MAX_ERROR_LEN).collect());
        }
    }

    pub fn deactivate(&self, id: CredentialId) -> Result<()> {
        let mut rows = self.rows.write().unwrap();
        let credential = rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| GeoError::NotFound(format!("credential {id}")))?;
        credential.is_active = false;
        Ok(())
    }

    /// Credential metadata for a workspace, without decrypted values.
    pub fn list_for_workspace(
        &self,
        workspace: WorkspaceId,
        include_inactive: bool,
    ) -> Vec<CredentialInfo> {
        let now = Utc::now();
        let rows = self.rows.read().unwrap();
        rows.iter()
            .filter(|c| c.scope == CredentialScope::Workspace(workspace))
            .filter(|c| include_inactive || c.is_active)
            .map(|c| CredentialInfo {
                id: c.id,
                engine: c.engine,
                kind: c.kind,
                account: c.account.clone(),
                label: c.label.clone(),
                is_active: c.is_active,
                is_expired: c.is_expired(now),
                last_used_at: c.last_used_at,
                last_error: c.last_error.clone(),
                expires_at: c.expires_at,
                created_at: c.created_at,
            })
            .collect()
    }

    /// Whether the workspace has an active API key enrolled for the engine.
    pub fn has_api_key(&self, workspace: WorkspaceId, engine: Engine) -> bool {
        self.pick_active(workspace, engine, CredentialKind::ApiKey, "default")
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vault() -> CredentialVault {
        CredentialVault::new("unit-test-secret")
    }

    #[test]
    fn store_then_reveal_roundtrips() {
        let vault = vault();
        let ws = WorkspaceId::new();
        let value = json!({"cookie": "session=abc123"});
        let id = vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::Kimi,
                CredentialKind::Cookie,
                &value,
                StoreOptions::default(),
            )
            .unwrap();
        assert_eq!(vault.reveal(id).unwrap(), value);
    }

    #[test]
    fn reveal_unknown_is_not_found() {
        let err = vault().reveal(CredentialId::new()).unwrap_err();
        assert!(matches!(err, GeoError::NotFound(_)));
    }

    #[test]
    fn persisted_form_never_contains_plaintext() {
        let vault = vault();
        let ws = WorkspaceId::new();
        vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::DeepSeek,
                CredentialKind::ApiKey,
                &json!("sk-verysecret"),
                StoreOptions::default(),
            )
            .unwrap();
        let rows = vault.rows.read().unwrap();
        assert!(!rows[0].encrypted_value.contains("verysecret"));
    }

    #[test]
    fn pick_active_honors_insertion_order_and_expiry() {
        let vault = vault();
        let ws = WorkspaceId::new();
        let scope = CredentialScope::Workspace(ws);
        let expired = StoreOptions {
            expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            ..Default::default()
        };
        vault
            .store(scope, Engine::Qwen, CredentialKind::ApiKey, &json!("old"), expired)
            .unwrap();
        vault
            .store(
                scope,
                Engine::Qwen,
                CredentialKind::ApiKey,
                &json!("first-live"),
                StoreOptions::default(),
            )
            .unwrap();
        vault
            .store(
                scope,
                Engine::Qwen,
                CredentialKind::ApiKey,
                &json!("second-live"),
                StoreOptions::default(),
            )
            .unwrap();

        let active = vault
            .pick_active(ws, Engine::Qwen, CredentialKind::ApiKey, "default")
            .unwrap();
        assert_eq!(active.value, json!("first-live"));
    }

    #[test]
    fn pick_active_misses_other_engines_and_workspaces() {
        let vault = vault();
        let ws = WorkspaceId::new();
        vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::Kimi,
                CredentialKind::ApiKey,
                &json!("k"),
                StoreOptions::default(),
            )
            .unwrap();
        assert!(vault
            .pick_active(ws, Engine::Qwen, CredentialKind::ApiKey, "default")
            .is_none());
        assert!(vault
            .pick_active(WorkspaceId::new(), Engine::Kimi, CredentialKind::ApiKey, "default")
            .is_none());
    }

    #[test]
    fn mark_failed_truncates() {
        let vault = vault();
        let ws = WorkspaceId::new();
        let id = vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::ChatGpt,
                CredentialKind::ApiKey,
                &json!("v"),
                StoreOptions::default(),
            )
            .unwrap();
        vault.mark_failed(id, &"x".repeat(2000));
        let info = &vault.list_for_workspace(ws, true)[0];
        assert_eq!(info.last_error.as_ref().unwrap().len(), 500);
    }

    #[test]
    fn update_value_clears_error() {
        let vault = vault();
        let ws = WorkspaceId::new();
        let id = vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::ChatGpt,
                CredentialKind::ApiKey,
                &json!("v1"),
                StoreOptions::default(),
            )
            .unwrap();
        vault.mark_failed(id, "401 unauthorized");
        vault.update_value(id, &json!("v2"), None).unwrap();
        assert_eq!(vault.reveal(id).unwrap(), json!("v2"));
        assert!(vault.list_for_workspace(ws, true)[0].last_error.is_none());
    }

    #[test]
    fn deactivated_is_never_picked() {
        let vault = vault();
        let ws = WorkspaceId::new();
        let id = vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::Perplexity,
                CredentialKind::ApiKey,
                &json!("v"),
                StoreOptions::default(),
            )
            .unwrap();
        vault.deactivate(id).unwrap();
        assert!(!vault.has_api_key(ws, Engine::Perplexity));
    }
}
