//! Property tests for the credential round-trip contract.

use geowatch_core::{CredentialKind, CredentialScope, Engine, WorkspaceId};
use geowatch_vault::{CredentialVault, StoreOptions, VaultCipher};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn store_then_reveal_returns_the_original(value in "[a-zA-Z0-9 _:/.-]{0,128}") {
        let vault = CredentialVault::new("prop-secret");
        let ws = WorkspaceId::new();
        let plaintext = json!({"token": value});
        let id = vault
            .store(
                CredentialScope::Workspace(ws),
                Engine::Kimi,
                CredentialKind::ApiKey,
                &plaintext,
                StoreOptions::default(),
            )
            .unwrap();
        prop_assert_eq!(vault.reveal(id).unwrap(), plaintext);
    }

    #[test]
    fn ciphertext_never_leaks_the_plaintext(value in "[a-zA-Z0-9]{8,64}") {
        let cipher = VaultCipher::from_secret("prop-secret");
        let encoded = cipher.encrypt(&json!(value)).unwrap();
        prop_assert!(!encoded.contains(&value));
    }

    #[test]
    fn nested_json_values_roundtrip(key in "[a-z]{1,16}", n in 0u64..1_000_000) {
        let cipher = VaultCipher::from_secret("prop-secret");
        let value = json!({"cookies": [{"name": key, "value": n}], "count": n});
        let encoded = cipher.encrypt(&value).unwrap();
        prop_assert_eq!(cipher.decrypt(&encoded).unwrap(), value);
    }
}
