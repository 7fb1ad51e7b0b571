//! Session Token Storage
//!
//! File-backed store for the bearer token issued at sign-in.
//! The token is encrypted at rest using AES-256-GCM.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::{is_expired, TokenSource};
use crate::types::{AppError, AppResult};

const SESSION_FILE: &str = "session.json";
const ENCRYPTION_KEY_FILE: &str = ".session_key";
const NONCE_SIZE: usize = 12;

/// On-disk layout of the session file
#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    token: String,
    saved_at: chrono::DateTime<chrono::Utc>,
}

/// Session storage manager
#[derive(Debug, Clone)]
pub struct SessionStore {
    session_path: PathBuf,
    key_path: PathBuf,
}

impl SessionStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base_dir = base_dir.as_ref();
        Self {
            session_path: base_dir.join(SESSION_FILE),
            key_path: base_dir.join(ENCRYPTION_KEY_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.session_path
    }

    async fn ensure_dir(&self) -> AppResult<()> {
        if let Some(parent) = self.session_path.parent() {
            fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        Ok(())
    }

    /// Read the encryption key without creating one. A missing or malformed
    /// key file reads as `None`.
    async fn read_key(&self) -> AppResult<Option<[u8; 32]>> {
        if !fs::try_exists(&self.key_path).await.map_err(storage_err)? {
            return Ok(None);
        }

        let key_data = fs::read(&self.key_path).await.map_err(storage_err)?;
        match BASE64.decode(key_data.trim_ascii()) {
            Ok(key_bytes) if key_bytes.len() == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&key_bytes);
                Ok(Some(key))
            }
            _ => {
                warn!("Session key file is malformed");
                Ok(None)
            }
        }
    }

    /// Get or create the encryption key. Only sign-in calls this.
    async fn get_or_create_key(&self) -> AppResult<[u8; 32]> {
        self.ensure_dir().await?;

        if let Some(key) = self.read_key().await? {
            return Ok(key);
        }

        let key: [u8; 32] = rand::random();
        fs::write(&self.key_path, BASE64.encode(key)).await.map_err(storage_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            fs::set_permissions(&self.key_path, perms).await.map_err(storage_err)?;
        }

        info!("Generated new session encryption key");
        Ok(key)
    }

    fn encrypt(&self, plaintext: &str, key: &[u8; 32]) -> AppResult<String> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| AppError::Storage(e.to_string()))?;
        let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Storage(format!("encryption failed: {}", e)))?;

        // nonce || ciphertext
        let mut combined = nonce_bytes.to_vec();
        combined.extend(ciphertext);
        Ok(BASE64.encode(&combined))
    }

    fn decrypt(&self, encrypted: &str, key: &[u8; 32]) -> AppResult<String> {
        let combined = BASE64
            .decode(encrypted)
            .map_err(|e| AppError::Storage(e.to_string()))?;
        if combined.len() < NONCE_SIZE {
            return Err(AppError::Storage("invalid encrypted data".to_string()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| AppError::Storage(e.to_string()))?;
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| AppError::Storage(format!("decryption failed: {}", e)))?;

        String::from_utf8(plaintext).map_err(|e| AppError::Storage(e.to_string()))
    }

    /// Persist the token, replacing any previous session
    pub async fn save(&self, token: &str) -> AppResult<()> {
        if token.trim().is_empty() {
            return Err(AppError::InvalidInput("refusing to store an empty token".to_string()));
        }
        self.ensure_dir().await?;
        let key = self.get_or_create_key().await?;

        let stored = StoredSession {
            token: self.encrypt(token, &key)?,
            saved_at: chrono::Utc::now(),
        };
        let content = serde_json::to_string_pretty(&stored).map_err(|e| AppError::Storage(e.to_string()))?;
        fs::write(&self.session_path, content).await.map_err(storage_err)?;

        info!("Saved session to {:?}", self.session_path);
        Ok(())
    }

    /// Load the stored token, if any. A corrupt file or a missing key reads as
    /// no session; nothing on disk is written.
    pub async fn load(&self) -> AppResult<Option<String>> {
        if !fs::try_exists(&self.session_path).await.map_err(storage_err)? {
            return Ok(None);
        }

        let Some(key) = self.read_key().await? else {
            warn!("Session key is missing or malformed, treating the session as signed out");
            return Ok(None);
        };
        let content = fs::read_to_string(&self.session_path).await.map_err(storage_err)?;
        let stored: StoredSession = match serde_json::from_str(&content) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Session file is unreadable, ignoring it: {}", e);
                return Ok(None);
            }
        };

        match self.decrypt(&stored.token, &key) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Failed to decrypt session token, it may be corrupted: {}", e);
                Ok(None)
            }
        }
    }

    /// Remove the stored session (sign out)
    pub async fn clear(&self) -> AppResult<()> {
        match fs::remove_file(&self.session_path).await {
            Ok(()) => {
                info!("Cleared session at {:?}", self.session_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(e)),
        }
    }
}

#[async_trait]
impl TokenSource for SessionStore {
    async fn bearer_token(&self) -> AppResult<Option<String>> {
        let token = self.load().await?;
        Ok(token.filter(|t| {
            if is_expired(t) {
                warn!("Stored session token has expired");
                false
            } else {
                true
            }
        }))
    }
}

fn storage_err(e: std::io::Error) -> AppError {
    AppError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_session_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());

        assert_eq!(store.load().await.unwrap(), None);
        store.save("opaque-token-123").await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some("opaque-token-123".to_string()));
        assert_eq!(store.bearer_token().await.unwrap(), Some("opaque-token-123".to_string()));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_token_is_not_stored_in_plaintext() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());
        store.save("plaintext-secret").await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("plaintext-secret"));
    }

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    fn jwt(exp: i64) -> String {
        let claims = Claims { sub: "user-1".into(), exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"server-side")).unwrap()
    }

    #[tokio::test]
    async fn test_lost_key_reads_as_signed_out() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());
        store.save("token-under-old-key").await.unwrap();

        let key_path = temp_dir.path().join(ENCRYPTION_KEY_FILE);
        std::fs::remove_file(&key_path).unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert!(!key_path.exists());
    }

    #[tokio::test]
    async fn test_malformed_key_is_left_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());
        store.save("token-under-old-key").await.unwrap();

        let key_path = temp_dir.path().join(ENCRYPTION_KEY_FILE);
        std::fs::write(&key_path, "not-a-key").unwrap();
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(store.bearer_token().await.unwrap(), None);
        assert_eq!(std::fs::read_to_string(&key_path).unwrap(), "not-a-key");
    }

    #[tokio::test]
    async fn test_load_without_session_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path().join("fresh"));

        assert_eq!(store.load().await.unwrap(), None);
        assert!(!temp_dir.path().join("fresh").exists());
    }

    #[tokio::test]
    async fn test_expired_token_is_hidden_from_callers() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());
        let now = chrono::Utc::now().timestamp();

        let expired = jwt(now - 60);
        store.save(&expired).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(expired));
        assert_eq!(store.bearer_token().await.unwrap(), None);

        let fresh = jwt(now + 3600);
        store.save(&fresh).await.unwrap();
        assert_eq!(store.bearer_token().await.unwrap(), Some(fresh));
    }

    #[tokio::test]
    async fn test_rejects_empty_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = SessionStore::new(temp_dir.path());
        assert!(matches!(store.save("  ").await, Err(AppError::InvalidInput(_))));
    }
}
