//! # 令牌加密模块
//!
//! 使用 AES-256-GCM 加密落库的 OAuth 令牌，同时为授权 state 提供认证加密。
//! 密钥由 `TOKEN_ENCRYPTION_SECRET` 经 SHA-256 派生。

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{ConnectError, Result};

/// 加密密钥所在的环境变量
pub const ENCRYPTION_SECRET_ENV: &str = "TOKEN_ENCRYPTION_SECRET";

const NONCE_LEN: usize = 12;

/// 令牌加密器
#[derive(Clone)]
pub struct TokenCrypto {
    cipher: Aes256Gcm,
}

impl fmt::Debug for TokenCrypto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCrypto").finish_non_exhaustive()
    }
}

impl TokenCrypto {
    /// 由任意长度的密钥字符串派生 256 位密钥
    pub fn from_secret(secret: &str) -> Result<Self> {
        if secret.trim().is_empty() {
            return Err(ConnectError::config("令牌加密密钥不能为空"));
        }
        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ConnectError::config_with_source("令牌加密密钥长度错误", anyhow::anyhow!("{e}")))?;
        Ok(Self { cipher })
    }

    /// 从环境变量创建加密器，缺失即为启动期致命错误
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(ENCRYPTION_SECRET_ENV).map_err(|_| {
            ConnectError::config(format!("缺少环境变量 {ENCRYPTION_SECRET_ENV}"))
        })?;
        Self::from_secret(&secret)
    }

    /// 加密字符串，输出 `base64(iv):base64(ciphertext)`
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let (nonce, ciphertext) = self.seal_parts(plaintext.as_bytes())?;
        Ok(format!(
            "{}:{}",
            general_purpose::STANDARD.encode(nonce),
            general_purpose::STANDARD.encode(ciphertext)
        ))
    }

    /// 解密 `encrypt` 的输出；格式错误或密钥不匹配都返回错误
    pub fn decrypt(&self, encrypted: &str) -> Result<String> {
        let (iv, data) = encrypted
            .split_once(':')
            .ok_or_else(|| ConnectError::crypto("密文格式错误"))?;

        let nonce = general_purpose::STANDARD
            .decode(iv)
            .map_err(|e| ConnectError::crypto_with_source("加密随机数格式错误", e))?;
        let ciphertext = general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ConnectError::crypto_with_source("加密数据格式错误", e))?;

        let plaintext = self.open_parts(&nonce, &ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|e| ConnectError::crypto_with_source("解密后的数据不是有效的UTF-8字符串", e))
    }

    /// 认证加密任意字节，输出 `nonce || ciphertext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let (nonce, ciphertext) = self.seal_parts(plaintext)?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// 解开 `seal` 的输出
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(ConnectError::crypto("密文长度不足"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.open_parts(nonce, ciphertext)
    }

    fn seal_parts(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).map_err(|e| {
            ConnectError::crypto_with_source(
                "令牌加密失败",
                anyhow::anyhow!("AES-GCM encryption failed: {e}"),
            )
        })?;
        Ok((nonce.to_vec(), ciphertext))
    }

    fn open_parts(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NONCE_LEN {
            return Err(ConnectError::crypto("加密随机数长度错误"));
        }
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| {
                ConnectError::crypto_with_source(
                    "令牌解密失败",
                    anyhow::anyhow!("AES-GCM decryption failed: {e}"),
                )
            })
    }

    /// 生成新的加密密钥（64 位十六进制）
    #[must_use]
    pub fn generate_secret() -> String {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto() -> TokenCrypto {
        TokenCrypto::from_secret("unit-test-secret").unwrap()
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let crypto = crypto();
        let encrypted = crypto.encrypt("gho_access_token_12345").unwrap();

        assert!(!encrypted.contains("gho_access_token_12345"));
        let (iv, _) = encrypted.split_once(':').unwrap();
        assert_eq!(general_purpose::STANDARD.decode(iv).unwrap().len(), NONCE_LEN);
        assert_eq!(crypto.decrypt(&encrypted).unwrap(), "gho_access_token_12345");
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let crypto = crypto();
        let a = crypto.encrypt("same").unwrap();
        let b = crypto.encrypt("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_foreign_input_fails() {
        let crypto = crypto();
        assert!(crypto.decrypt("plaintext-token").is_err());
        assert!(crypto.decrypt("not:base64!").is_err());
        assert!(crypto.decrypt("").is_err());

        let other = TokenCrypto::from_secret("another-secret").unwrap();
        let encrypted = other.encrypt("secret").unwrap();
        assert!(crypto.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_seal_open() {
        let crypto = crypto();
        let mut sealed = crypto.seal(b"payload").unwrap();
        assert_eq!(crypto.open(&sealed).unwrap(), b"payload");

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(crypto.open(&sealed).is_err());
        assert!(crypto.open(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_empty_secret_is_config_error() {
        let err = TokenCrypto::from_secret("  ").unwrap_err();
        assert!(matches!(err, ConnectError::Config { .. }));
    }

    #[test]
    fn test_generate_secret() {
        let a = TokenCrypto::generate_secret();
        let b = TokenCrypto::generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(TokenCrypto::from_secret(&a).is_ok());
    }
}
