//! # PKCE (Proof Key for Code Exchange)
//!
//! RFC 7636：授权请求发送 S256 challenge，令牌交换时发送 verifier。
//! verifier 保存在加密的授权 state 中，不落库。

use base64::engine::{Engine, general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distributions::Alphanumeric};
use sha2::{Digest, Sha256};

/// PKCE Code Verifier长度范围
const MIN_CODE_VERIFIER_LENGTH: usize = 43;
const MAX_CODE_VERIFIER_LENGTH: usize = 128;
const DEFAULT_CODE_VERIFIER_LENGTH: usize = 64;

/// PKCE Code Verifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceVerifier {
    value: String,
}

impl PkceVerifier {
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let value: String = (0..DEFAULT_CODE_VERIFIER_LENGTH)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect();
        Self { value }
    }

    /// 从 state 中恢复；不符合 RFC 7636 字符集或长度时返回 None
    #[must_use]
    pub fn from_string(value: String) -> Option<Self> {
        is_valid_code_verifier(&value).then_some(Self { value })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.value
    }

    /// 生成 S256 Code Challenge
    #[must_use]
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.value.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

/// 授权请求使用的 challenge 方法
pub const CHALLENGE_METHOD: &str = "S256";

/// 检查Code Verifier是否符合规范
#[must_use]
pub fn is_valid_code_verifier(verifier: &str) -> bool {
    (MIN_CODE_VERIFIER_LENGTH..=MAX_CODE_VERIFIER_LENGTH).contains(&verifier.len())
        && verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'))
}
