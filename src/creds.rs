//! Authentication credentials
//!
//! One immutable bundle shared read-only across all workers: identity
//! (domain + user) plus password, LM/NT hashes for pass-the-hash, or a
//! Kerberos key with its KDC host. Hash strings use the `LM:NT` form;
//! when only one half is given the well-known empty-credential value is
//! synthesized for the other.

use regex::Regex;
use std::sync::LazyLock;

/// LM hash of the empty string
pub const EMPTY_LM_HASH: &str = "aad3b435b51404eeaad3b435b51404ee";
/// NT hash of the empty string
pub const EMPTY_NT_HASH: &str = "31d6cfe0d16ae931b73c59d7e0c089c0";

static HASHES_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([0-9a-f]{32})?(:)?([0-9a-f]{32})?$").expect("Invalid hashes regex")
});

/// Authentication material for SMB connections
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub domain: String,
    pub username: String,
    pub password: String,

    /// Pass-the-hash material
    pub lm_hex: String,
    pub lm_raw: Option<[u8; 16]>,
    pub nt_hex: String,
    pub nt_raw: Option<[u8; 16]>,

    /// Kerberos material (carried for CLI parity; session setup
    /// authenticates via NTLM)
    pub use_kerberos: bool,
    pub aes_key: String,
    pub kdc_host: String,
}

impl Credentials {
    pub fn new(
        domain: &str,
        username: &str,
        password: &str,
        hashes: Option<&str>,
        use_kerberos: bool,
        aes_key: &str,
        kdc_host: &str,
    ) -> Self {
        let mut creds = Credentials {
            domain: domain.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            use_kerberos,
            aes_key: aes_key.to_string(),
            kdc_host: kdc_host.to_string(),
            ..Default::default()
        };
        if let Some(h) = hashes {
            creds.set_hashes(h);
        }
        creds
    }

    /// Parse and install an `LM:NT` hash string.
    pub fn set_hashes(&mut self, hashes: &str) {
        self.lm_hex.clear();
        self.lm_raw = None;
        self.nt_hex.clear();
        self.nt_raw = None;

        if hashes.is_empty() {
            return;
        }

        let (lm, nt) = parse_lm_nt_hashes(hashes);
        self.lm_hex = lm;
        self.nt_hex = nt;
        self.lm_raw = decode_hash(&self.lm_hex);
        self.nt_raw = decode_hash(&self.nt_hex);
    }

    /// True when no username is provided
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// True when both hash halves are available
    pub fn can_pass_the_hash(&self) -> bool {
        self.nt_raw.is_some() && self.lm_raw.is_some()
    }

    /// Raw NT hash, if set
    pub fn nt_hash_raw(&self) -> Option<[u8; 16]> {
        self.nt_raw
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Credentials for '{}\\{}'>", self.domain, self.username)
    }
}

fn decode_hash(hex: &str) -> Option<[u8; 16]> {
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

/// Parse `"LM:NT"`, `":NT"`, or `"LM:"` into separate lowercase hex
/// strings, filling the missing half with the empty-credential value.
pub fn parse_lm_nt_hashes(hash_string: &str) -> (String, String) {
    let trimmed = hash_string.trim().to_lowercase();
    if trimmed.is_empty() {
        return (String::new(), String::new());
    }

    let Some(caps) = HASHES_REGEX.captures(&trimmed) else {
        return (String::new(), String::new());
    };

    let lm = caps.get(1).map(|m| m.as_str().to_string());
    let nt = caps.get(3).map(|m| m.as_str().to_string());

    match (lm, nt) {
        (None, None) => (String::new(), String::new()),
        (None, Some(nt)) => (EMPTY_LM_HASH.to_string(), nt),
        (Some(lm), None) => (lm, EMPTY_NT_HASH.to_string()),
        (Some(lm), Some(nt)) => (lm, nt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_NT: &str = "8846f7eaee8fb117ad06bdd830b7586c";
    const SAMPLE_LM: &str = "e52cac67419a9a224a3b108f3fa6cb6d";

    #[test]
    fn test_both_hashes() {
        let (lm, nt) = parse_lm_nt_hashes(&format!("{}:{}", SAMPLE_LM, SAMPLE_NT));
        assert_eq!(lm, SAMPLE_LM);
        assert_eq!(nt, SAMPLE_NT);
    }

    #[test]
    fn test_nt_only_synthesizes_lm() {
        let (lm, nt) = parse_lm_nt_hashes(&format!(":{}", SAMPLE_NT));
        assert_eq!(lm, EMPTY_LM_HASH);
        assert_eq!(nt, SAMPLE_NT);
    }

    #[test]
    fn test_lm_only_synthesizes_nt() {
        let (lm, nt) = parse_lm_nt_hashes(&format!("{}:", SAMPLE_LM));
        assert_eq!(lm, SAMPLE_LM);
        assert_eq!(nt, EMPTY_NT_HASH);
    }

    #[test]
    fn test_invalid_hashes_rejected() {
        assert_eq!(parse_lm_nt_hashes("nonsense"), (String::new(), String::new()));
        assert_eq!(parse_lm_nt_hashes("1234"), (String::new(), String::new()));
    }

    #[test]
    fn test_uppercase_input_normalized() {
        let (_, nt) = parse_lm_nt_hashes(&format!(":{}", SAMPLE_NT.to_uppercase()));
        assert_eq!(nt, SAMPLE_NT);
    }

    #[test]
    fn test_credentials_with_hashes() {
        let creds = Credentials::new(
            "CORP",
            "alice",
            "",
            Some(&format!(":{}", SAMPLE_NT)),
            false,
            "",
            "",
        );
        assert!(creds.can_pass_the_hash());
        assert!(!creds.is_anonymous());
        let raw = creds.nt_hash_raw().unwrap();
        assert_eq!(raw[0], 0x88);
        assert_eq!(raw[15], 0x6c);
    }

    #[test]
    fn test_anonymous() {
        let creds = Credentials::default();
        assert!(creds.is_anonymous());
        assert!(!creds.can_pass_the_hash());
    }
}
