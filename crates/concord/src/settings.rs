//! Setting declarations, node settings, and concrete setting expansion.
//!
//! A declaration is either a concrete secure setting with a fixed key, an
//! affix template (`prefix.<namespace>.suffix`) that expands against the
//! node's configured keys, or a plain setting that never carries a secret.
//! Only consistency-checked secure declarations may reach the expander.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use zeroize::Zeroizing;

use concord_common::{ConcordError, Result};

/// SHA-256 digest of a local secret value.
///
/// Never published or logged; erased when dropped.
pub struct LocalDigest(Zeroizing<Vec<u8>>);

impl LocalDigest {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for LocalDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LocalDigest(..)")
    }
}

/// Local node settings: plain values plus the keystore of secure values
#[derive(Default)]
pub struct Settings {
    values: BTreeMap<String, String>,
    secure: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plain (non-secret) setting
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Add a secure setting to the keystore
    pub fn with_secure(mut self, key: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.insert_secure(key, secret);
        self
    }

    pub fn insert_secure(&mut self, key: impl Into<String>, secret: impl Into<Vec<u8>>) {
        self.secure.insert(key.into(), Zeroizing::new(secret.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// All configured keys, plain and secure, in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let keys: BTreeSet<&str> = self
            .values
            .keys()
            .chain(self.secure.keys())
            .map(String::as_str)
            .collect();
        keys.into_iter()
    }

    /// Digest of the keystore value for `key`, if present
    pub fn secret_digest(&self, key: &str) -> Option<LocalDigest> {
        self.secure.get(key).map(|secret| {
            let digest = Sha256::digest(secret.as_slice());
            LocalDigest(Zeroizing::new(digest.to_vec()))
        })
    }

    pub fn secure_len(&self) -> usize {
        self.secure.len()
    }
}

/// A concrete secure setting with a fixed key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureSetting {
    key: String,
    consistent: bool,
}

impl SecureSetting {
    pub fn new(key: impl Into<String>, consistent: bool) -> Self {
        Self {
            key: key.into(),
            consistent,
        }
    }

    /// A secure setting subject to the consistency check
    pub fn consistent(key: impl Into<String>) -> Self {
        Self::new(key, true)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Digest of this setting's local value, or `None` if not set locally
    pub fn local_digest(&self, settings: &Settings) -> Option<LocalDigest> {
        settings.secret_digest(&self.key)
    }
}

/// A templated secure setting: `prefix.<namespace>.suffix`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AffixSetting {
    prefix: String,
    suffix: String,
    consistent: bool,
}

impl AffixSetting {
    /// `prefix` and `suffix` are given without the joining dots
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>, consistent: bool) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            consistent,
        }
    }

    pub fn consistent(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::new(prefix, suffix, true)
    }

    /// Key pattern, e.g. `remote.*.secure_password`
    pub fn pattern(&self) -> String {
        format!("{}.*.{}", self.prefix, self.suffix)
    }

    pub fn is_consistent(&self) -> bool {
        self.consistent
    }

    /// Namespace part of `key` if the key fits this template
    pub fn namespace<'a>(&self, key: &'a str) -> Option<&'a str> {
        let rest = key.strip_prefix(self.prefix.as_str())?.strip_prefix('.')?;
        let namespace = rest.strip_suffix(self.suffix.as_str())?.strip_suffix('.')?;
        let valid = !namespace.is_empty()
            && namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then_some(namespace)
    }

    pub fn matches(&self, key: &str) -> bool {
        self.namespace(key).is_some()
    }

    /// Concrete setting for one namespace
    pub fn concrete_setting(&self, namespace: &str) -> SecureSetting {
        SecureSetting::new(
            format!("{}.{}.{}", self.prefix, namespace, self.suffix),
            self.consistent,
        )
    }

    /// One concrete setting per namespace configured in `settings`
    pub fn concrete_settings(&self, settings: &Settings) -> Vec<SecureSetting> {
        let namespaces: BTreeSet<&str> = settings.keys().filter_map(|k| self.namespace(k)).collect();
        namespaces
            .into_iter()
            .map(|ns| self.concrete_setting(ns))
            .collect()
    }
}

/// A setting declaration as registered with the node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingDeclaration {
    /// Secure setting with a fixed key
    Concrete(SecureSetting),
    /// Secure setting template expanded per namespace
    Affix(AffixSetting),
    /// Non-secret setting
    Plain { key: String },
}

impl SettingDeclaration {
    /// Key, or key pattern for templates
    pub fn key(&self) -> String {
        match self {
            Self::Concrete(setting) => setting.key().to_string(),
            Self::Affix(affix) => affix.pattern(),
            Self::Plain { key } => key.clone(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        match self {
            Self::Concrete(setting) => setting.is_consistent(),
            Self::Affix(affix) => affix.is_consistent(),
            Self::Plain { .. } => false,
        }
    }

    /// True if `key` is this declaration's key or fits its template
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Concrete(setting) => setting.key() == key,
            Self::Affix(affix) => affix.matches(key),
            Self::Plain { key: own } => own == key,
        }
    }
}

impl From<SecureSetting> for SettingDeclaration {
    fn from(setting: SecureSetting) -> Self {
        Self::Concrete(setting)
    }
}

impl From<AffixSetting> for SettingDeclaration {
    fn from(affix: AffixSetting) -> Self {
        Self::Affix(affix)
    }
}

/// Keep only the consistency-checked declarations
pub fn consistent_declarations<I>(declarations: I) -> Vec<SettingDeclaration>
where
    I: IntoIterator<Item = SettingDeclaration>,
{
    declarations
        .into_iter()
        .filter(SettingDeclaration::is_consistent)
        .collect()
}

/// Visit every concrete consistent secure setting, expanding templates
/// against `settings`.
///
/// Fails on the first declaration that is not consistency-checked or not a
/// secure setting, and on the first error returned by `visit`.
pub fn for_each_concrete_setting<F>(
    declarations: &[SettingDeclaration],
    settings: &Settings,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(&SecureSetting) -> Result<()>,
{
    for declaration in declarations {
        match declaration {
            SettingDeclaration::Affix(affix) => {
                if !affix.is_consistent() {
                    return Err(ConcordError::NotConsistent(affix.pattern()));
                }
                for concrete in affix.concrete_settings(settings) {
                    if !concrete.is_consistent() {
                        return Err(ConcordError::NotConsistent(concrete.key().to_string()));
                    }
                    visit(&concrete)?;
                }
            }
            SettingDeclaration::Concrete(setting) => {
                if !setting.is_consistent() {
                    return Err(ConcordError::NotConsistent(setting.key().to_string()));
                }
                visit(setting)?;
            }
            SettingDeclaration::Plain { key } => {
                return Err(ConcordError::NotSecure(key.clone()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_passwords() -> AffixSetting {
        AffixSetting::consistent("remote", "secure_password")
    }

    #[test]
    fn test_secret_digest_is_sha256() {
        let settings = Settings::new().with_secure("bootstrap.password", "hunter2");
        let digest = settings.secret_digest("bootstrap.password").unwrap();
        assert_eq!(digest.as_bytes(), Sha256::digest(b"hunter2").as_slice());
        assert!(settings.secret_digest("missing").is_none());
    }

    #[test]
    fn test_empty_secret_is_not_absent() {
        let settings = Settings::new().with_secure("empty", "");
        assert!(settings.secret_digest("empty").is_some());
    }

    #[test]
    fn test_affix_namespace() {
        let affix = remote_passwords();
        assert_eq!(affix.pattern(), "remote.*.secure_password");
        assert_eq!(affix.namespace("remote.east-1.secure_password"), Some("east-1"));
        assert_eq!(affix.namespace("remote..secure_password"), None);
        assert_eq!(affix.namespace("remote.a.b.secure_password"), None);
        assert_eq!(affix.namespace("remote.east.url"), None);
        assert_eq!(affix.namespace("remotes.east.secure_password"), None);
    }

    #[test]
    fn test_affix_expands_per_namespace() {
        let settings = Settings::new()
            .with_value("remote.east.url", "https://east")
            .with_secure("remote.east.secure_password", "a")
            .with_secure("remote.west.secure_password", "b")
            .with_value("remote.north.url", "https://north");

        let keys: Vec<String> = remote_passwords()
            .concrete_settings(&settings)
            .iter()
            .map(|s| s.key().to_string())
            .collect();

        assert_eq!(
            keys,
            vec!["remote.east.secure_password", "remote.west.secure_password"]
        );
    }

    #[test]
    fn test_visits_concrete_and_expanded() {
        let settings = Settings::new()
            .with_secure("bootstrap.password", "x")
            .with_secure("remote.east.secure_password", "y");
        let declarations: Vec<SettingDeclaration> = vec![
            SecureSetting::consistent("bootstrap.password").into(),
            remote_passwords().into(),
        ];

        let mut visited = Vec::new();
        for_each_concrete_setting(&declarations, &settings, |s| {
            visited.push(s.key().to_string());
            Ok(())
        })
        .unwrap();

        assert_eq!(visited, vec!["bootstrap.password", "remote.east.secure_password"]);
    }

    #[test]
    fn test_rejects_non_consistent_declaration() {
        let declarations: Vec<SettingDeclaration> =
            vec![SecureSetting::new("plain.secret", false).into()];
        let result = for_each_concrete_setting(&declarations, &Settings::new(), |_| Ok(()));
        assert!(matches!(result, Err(ConcordError::NotConsistent(key)) if key == "plain.secret"));
    }

    #[test]
    fn test_rejects_plain_declaration() {
        let declarations = vec![SettingDeclaration::Plain {
            key: "cluster.name".to_string(),
        }];
        let result = for_each_concrete_setting(&declarations, &Settings::new(), |_| Ok(()));
        assert!(matches!(result, Err(ConcordError::NotSecure(_))));
    }

    #[test]
    fn test_consistent_declarations_filter() {
        let filtered = consistent_declarations(vec![
            SecureSetting::consistent("a").into(),
            SecureSetting::new("b", false).into(),
            SettingDeclaration::Plain {
                key: "c".to_string(),
            },
            remote_passwords().into(),
        ]);
        let keys: Vec<String> = filtered.iter().map(SettingDeclaration::key).collect();
        assert_eq!(keys, vec!["a", "remote.*.secure_password"]);
    }
}
