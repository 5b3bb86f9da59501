//! Publishing and verifying hashes of consistent secure settings.
//!
//! The elected coordinator publishes salted hashes of its local secure
//! setting values into cluster metadata. Every node can then check that its
//! own values hash to the same thing without the values leaving the node.
//!
//! The coordinator's view is authoritative: when the coordinator itself
//! disagrees with what is published the check fails hard. On other nodes a
//! disagreement only turns the verdict to `false`.

use std::collections::BTreeSet;
use std::sync::Arc;

use concord_common::{ConcordError, ConsistencyReport, PublishedEntry, PublishedHashes, Result};

use crate::cluster::{ClusterService, ClusterState, HashesPublisher};
use crate::hash;
use crate::settings::{self, SecureSetting, SettingDeclaration, Settings};

/// Comparison of one setting's local value with its published entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingVerdict {
    /// Both absent, or the recomputed hash matches
    Consistent,
    /// Published but not set locally
    MissingLocal,
    /// Set locally but not published
    MissingPublished,
    /// Local value hashes differently under the published salt
    Mismatch { published: String, computed: String },
    /// Published entry is not `salt:hash`
    Malformed,
}

/// Compare a local digest against a published entry.
///
/// Knows nothing about leadership; the caller decides what a verdict means.
pub fn compare(local: Option<&[u8]>, published: Option<&str>) -> Result<SettingVerdict> {
    let (local, published) = match (local, published) {
        (None, None) => return Ok(SettingVerdict::Consistent),
        (None, Some(_)) => return Ok(SettingVerdict::MissingLocal),
        (Some(_), None) => return Ok(SettingVerdict::MissingPublished),
        (Some(local), Some(published)) => (local, published),
    };

    let Some(entry) = PublishedEntry::parse(published) else {
        return Ok(SettingVerdict::Malformed);
    };
    let Some(salt) = hash::decode_salt(&entry.salt) else {
        return Ok(SettingVerdict::Malformed);
    };

    let computed = hash::encoded_hash(local, &salt)?;
    if computed == entry.hash {
        Ok(SettingVerdict::Consistent)
    } else {
        Ok(SettingVerdict::Mismatch {
            published: entry.hash,
            computed,
        })
    }
}

/// Publishes and verifies hashes for a fixed collection of consistent
/// secure setting declarations.
pub struct ConsistentSettingsService {
    settings: Arc<Settings>,
    cluster: Arc<dyn ClusterService>,
    declarations: Vec<SettingDeclaration>,
}

impl ConsistentSettingsService {
    /// Fails if the hash primitive is unusable
    pub fn new(
        settings: Arc<Settings>,
        cluster: Arc<dyn ClusterService>,
        declarations: Vec<SettingDeclaration>,
    ) -> Result<Self> {
        hash::self_test()?;
        Ok(Self {
            settings,
            cluster,
            declarations,
        })
    }

    pub fn declarations(&self) -> &[SettingDeclaration] {
        &self.declarations
    }

    /// Publisher for the current term, with its hashes computed eagerly.
    ///
    /// Secure values changed afterwards are not picked up until the next
    /// publisher is built.
    pub fn new_hash_publisher(&self) -> Result<HashesPublisher> {
        let computed = self.compute_hashes_of_consistent_settings()?;
        Ok(HashesPublisher::new(computed, self.cluster.clone()))
    }

    /// `{key -> "salt:hash"}` for every concrete setting that has a local
    /// value, each with a fresh salt.
    pub fn compute_hashes_of_consistent_settings(&self) -> Result<PublishedHashes> {
        let mut hashes = PublishedHashes::new();
        self.for_each_concrete_setting(|setting| {
            if let Some(digest) = setting.local_digest(&self.settings) {
                let entry = hash::publish_entry(digest.as_bytes())?;
                hashes.insert(setting.key().to_string(), entry.to_string());
            }
            Ok(())
        })?;
        Ok(hashes)
    }

    /// Verify local values against the latest published hashes.
    ///
    /// `Ok(false)` reports a soft disagreement. `Err` means the check was
    /// aborted: a malformed published entry on any node, or a coordinator
    /// that disagrees with what is published.
    pub fn are_all_consistent(&self) -> Result<bool> {
        self.verify(&self.cluster.state())
    }

    /// Run the check and package the outcome for health callers
    pub fn report(&self) -> ConsistencyReport {
        let state = self.cluster.state();
        let outcome = self.verify(&state).map_err(|e| e.to_string());
        ConsistencyReport::new(state.local_node_id().to_string(), state.version(), outcome)
    }

    fn verify(&self, state: &ClusterState) -> Result<bool> {
        let published = state.metadata().hashes_of_consistent_settings();
        let is_leader = state.is_local_node_elected_leader();
        let mut unverified: BTreeSet<&str> = published.keys().map(String::as_str).collect();
        let mut all_consistent = true;

        self.for_each_concrete_setting(|setting| {
            let key = setting.key();
            let local = setting.local_digest(&self.settings);
            let published_entry = published.get(key).map(String::as_str);

            match compare(local.as_ref().map(|d| d.as_bytes()), published_entry)? {
                SettingVerdict::Consistent if local.is_none() => {
                    tracing::debug!(
                        key = %key,
                        "No published hash for the consistent secure setting but it also does NOT exist on the local node"
                    );
                }
                SettingVerdict::Consistent => {}
                SettingVerdict::MissingLocal => {
                    tracing::warn!(
                        key = %key,
                        "The consistent secure setting does not exist on the local node but there is a published hash for it"
                    );
                    all_consistent = false;
                }
                SettingVerdict::MissingPublished => {
                    tracing::warn!(
                        key = %key,
                        "No published hash for the consistent secure setting but it exists on the local node"
                    );
                    if is_leader {
                        return Err(ConcordError::CoordinatorInconsistent {
                            key: key.to_string(),
                            reason: "no published hash but the setting exists".to_string(),
                        });
                    }
                    all_consistent = false;
                }
                SettingVerdict::Mismatch {
                    published: published_hash,
                    computed,
                } => {
                    tracing::warn!(
                        key = %key,
                        published = %published_hash,
                        computed = %computed,
                        "The published hash of the consistent secure setting differs from the locally computed one"
                    );
                    if is_leader {
                        return Err(ConcordError::CoordinatorInconsistent {
                            key: key.to_string(),
                            reason: format!(
                                "the published hash [{published_hash}] differs from the locally computed one [{computed}]"
                            ),
                        });
                    }
                    all_consistent = false;
                }
                SettingVerdict::Malformed => {
                    return Err(ConcordError::MalformedPublishedHash {
                        key: key.to_string(),
                        value: published_entry.unwrap_or_default().to_string(),
                    });
                }
            }

            unverified.remove(key);
            Ok(())
        })?;

        // Published keys of templates that did not expand locally to them
        for key in unverified {
            let template = self.declarations.iter().find(|declaration| {
                matches!(declaration, SettingDeclaration::Affix(affix) if affix.matches(key))
            });
            if let Some(template) = template {
                tracing::warn!(
                    key = %key,
                    pattern = %template.key(),
                    "The consistent secure setting does not exist on the local node but there is a published hash for it"
                );
                all_consistent = false;
            }
        }

        Ok(all_consistent)
    }

    fn for_each_concrete_setting<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(&SecureSetting) -> Result<()>,
    {
        settings::for_each_concrete_setting(&self.declarations, &self.settings, visit)
    }
}
