// ─── Rule Evaluation ───
// Mojang `rules` arrays guard libraries and arguments by OS, arch and feature.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OsRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

/// Game-argument features a launch may enable.
pub mod features {
    pub const IS_DEMO_USER: &str = "is_demo_user";
    pub const HAS_CUSTOM_RESOLUTION: &str = "has_custom_resolution";
    pub const HAS_QUICK_PLAYS_SUPPORT: &str = "has_quick_plays_support";
    pub const IS_QUICK_PLAY_SINGLEPLAYER: &str = "is_quick_play_singleplayer";
    pub const IS_QUICK_PLAY_MULTIPLAYER: &str = "is_quick_play_multiplayer";
    pub const IS_QUICK_PLAY_REALMS: &str = "is_quick_play_realms";
}

/// The host as seen by rule evaluation.
#[derive(Debug, Clone)]
pub struct Environment {
    pub os_name: &'static str,
    pub arch: &'static str,
    pub os_version: Option<String>,
    pub features: BTreeSet<String>,
}

impl Environment {
    pub fn current() -> Self {
        Self {
            os_name: current_os_name(),
            arch: current_arch(),
            os_version: sysinfo::System::os_version(),
            features: BTreeSet::new(),
        }
    }

    pub fn with_feature(mut self, feature: &str) -> Self {
        self.features.insert(feature.to_string());
        self
    }

    fn os_matches(&self, os: &OsRule) -> bool {
        if let Some(name) = &os.name {
            if name != self.os_name {
                return false;
            }
        }
        if let Some(arch) = &os.arch {
            if arch != self.arch {
                return false;
            }
        }
        if let Some(pattern) = &os.version {
            let Some(version) = &self.os_version else {
                return false;
            };
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(version) {
                        return false;
                    }
                }
                Err(e) => {
                    debug!("Ignoring rule with invalid os.version {:?}: {}", pattern, e);
                    return false;
                }
            }
        }
        true
    }

    fn features_match(&self, features: &BTreeMap<String, bool>) -> bool {
        features
            .iter()
            .all(|(name, wanted)| self.features.contains(name) == *wanted)
    }

    fn rule_applies(&self, rule: &Rule) -> bool {
        let os_ok = rule.os.as_ref().map_or(true, |os| self.os_matches(os));
        let features_ok = rule
            .features
            .as_ref()
            .map_or(true, |f| self.features_match(f));
        os_ok && features_ok
    }

    /// Evaluate a rules array.
    ///
    /// - No rules → allowed.
    /// - Otherwise start disallowed; each applicable rule sets the state to
    ///   its action, so the last applicable rule wins.
    pub fn allows(&self, rules: &[Rule]) -> bool {
        if rules.is_empty() {
            return true;
        }
        let mut allowed = false;
        for rule in rules {
            if self.rule_applies(rule) {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }
}

/// Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

/// Mojang architecture name for the current platform.
pub fn current_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x86_64",
        "x86" => "x86",
        "aarch64" => "aarch64",
        "arm" => "armv7l",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(os: &'static str, arch: &'static str, version: Option<&str>) -> Environment {
        Environment {
            os_name: os,
            arch,
            os_version: version.map(str::to_string),
            features: BTreeSet::new(),
        }
    }

    fn allow_os(name: &str) -> Rule {
        Rule {
            action: RuleAction::Allow,
            os: Some(OsRule {
                name: Some(name.into()),
                ..OsRule::default()
            }),
            features: None,
        }
    }

    #[test]
    fn no_rules_means_allowed() {
        assert!(env("linux", "x86_64", None).allows(&[]));
    }

    #[test]
    fn allow_only_matching_os() {
        let rules = vec![allow_os("osx")];
        assert!(env("osx", "aarch64", None).allows(&rules));
        assert!(!env("linux", "x86_64", None).allows(&rules));
    }

    #[test]
    fn later_disallow_overrides_allow() {
        let rules = vec![
            Rule {
                action: RuleAction::Allow,
                os: None,
                features: None,
            },
            Rule {
                action: RuleAction::Disallow,
                os: Some(OsRule {
                    name: Some("osx".into()),
                    ..OsRule::default()
                }),
                features: None,
            },
        ];
        assert!(env("linux", "x86_64", None).allows(&rules));
        assert!(!env("osx", "x86_64", None).allows(&rules));
    }

    #[test]
    fn arch_and_version_constraints() {
        let rules: Vec<Rule> = serde_json::from_value(serde_json::json!([
            {"action": "allow", "os": {"name": "windows", "version": "^10\\."}},
            {"action": "disallow", "os": {"arch": "x86"}}
        ]))
        .unwrap();

        assert!(env("windows", "x86_64", Some("10.0.19045")).allows(&rules));
        assert!(!env("windows", "x86_64", Some("6.1")).allows(&rules));
        assert!(!env("windows", "x86_64", None).allows(&rules));
        assert!(!env("windows", "x86", Some("10.0")).allows(&rules));
    }

    #[test]
    fn feature_rules_need_enabled_features() {
        let rules: Vec<Rule> = serde_json::from_value(serde_json::json!([
            {"action": "allow", "features": {"is_quick_play_multiplayer": true}}
        ]))
        .unwrap();

        let host = env("linux", "x86_64", None);
        assert!(!host.allows(&rules));
        assert!(host
            .with_feature(features::IS_QUICK_PLAY_MULTIPLAYER)
            .allows(&rules));
    }
}
