use std::{
    collections::BTreeMap,
    path::PathBuf,
};

use glob::Pattern;

use crate::{
    device::{DeviceRecord, DeviceSnapshot, SelectionRule},
    error::VolumeError,
};

/// Applies a list of selection rules to a snapshot.
///
/// A device is included when any rule matches it in full (rules are a union,
/// fields within a rule a conjunction). The result is deduplicated by device
/// node and ordered lexicographically.
pub fn filter(
    snapshot: &DeviceSnapshot,
    rules: &[SelectionRule],
) -> Result<BTreeMap<PathBuf, DeviceRecord>, VolumeError> {
    let compiled = rules
        .iter()
        .map(CompiledRule::compile)
        .collect::<Result<Vec<_>, _>>()?;

    let mut matched = BTreeMap::new();
    for record in snapshot.records() {
        if compiled.iter().any(|rule| rule.matches(record)) {
            matched.insert(record.devnode.clone(), record.clone());
        }
    }
    Ok(matched)
}

/// The sorted device nodes matched by the selection rules.
pub fn device_nodes(
    snapshot: &DeviceSnapshot,
    rules: &[SelectionRule],
) -> Result<Vec<PathBuf>, VolumeError> {
    Ok(filter(snapshot, rules)?.into_keys().collect())
}

struct CompiledRule {
    subsystems: Vec<Pattern>,
    names: Vec<Pattern>,
    tags: Vec<Pattern>,
    properties: Vec<(Pattern, Pattern)>,
    attrs: Vec<(Pattern, Pattern)>,
}

impl CompiledRule {
    fn compile(rule: &SelectionRule) -> Result<Self, VolumeError> {
        Ok(Self {
            subsystems: compile_globs(&rule.subsystems)?,
            names: compile_globs(&rule.names)?,
            tags: compile_globs(&rule.tags)?,
            properties: compile_glob_pairs(&rule.properties)?,
            attrs: compile_glob_pairs(&rule.attrs)?,
        })
    }

    fn matches(&self, record: &DeviceRecord) -> bool {
        self.subsystems
            .iter()
            .all(|pattern| pattern.matches(&record.subsystem))
            && self.names.iter().all(|pattern| pattern.matches(&record.sysname))
            // Tags are a cover relation: every tag pattern of the rule must
            // hit at least one tag of the device.
            && self
                .tags
                .iter()
                .all(|pattern| record.tags.iter().any(|tag| pattern.matches(tag)))
            && mapping_matches(&self.properties, &record.properties)
            && mapping_matches(&self.attrs, &record.sysattrs)
    }
}

/// Every `(key glob, value glob)` pair must be witnessed by some entry whose
/// key matches the key glob and whose value matches the value glob.
fn mapping_matches(pairs: &[(Pattern, Pattern)], mapping: &BTreeMap<String, String>) -> bool {
    pairs.iter().all(|(key_glob, value_glob)| {
        mapping
            .iter()
            .any(|(key, value)| key_glob.matches(key) && value_glob.matches(value))
    })
}

fn compile_globs(globs: &[String]) -> Result<Vec<Pattern>, VolumeError> {
    globs.iter().map(|glob| compile_glob(glob)).collect()
}

fn compile_glob_pairs(
    pairs: &BTreeMap<String, String>,
) -> Result<Vec<(Pattern, Pattern)>, VolumeError> {
    pairs
        .iter()
        .map(|(key, value)| Ok((compile_glob(key)?, compile_glob(value)?)))
        .collect()
}

fn compile_glob(glob: &str) -> Result<Pattern, VolumeError> {
    Pattern::new(glob).map_err(|source| VolumeError::BadGlobPattern {
        pattern: glob.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;

    use crate::testutils::{disk_record, record_with};

    use super::*;

    fn sample_snapshot() -> DeviceSnapshot {
        [
            disk_record("/dev/sda", "8", "0"),
            disk_record("/dev/sdb", "8", "16"),
            record_with("/dev/ttyS0", |record| {
                record.sysname = "ttyS0".to_string();
                record.subsystem = "tty".to_string();
            }),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_empty_rule_matches_everything() {
        let snapshot = sample_snapshot();
        let matched = filter(&snapshot, &[SelectionRule::default()]).unwrap();
        assert_eq!(matched.len(), 3);
    }

    #[test]
    fn test_no_rules_match_nothing() {
        let snapshot = sample_snapshot();
        assert!(filter(&snapshot, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_subsystem_and_name_globs() {
        let snapshot = sample_snapshot();
        let rule = SelectionRule {
            subsystems: vec!["block".to_string()],
            names: vec!["sd*".to_string()],
            ..SelectionRule::default()
        };
        let matched = device_nodes(&snapshot, &[rule]).unwrap();
        assert_eq!(
            matched,
            vec![PathBuf::from("/dev/sda"), PathBuf::from("/dev/sdb")]
        );
    }

    #[test]
    fn test_all_field_globs_must_match() {
        let snapshot = sample_snapshot();
        let rule = SelectionRule {
            subsystems: vec!["block".to_string(), "tty".to_string()],
            ..SelectionRule::default()
        };
        assert!(filter(&snapshot, &[rule]).unwrap().is_empty());
    }

    #[test]
    fn test_rules_are_a_union_with_dedup() {
        let snapshot = sample_snapshot();
        let sd = SelectionRule {
            names: vec!["sd*".to_string()],
            ..SelectionRule::default()
        };
        let sda_again = SelectionRule {
            names: vec!["sda".to_string()],
            ..SelectionRule::default()
        };
        let matched = device_nodes(&snapshot, &[sd, sda_again]).unwrap();
        // Deduplicated by device node and sorted.
        assert_eq!(
            matched,
            vec![PathBuf::from("/dev/sda"), PathBuf::from("/dev/sdb")]
        );
    }

    #[test]
    fn test_tag_cover_semantics() {
        let snapshot: DeviceSnapshot = [record_with("/dev/sda", |record| {
            record.tags = ["systemd".to_string(), "seat".to_string()]
                .into_iter()
                .collect();
        })]
        .into_iter()
        .collect();

        // Each rule glob needs only some matching tag, not all of them.
        let covered = SelectionRule {
            tags: vec!["sys*".to_string(), "seat".to_string()],
            ..SelectionRule::default()
        };
        assert_eq!(filter(&snapshot, &[covered]).unwrap().len(), 1);

        // A glob matched by no device tag cancels the device.
        let uncovered = SelectionRule {
            tags: vec!["systemd".to_string(), "missing".to_string()],
            ..SelectionRule::default()
        };
        assert!(filter(&snapshot, &[uncovered]).unwrap().is_empty());
    }

    #[test]
    fn test_property_pairs_need_a_witness() {
        let snapshot = sample_snapshot();
        let matched = filter(
            &snapshot,
            &[SelectionRule {
                properties: btreemap! {
                    "DEVTYPE".to_string() => "disk".to_string(),
                    "MAJOR".to_string() => "8".to_string(),
                },
                ..SelectionRule::default()
            }],
        )
        .unwrap();
        assert_eq!(matched.len(), 2);

        let unmatched = filter(
            &snapshot,
            &[SelectionRule {
                properties: btreemap! {
                    "DEVTYPE".to_string() => "partition".to_string(),
                },
                ..SelectionRule::default()
            }],
        )
        .unwrap();
        assert!(unmatched.is_empty());
    }

    #[test]
    fn test_attr_pairs_match_sysattrs() {
        let snapshot: DeviceSnapshot = [record_with("/dev/sda", |record| {
            record.sysattrs = btreemap! {
                "size".to_string() => "4096".to_string(),
                "ro".to_string() => "0".to_string(),
            };
        })]
        .into_iter()
        .collect();

        let rule = SelectionRule {
            attrs: btreemap! { "size".to_string() => "4*".to_string() },
            ..SelectionRule::default()
        };
        assert_eq!(filter(&snapshot, &[rule]).unwrap().len(), 1);
    }

    #[test]
    fn test_bad_glob_is_rejected() {
        let snapshot = sample_snapshot();
        let rule = SelectionRule {
            names: vec!["sd[".to_string()],
            ..SelectionRule::default()
        };
        let err = filter(&snapshot, &[rule]).unwrap_err();
        assert!(matches!(err, VolumeError::BadGlobPattern { pattern, .. } if pattern == "sd["));
    }
}
