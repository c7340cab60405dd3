use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

use super::archive::{read_entries, write_entries};
use crate::pipeline::template::StripMode;

/// Load the set of obfuscated class names (slash separated) named by a
/// mappings or class-list file.
///
/// Understands TSRG (v1 and v2), SRG `CL:` lines, ProGuard client/server
/// mappings, and plain one-class-per-line lists.
pub fn load_class_set(path: &Path) -> Result<BTreeSet<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read class list {:?}", path))?;
    Ok(parse_class_set(&text))
}

fn parse_class_set(text: &str) -> BTreeSet<String> {
    let mut classes = BTreeSet::new();
    for (index, line) in text.lines().enumerate() {
        if line.starts_with(|c: char| c.is_whitespace()) {
            continue;
        }
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() || (index == 0 && line.starts_with("tsrg2 ")) {
            continue;
        }

        let class = if let Some(rest) = line.strip_prefix("CL:") {
            rest.split_whitespace().next()
        } else if let Some((_, obf)) = line.split_once(" -> ") {
            obf.strip_suffix(':')
        } else if line.contains(':') {
            // SRG member lines (FD:, MD:, PK:)
            None
        } else {
            line.split_whitespace().next()
        };

        if let Some(class) = class {
            let class = class.trim_end_matches(".class").replace('.', "/");
            classes.insert(class);
        }
    }
    classes
}

fn class_name(entry: &str) -> Option<&str> {
    entry.strip_suffix(".class")
}

pub(super) fn strip_jar(input: &Path, mappings: &Path, mode: StripMode, output: &Path) -> Result<()> {
    let classes = load_class_set(mappings)?;
    let entries = read_entries(input)?;
    let total = entries.len();

    let kept: std::collections::BTreeMap<String, Vec<u8>> = entries
        .into_iter()
        .filter(|(name, _)| {
            let listed = class_name(name).map_or(false, |c| classes.contains(c));
            match mode {
                StripMode::Whitelist => listed,
                StripMode::Blacklist => !listed,
            }
        })
        .collect();

    log::debug!(
        "Stripped {:?}: kept {} of {} entries ({:?})",
        input,
        kept.len(),
        total,
        mode
    );
    write_entries(output, &kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ops::archive::tests::jar;

    #[test]
    fn test_parse_tsrg() {
        let set = parse_class_set("a net/minecraft/client/Main\n\tb run\nb$c net/minecraft/Foo$Bar\n");
        assert_eq!(set, BTreeSet::from(["a".to_string(), "b$c".to_string()]));
    }

    #[test]
    fn test_parse_tsrg2_header_skipped() {
        let set = parse_class_set("tsrg2 obf srg\na net/minecraft/Foo\n\tb ()V m_1_\n");
        assert_eq!(set, BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_parse_srg_and_proguard() {
        let srg = parse_class_set("PK: . net/minecraft\nCL: a net/minecraft/Foo\nFD: a/b net/minecraft/Foo/f_1_\n");
        assert_eq!(srg, BTreeSet::from(["a".to_string()]));

        let proguard = parse_class_set(
            "# compiler: R8\nnet.minecraft.client.Main -> a:\n    void run() -> b\nnet.minecraft.Foo$Bar -> b$c:\n",
        );
        assert_eq!(proguard, BTreeSet::from(["a".to_string(), "b$c".to_string()]));
    }

    #[test]
    fn test_whitelist_and_blacklist() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("joined.jar");
        jar(
            &input,
            &[("a.class", "A"), ("b.class", "B"), ("com/lib/X.class", "X"), ("assets/lang.json", "{}")],
        );
        let mappings = dir.path().join("joined.tsrg");
        std::fs::write(&mappings, "a net/minecraft/A\nb net/minecraft/B\n").unwrap();

        let kept = dir.path().join("kept.jar");
        strip_jar(&input, &mappings, StripMode::Whitelist, &kept).unwrap();
        let names: Vec<String> = read_entries(&kept).unwrap().into_keys().collect();
        assert_eq!(names, vec!["a.class", "b.class"]);

        let removed = dir.path().join("removed.jar");
        strip_jar(&input, &mappings, StripMode::Blacklist, &removed).unwrap();
        let names: Vec<String> = read_entries(&removed).unwrap().into_keys().collect();
        assert_eq!(names, vec!["assets/lang.json", "com/lib/X.class"]);
    }
}
