use crucible_lib::utils::version::{MinecraftVersion, VersionKind};
use crucible_lib::Error;
use std::cmp::Ordering;

fn v(raw: &str) -> MinecraftVersion {
    MinecraftVersion::parse(raw).expect("valid version")
}

#[test]
fn releases_snapshots_and_prereleases_interleave() {
    assert!(v("1.16.5") < v("1.17"));
    assert!(v("1.17") < v("21w37a"));
    assert!(v("21w37a") < v("1.18"));

    assert!(v("1.14-pre1") < v("1.14-rc1"));
    assert!(v("1.14-rc1") < v("1.14"));
    assert_eq!(v("21w37a").kind(), VersionKind::Snapshot);
}

#[test]
fn ordering_is_antisymmetric_and_transitive() {
    let raws = [
        "1.0", "1.0.0", "1.7.10", "1.14-pre1", "1.14 Pre-Release 1", "1.14-rc1", "1.14", "19w14a",
        "1.16.5", "20w14infinite", "1.17", "21w37a", "1.18", "b1.7.3", "a1.2.6", "rd-132211",
        "15w14a", "15w35a", "1.9.1", "24w14potato", "24w14a", "1.20.5",
    ];
    let versions: Vec<MinecraftVersion> = raws.iter().map(|r| v(r)).collect();

    for a in &versions {
        assert_eq!(a.cmp(a), Ordering::Equal);
        for b in &versions {
            assert_eq!(a.cmp(b), b.cmp(a).reverse(), "{} vs {}", a, b);
            for c in &versions {
                if a < b && b < c {
                    assert!(a < c, "{} < {} < {}", a, b, c);
                }
            }
        }
    }
}

#[test]
fn equality_is_textual() {
    let dashed = v("1.14-pre1");
    let spelled = v("1.14 Pre-Release 1");
    assert_ne!(dashed, spelled);
    assert_eq!(dashed.compare_semantic(&spelled), Ordering::Equal);
    assert_ne!(dashed.cmp(&spelled), Ordering::Equal);
    assert!(v("1.0") < v("1.0.0"));
}

#[test]
fn display_round_trips() {
    for raw in ["1.19.2", "22w13oneblockatatime", "1.14 Pre-Release 1", "b1.7.3", "3D Shareware v1.34"] {
        assert_eq!(v(raw).to_string(), raw);
    }
}

#[test]
fn malformed_versions_are_rejected() {
    for raw in ["", "banana", "rd-999", "1..2"] {
        let err = MinecraftVersion::parse(raw).expect_err(raw);
        assert!(matches!(err, Error::InvalidVersionFormat { .. }), "{}", raw);
    }
}
