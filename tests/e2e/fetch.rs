//! Fetch-by-URL integrity, using `file://` URLs so no network is involved.
//! Skipped when curl is unavailable.

use crate::support::*;
use anyhow::Result;
use bpp::hash::Fingerprint;

fn curl_available() -> bool {
    std::process::Command::new("curl")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[test]
fn fetch_with_matching_hash_promotes_the_artifact() -> Result<()> {
    if !curl_available() {
        return Ok(());
    }
    let space = TestSpace::new()?;
    let blob = space.write("upstream.tar", "pretend tarball")?;
    let expected = bpp::hash::hash_file(&blob)?;
    let url = format!("file://{}", blob.display());

    let (code, lines) = run_build(&space, None, &["tarball"], move |b| {
        b.fetch_url("tarball", &url, expected)?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] tarball completed");
    assert_eq!(
        space.read(&format!(".cache/arts/{}", expected))?,
        "pretend tarball"
    );
    Ok(())
}

/// Child half of the mismatch test: the worker failure aborts the process.
#[test]
fn fetch_mismatch_child() {
    let Ok(dir) = std::env::var("BPP_E2E_FETCH_DIR") else {
        return;
    };
    let root = std::path::PathBuf::from(dir);
    let blob = root.join("upstream.tar");
    let url = format!("file://{}", blob.display());
    let mut build = bpp::build::Build::new(
        vec!["bpp-test".into(), "tarball".into()],
        bpp::build::BuildEnv {
            root,
            cache_prefix: None,
            install_prefix: None,
            cxx: None,
            cxxflags: None,
        },
    )
    .unwrap();
    build.fetch_url("tarball", &url, Fingerprint(12345)).unwrap();
    let _ = build.execute();
    unreachable!("hash mismatch must abort the process");
}

#[test]
fn fetch_mismatch_is_fatal_and_reports_both_hashes() -> Result<()> {
    if !curl_available() {
        return Ok(());
    }
    let space = TestSpace::new()?;
    let blob = space.write("upstream.tar", "pretend tarball")?;
    let actual = bpp::hash::hash_file(&blob)?;
    let root = space.leak();

    let out = std::process::Command::new(std::env::current_exe()?)
        .args(["fetch::fetch_mismatch_child", "--exact", "--nocapture"])
        .env("BPP_E2E_FETCH_DIR", &root)
        .output()?;
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("hash mismatch"), "stderr: {stderr}");
    // Both fingerprints appear in decimal.
    assert!(stderr.contains("12345"), "stderr: {stderr}");
    assert!(stderr.contains(&actual.to_string()), "stderr: {stderr}");

    // Nothing was promoted for the bogus fingerprint.
    assert!(!root.join(".cache/arts/12345").exists());
    std::fs::remove_dir_all(&root).ok();
    Ok(())
}
