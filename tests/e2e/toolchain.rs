//! Cold build, warm rebuild and source-edit scenarios over the toolchain
//! factories, driven by the stub compiler.

use crate::support::*;
use anyhow::Result;
use bpp::build::Build;
use bpp::toolchain::ExeOpts;

fn configure_demo(b: &mut Build) -> Result<()> {
    let exe = b.add_executable(
        ExeOpts {
            name: "main".into(),
            desc: "Demo binary".into(),
            ..Default::default()
        },
        &["src/main.c", "src/other.c"],
    )?;
    b.install_exe(&exe)?;
    Ok(())
}

fn demo_space() -> Result<(TestSpace, std::path::PathBuf)> {
    let space = TestSpace::new()?;
    space.write("src/main.c", "#include \"util.h\"\nmain-body\n")?;
    space.write("src/other.c", "other-body\n")?;
    space.write("src/util.h", "util-v1\n")?;
    let cc = space.write_executable("cc.sh", STUB_CC)?;
    Ok((space, cc))
}

#[test]
fn cold_build_compiles_links_and_installs() -> Result<()> {
    let (space, cc) = demo_space()?;
    let (code, lines) = run_build(&space, Some(&cc), &["install"], configure_demo)?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] main completed");

    // The linked binary is the concatenation of both objects; the first
    // object carries its header's content.
    let installed = space.read("build/bin/main")?;
    assert!(installed.contains("main-body"));
    assert!(installed.contains("util-v1"));
    assert!(installed.contains("other-body"));

    // Two scan depfiles, two objects, one link artifact, one install marker.
    assert_eq!(space.artifact_count(), 6);
    assert_eq!(space.cc_log(&cc).len(), 3);
    Ok(())
}

#[test]
fn warm_rebuild_is_a_no_op() -> Result<()> {
    let (space, cc) = demo_space()?;
    run_build(&space, Some(&cc), &["install"], configure_demo)?;
    let invocations = space.cc_log(&cc).len();

    let (code, lines) = run_build(&space, Some(&cc), &["-v", "install"], configure_demo)?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] main up-to-date");
    assert_not_contains(&lines, "completed");
    // No compile or link subprocess ran.
    assert_eq!(space.cc_log(&cc).len(), invocations);
    Ok(())
}

#[test]
fn source_edit_reruns_exactly_the_affected_actions() -> Result<()> {
    let (space, cc) = demo_space()?;
    run_build(&space, Some(&cc), &["install"], configure_demo)?;
    let before = space.cc_log(&cc).len();

    // Editing the header invalidates main.o (which includes it) and the
    // link, but not other.o.
    space.write("src/util.h", "util-v2\n")?;
    let (code, _) = run_build(&space, Some(&cc), &["install"], configure_demo)?;
    assert_eq!(code, 0);
    let log = space.cc_log(&cc);
    assert_eq!(log.len(), before + 2, "log: {:?}", log);
    assert!(log[before].contains("main.c"));
    assert_eq!(log[before + 1], "link");

    // The re-installed binary carries the new header content.
    assert!(space.read("build/bin/main")?.contains("util-v2"));
    Ok(())
}

#[test]
fn requesting_build_makes_all_targets() -> Result<()> {
    let (space, cc) = demo_space()?;
    let (code, lines) = run_build(&space, Some(&cc), &["build"], configure_demo)?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] main completed");
    // No install requested: nothing under the prefix yet.
    assert!(!space.exists("build/bin/main"));
    assert_eq!(space.cc_log(&cc).len(), 3);
    Ok(())
}

#[test]
fn shared_library_links_with_its_objects() -> Result<()> {
    let (space, cc) = demo_space()?;
    let (code, lines) = run_build(&space, Some(&cc), &["libdemo.so"], |b| {
        let lib = b.add_library(
            bpp::toolchain::LibOpts {
                name: "demo".into(),
                desc: "Demo library".into(),
                obj: Default::default(),
                kind: bpp::toolchain::LibKind::Shared,
            },
            &["src/other.c"],
        )?;
        b.install_lib(&lib)?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] libdemo.so completed");
    Ok(())
}

#[test]
fn static_library_archives_with_ar() -> Result<()> {
    // Needs a real archiver on PATH.
    if !std::env::split_paths(&std::env::var_os("PATH").unwrap_or_default())
        .any(|dir| dir.join("ar").is_file() || dir.join("llvm-ar").is_file())
    {
        return Ok(());
    }
    let (space, cc) = demo_space()?;
    let (code, _) = run_build(&space, Some(&cc), &["install"], |b| {
        let lib = b.add_library(
            bpp::toolchain::LibOpts {
                name: "demo".into(),
                desc: "Demo archive".into(),
                obj: Default::default(),
                kind: bpp::toolchain::LibKind::Static,
            },
            &["src/other.c"],
        )?;
        b.install_lib(&lib)?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    // `ar` archives start with the global header magic.
    let archive = std::fs::read(space.path().join("build/lib/libdemo.a"))?;
    assert!(archive.starts_with(b"!<arch>"), "not an archive");
    Ok(())
}

#[test]
fn flag_change_recompiles() -> Result<()> {
    let (space, cc) = demo_space()?;
    run_build(&space, Some(&cc), &["build"], configure_demo)?;
    let before = space.cc_log(&cc).len();

    let (code, _) = run_build(&space, Some(&cc), &["build"], |b| {
        let exe = b.add_executable(
            ExeOpts {
                name: "main".into(),
                desc: "Demo binary".into(),
                obj: bpp::flags::FlagOverlay {
                    defines: vec![bpp::flags::Define::new("NDEBUG", "")],
                    ..Default::default()
                },
                ..Default::default()
            },
            &["src/main.c", "src/other.c"],
        )?;
        b.install_exe(&exe)?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    // Both objects and the link re-ran under the new define.
    assert_eq!(space.cc_log(&cc).len(), before + 3);
    Ok(())
}
