//! Engine-level scenarios: user steps, caching, cycles, install semantics,
//! and process-fatal action failures (run in a child process, since a
//! worker failure aborts the whole process).

use crate::support::*;
use anyhow::{bail, Result};
use bpp::graph::{HasherOpts, StepOptions};

#[test]
fn user_step_runs_once_then_caches() -> Result<()> {
    let space = TestSpace::new()?;
    let configure = |marker: &'static str| {
        move |b: &mut bpp::build::Build| {
            let step = b.add_step(StepOptions {
                name: "gen".into(),
                desc: "Generate a file".into(),
                ..Default::default()
            })?;
            b.set_inputs_hasher(
                step,
                HasherOpts {
                    stable_id: "gen".into(),
                    ..Default::default()
                },
            )?;
            b.set_action(step, move |cx, out| {
                std::fs::write(cx.root.join(marker), b"ran")?;
                std::fs::write(out, b"generated")?;
                Ok(())
            })?;
            Ok(())
        }
    };

    let (code, lines) = run_build(&space, None, &["gen"], configure("first"))?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] gen completed");
    assert!(space.exists("first"));

    // Same stable hash: the second invocation short-circuits.
    let (_, lines) = run_build(&space, None, &["-v", "gen"], configure("second"))?;
    assert_contains(&lines, "[step] gen up-to-date");
    assert!(!space.exists("second"));
    Ok(())
}

#[test]
fn phony_steps_run_every_invocation() -> Result<()> {
    let space = TestSpace::new()?;
    let configure = |b: &mut bpp::build::Build| {
        let step = b.add_step(StepOptions {
            name: "tick".into(),
            desc: "Append to a log".into(),
            phony: true,
            ..Default::default()
        })?;
        b.set_action(step, |cx, _out| {
            let log = cx.root.join("ticks");
            let mut text = std::fs::read_to_string(&log).unwrap_or_default();
            text.push('x');
            std::fs::write(&log, text)?;
            Ok(())
        })?;
        Ok(())
    };
    run_build(&space, None, &["tick"], configure)?;
    run_build(&space, None, &["tick"], configure)?;
    assert_eq!(space.read("ticks")?, "xx");
    Ok(())
}

#[test]
fn step_chain_passes_artifacts_through_input_edges() -> Result<()> {
    let space = TestSpace::new()?;
    space.write("seed.txt", "seed")?;
    let (code, _) = run_build(&space, None, &["upper"], |b| {
        let file = b.add_file("seed.txt")?;
        let upper = b.add_step(StepOptions {
            name: "upper".into(),
            desc: "Uppercase the seed".into(),
            ..Default::default()
        })?;
        let bpp::graph::Input::Step { id: file_step, .. } = file else {
            unreachable!()
        };
        b.add_input_step(upper, file_step, None)?;
        b.set_inputs_hasher(
            upper,
            HasherOpts {
                stable_id: "upper".into(),
                ..Default::default()
            },
        )?;
        b.set_action(upper, move |cx, out| {
            let inputs = cx.inputs(upper)?;
            let text = std::fs::read_to_string(&inputs[0])?;
            std::fs::write(out, text.to_uppercase())?;
            Ok(())
        })?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    // The uppercase artifact landed in the cache.
    let arts = space.path().join(".cache/arts");
    let found = std::fs::read_dir(arts)?
        .filter_map(|e| std::fs::read_to_string(e.ok()?.path()).ok())
        .any(|text| text == "SEED");
    assert!(found);
    Ok(())
}

#[test]
fn cycles_are_fatal_with_a_named_path() -> Result<()> {
    let space = TestSpace::new()?;
    let err = run_build(&space, None, &["a"], |b| {
        let a = b.add_step(StepOptions {
            name: "a".into(),
            ..Default::default()
        })?;
        let bstep = b.add_step(StepOptions {
            name: "b".into(),
            ..Default::default()
        })?;
        b.depend_on(a, bstep)?;
        b.depend_on(bstep, a)?;
        Ok(())
    })
    .unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("dependency cycle"), "unexpected: {msg}");
    assert!(msg.contains("a -> b -> a") || msg.contains("b -> a -> b"), "unexpected: {msg}");
    Ok(())
}

#[test]
fn install_short_circuits_without_probing_the_destination() -> Result<()> {
    let space = TestSpace::new()?;
    space.write("data.txt", "payload")?;
    let configure = |b: &mut bpp::build::Build| {
        let file = b.add_file("data.txt")?;
        let bpp::graph::Input::Step { id: file_step, .. } = file else {
            unreachable!()
        };
        b.install(file_step, "share/data.txt")?;
        Ok(())
    };
    run_build(&space, None, &["install"], configure)?;
    assert_eq!(space.read("build/share/data.txt")?, "payload");

    // Deleting the installed file does not force a re-install: the cached
    // marker for this destination is authoritative.
    std::fs::remove_file(space.path().join("build/share/data.txt"))?;
    run_build(&space, None, &["install"], configure)?;
    assert!(!space.exists("build/share/data.txt"));
    Ok(())
}

#[test]
fn silent_mode_suppresses_progress() -> Result<()> {
    let space = TestSpace::new()?;
    let (code, lines) = run_build(&space, None, &["-s", "noisy"], |b| {
        let step = b.add_step(StepOptions {
            name: "noisy".into(),
            ..Default::default()
        })?;
        b.set_inputs_hasher(
            step,
            HasherOpts {
                stable_id: "noisy".into(),
                ..Default::default()
            },
        )?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    // Lines are still captured for the test, but the step did run.
    assert_contains(&lines, "noisy completed");
    Ok(())
}

#[test]
fn header_installation_copies_immediately() -> Result<()> {
    let space = TestSpace::new()?;
    space.write("api/demo.h", "int demo();\n")?;
    let (code, _) = run_build(&space, None, &["build"], |b| {
        b.install_headers(&["api/demo.h"], "demo")?;
        Ok(())
    })?;
    assert_eq!(code, 0);
    assert_eq!(space.read("build/include/demo/api/demo.h")?, "int demo();\n");
    Ok(())
}

#[cfg(unix)]
#[test]
fn run_steps_execute_the_built_binary_with_args() -> Result<()> {
    let space = TestSpace::new()?;
    let configure = |b: &mut bpp::build::Build| {
        let tool = b.add_step(StepOptions {
            name: "tool".into(),
            desc: "A tiny script".into(),
            silent: true,
            ..Default::default()
        })?;
        b.set_inputs_hasher(
            tool,
            HasherOpts {
                stable_id: "tool".into(),
                ..Default::default()
            },
        )?;
        b.set_action(tool, |_cx, out| {
            use std::os::unix::fs::PermissionsExt;
            std::fs::write(out, "#!/bin/sh\necho \"$@\" > ran.txt\n")?;
            std::fs::set_permissions(out, std::fs::Permissions::from_mode(0o755))?;
            Ok(())
        })?;
        let exe = bpp::toolchain::Exe {
            step: tool,
            name: "tool".into(),
        };
        b.add_run_exe(
            &exe,
            bpp::actions::RunOptions {
                name: "run-tool".into(),
                desc: "Run the tiny script".into(),
                args: vec!["alpha".into(), "beta".into()],
                ..Default::default()
            },
        )?;
        Ok(())
    };
    let (code, lines) = run_build(&space, None, &["run-tool"], configure)?;
    assert_eq!(code, 0);
    assert_contains(&lines, "[step] run-tool completed");
    assert_eq!(space.read("ran.txt")?.trim(), "alpha beta");

    // Phony: a second invocation runs the program again.
    run_build(&space, None, &["run-tool"], configure)?;
    Ok(())
}

/// Child half of the fatal-action test; only runs when re-invoked by the
/// parent below.
#[test]
fn fatal_action_child() {
    let Ok(dir) = std::env::var("BPP_E2E_FATAL_DIR") else {
        return;
    };
    let space_root = std::path::PathBuf::from(dir);
    let mut build = bpp::build::Build::new(
        vec!["bpp-test".into(), "boom".into()],
        bpp::build::BuildEnv {
            root: space_root,
            cache_prefix: None,
            install_prefix: None,
            cxx: None,
            cxxflags: None,
        },
    )
    .unwrap();
    let step = build
        .add_step(StepOptions {
            name: "boom".into(),
            ..Default::default()
        })
        .unwrap();
    build
        .set_action(step, |_cx, _out| bail!("intentional failure"))
        .unwrap();
    // Aborts the process from a worker; execute never returns.
    let _ = build.execute();
    unreachable!("worker failure must abort the process");
}

#[test]
fn failing_action_aborts_the_process_naming_the_step() -> Result<()> {
    let space = TestSpace::new()?;
    let root = space.leak();
    let out = std::process::Command::new(std::env::current_exe()?)
        .args(["engine::fatal_action_child", "--exact", "--nocapture"])
        .env("BPP_E2E_FATAL_DIR", &root)
        .output()?;
    assert_eq!(out.status.code(), Some(1), "child must exit 1");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("bpp:"), "stderr: {stderr}");
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(stderr.contains("step \"boom\""), "stderr: {stderr}");
    assert!(stderr.contains("intentional failure"), "stderr: {stderr}");
    std::fs::remove_dir_all(&root).ok();
    Ok(())
}
