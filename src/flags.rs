//! Toolchain flag sets: the recognised knobs, overlay merging, canonical
//! hashing and canonical command-fragment rendering.

use crate::graph::{Input, StepCx};
use crate::hash::{self, Fingerprint};
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimize {
    #[default]
    Default,
    O0,
    O1,
    O2,
    O3,
    Fast,
}

impl Optimize {
    fn flag(self) -> Option<&'static str> {
        match self {
            Optimize::Default => None,
            Optimize::O0 => Some("-O0"),
            Optimize::O1 => Some("-O1"),
            Optimize::O2 => Some("-O2"),
            Optimize::O3 => Some("-O3"),
            Optimize::Fast => Some("-Ofast"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Standard {
    #[default]
    Default,
    Cxx11,
    Cxx14,
    Cxx17,
    Cxx20,
    Cxx23,
}

impl Standard {
    fn flag(self) -> Option<&'static str> {
        match self {
            Standard::Default => None,
            Standard::Cxx11 => Some("-std=c++11"),
            Standard::Cxx14 => Some("-std=c++14"),
            Standard::Cxx17 => Some("-std=c++17"),
            Standard::Cxx20 => Some("-std=c++20"),
            Standard::Cxx23 => Some("-std=c++23"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Define {
    pub name: String,
    pub value: String,
}

impl Define {
    pub fn new(name: &str, value: &str) -> Define {
        Define {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// A fully resolved flag set.  Paths may reference other steps' artifacts
/// (e.g. an include directory produced by an unpack step); those resolve at
/// hash/render time, once the referenced steps have completed.
#[derive(Clone)]
#[derive(Debug)]
pub struct FlagSet {
    pub compile_driver: PathBuf,
    pub include_paths: Vec<Input>,
    pub library_paths: Vec<Input>,
    pub libraries_by_path: Vec<Input>,
    pub libraries_by_name: Vec<String>,
    pub defines: Vec<Define>,
    pub warnings: bool,
    pub optimize: Optimize,
    pub standard: Standard,
    pub extra: String,
}

impl Default for FlagSet {
    fn default() -> FlagSet {
        FlagSet {
            compile_driver: PathBuf::from("c++"),
            include_paths: Vec::new(),
            library_paths: Vec::new(),
            libraries_by_path: Vec::new(),
            libraries_by_name: Vec::new(),
            defines: Vec::new(),
            warnings: true,
            optimize: Optimize::Default,
            standard: Standard::Default,
            extra: String::new(),
        }
    }
}

/// A partial flag set layered over another: unset scalar knobs inherit,
/// set ones override, list knobs concatenate, `extra` joins.
#[derive(Clone, Default)]
pub struct FlagOverlay {
    pub compile_driver: Option<PathBuf>,
    pub include_paths: Vec<Input>,
    pub library_paths: Vec<Input>,
    pub libraries_by_path: Vec<Input>,
    pub libraries_by_name: Vec<String>,
    pub defines: Vec<Define>,
    pub warnings: Option<bool>,
    pub optimize: Option<Optimize>,
    pub standard: Option<Standard>,
    pub extra: String,
}

impl FlagSet {
    pub fn overlay(&self, over: &FlagOverlay) -> FlagSet {
        let mut merged = self.clone();
        if let Some(driver) = &over.compile_driver {
            merged.compile_driver = driver.clone();
        }
        merged.include_paths.extend(over.include_paths.iter().cloned());
        merged.library_paths.extend(over.library_paths.iter().cloned());
        merged
            .libraries_by_path
            .extend(over.libraries_by_path.iter().cloned());
        merged
            .libraries_by_name
            .extend(over.libraries_by_name.iter().cloned());
        merged.defines.extend(over.defines.iter().cloned());
        if let Some(warnings) = over.warnings {
            merged.warnings = warnings;
        }
        if let Some(optimize) = over.optimize {
            merged.optimize = optimize;
        }
        if let Some(standard) = over.standard {
            merged.standard = standard;
        }
        if !over.extra.is_empty() {
            if !merged.extra.is_empty() {
                merged.extra.push(' ');
            }
            merged.extra.push_str(&over.extra);
        }
        merged
    }

    /// The canonical hash: an ordered fold over every knob in declaration
    /// order.  Step-referencing paths hash as their resolved artifact paths,
    /// which is legal because inputs complete before a dependant's hash
    /// closure runs.
    pub fn fingerprint(&self, cx: &StepCx) -> Result<Fingerprint> {
        let mut h = Fingerprint::ZERO;
        h = h.combine(hash::hash_str(&self.compile_driver.to_string_lossy()));
        for input in &self.include_paths {
            h = h.combine(hash::hash_str(&cx.resolve(input)?.to_string_lossy()));
        }
        for input in &self.library_paths {
            h = h.combine(hash::hash_str(&cx.resolve(input)?.to_string_lossy()));
        }
        for input in &self.libraries_by_path {
            h = h.combine(hash::hash_str(&cx.resolve(input)?.to_string_lossy()));
        }
        for name in &self.libraries_by_name {
            h = h.combine(hash::hash_str(name));
        }
        for define in &self.defines {
            h = h.combine(hash::hash_str(&define.name));
            h = h.combine(hash::hash_str(&define.value));
        }
        h = h.combine(Fingerprint(self.warnings as u64));
        h = h.combine(Fingerprint(self.optimize as u64));
        h = h.combine(Fingerprint(self.standard as u64));
        h = h.combine(hash::hash_str(&self.extra));
        Ok(h)
    }

    /// The leading part of a compile/link command: driver, extra flags,
    /// defines, warnings toggle, optimization, standard, include and library
    /// paths.
    pub fn render_front(&self, cx: &StepCx) -> Result<String> {
        let mut cmd = self.compile_driver.to_string_lossy().into_owned();
        if !self.extra.is_empty() {
            cmd.push(' ');
            cmd.push_str(&self.extra);
        }
        for define in &self.defines {
            cmd.push_str(" -D");
            cmd.push_str(&define.name);
            if !define.value.is_empty() {
                cmd.push('=');
                cmd.push_str(&define.value);
            }
        }
        if !self.warnings {
            cmd.push_str(" -w");
        }
        if let Some(flag) = self.optimize.flag() {
            cmd.push(' ');
            cmd.push_str(flag);
        }
        if let Some(flag) = self.standard.flag() {
            cmd.push(' ');
            cmd.push_str(flag);
        }
        for input in &self.include_paths {
            cmd.push_str(" -I");
            cmd.push_str(&cx.resolve(input)?.to_string_lossy());
        }
        for input in &self.library_paths {
            cmd.push_str(" -L");
            cmd.push_str(&cx.resolve(input)?.to_string_lossy());
        }
        Ok(cmd)
    }

    /// The trailing library arguments of a link command.
    pub fn render_libs(&self, cx: &StepCx) -> Result<String> {
        let mut cmd = String::new();
        for input in &self.libraries_by_path {
            cmd.push_str(" -l:");
            cmd.push_str(&cx.resolve(input)?.to_string_lossy());
        }
        for name in &self.libraries_by_name {
            cmd.push_str(" -l");
            cmd.push_str(name);
        }
        Ok(cmd)
    }
}
