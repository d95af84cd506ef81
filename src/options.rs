//! Build options: `-D` key/value pairs declared by the configure script,
//! plus the persisted catalogue that lets help list options declared on
//! previous runs without re-running configure.

use crate::errors::BuildError;
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct OptionDecl {
    pub key: String,
    pub description: String,
}

#[derive(Default)]
#[derive(Debug)]
pub struct Options {
    catalogue: BTreeMap<String, OptionDecl>,
    values: HashMap<String, String>,
}

impl Options {
    /// Loads the `key :: description` catalogue written by previous runs.
    pub fn load_catalogue(&mut self, path: &Path) -> Result<()> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err).with_context(|| format!("read options catalogue {}", path.display()))
            }
        };
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, description) = match line.split_once("::") {
                Some((k, d)) => (k.trim(), d.trim()),
                None => (line.trim(), ""),
            };
            self.insert_decl(OptionDecl {
                key: key.to_string(),
                description: description.to_string(),
            });
        }
        Ok(())
    }

    /// Adds a declaration to the in-memory catalogue only.
    pub fn insert_decl(&mut self, decl: OptionDecl) {
        self.catalogue.insert(decl.key.clone(), decl);
    }

    /// Declares an option; a newly seen key is appended to the persisted
    /// catalogue.  Returns whether the key was new.
    pub fn declare(&mut self, key: &str, description: &str, catalogue_file: &Path) -> Result<bool> {
        if self.catalogue.contains_key(key) {
            return Ok(false);
        }
        let line = format!("{} :: {}\n", key, description);
        let mut text = std::fs::read_to_string(catalogue_file).unwrap_or_default();
        text.push_str(&line);
        std::fs::write(catalogue_file, text)
            .with_context(|| format!("append options catalogue {}", catalogue_file.display()))?;
        self.insert_decl(OptionDecl {
            key: key.to_string(),
            description: description.to_string(),
        });
        Ok(true)
    }

    /// Records a command-line `-D` assignment.
    pub fn set_value(&mut self, key: String, value: String) {
        self.values.insert(key, value);
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Declarations in key order, for help output.
    pub fn decls(&self) -> impl Iterator<Item = &OptionDecl> {
        self.catalogue.values()
    }
}

/// Typed views over an option's string value.
pub trait OptionValue: Sized {
    const KIND: &'static str;
    fn parse_opt(key: &str, raw: &str) -> Result<Self>;
}

impl OptionValue for bool {
    const KIND: &'static str = "boolean";
    fn parse_opt(key: &str, raw: &str) -> Result<bool> {
        match raw {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => bail!(BuildError::OptionParse {
                key: key.to_string(),
                kind: Self::KIND,
                value: raw.to_string(),
            }),
        }
    }
}

impl OptionValue for String {
    const KIND: &'static str = "string";
    fn parse_opt(_key: &str, raw: &str) -> Result<String> {
        Ok(raw.to_string())
    }
}

macro_rules! numeric_option {
    ($ty:ty, $kind:literal) => {
        impl OptionValue for $ty {
            const KIND: &'static str = $kind;
            fn parse_opt(key: &str, raw: &str) -> Result<$ty> {
                raw.parse().map_err(|_| {
                    BuildError::OptionParse {
                        key: key.to_string(),
                        kind: Self::KIND,
                        value: raw.to_string(),
                    }
                    .into()
                })
            }
        }
    };
}

numeric_option!(i64, "integer");
numeric_option!(u64, "integer");
numeric_option!(usize, "integer");
numeric_option!(f64, "number");
