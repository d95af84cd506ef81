pub mod actions;
pub mod bootstrap;
pub mod build;
pub mod cache;
mod cli;
mod compile_commands;
mod densemap;
mod depfile;
pub mod depscan;
pub mod errors;
pub mod flags;
pub mod graph;
pub mod hash;
pub mod options;
pub mod plan;
pub mod process;
pub mod progress;
pub mod run;
mod scanner;
pub mod subproj;
pub mod terminal;
pub mod toolchain;
pub mod work;

#[cfg(not(windows))]
use jemallocator::Jemalloc;

#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
