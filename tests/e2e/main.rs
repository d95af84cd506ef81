//! Integration tests driving whole engine invocations against temp
//! directories, with a stub shell-script compiler standing in for the
//! toolchain.

mod engine;
mod fetch;
mod support;
mod toolchain;
