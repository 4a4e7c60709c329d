//! Stamps the `plumb` binary with its source revision and build date.

use std::path::Path;
use std::process::Command;

fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn main() {
    let git_dir = Path::new("../../.git");
    if git_dir.exists() {
        println!("cargo::rerun-if-changed={}", git_dir.join("HEAD").display());
        println!("cargo::rerun-if-changed={}", git_dir.join("index").display());
    }

    // uncommitted changes show as a trailing +
    let revision = git(&["describe", "--always", "--dirty=+"]).unwrap_or_else(|| "unknown".into());
    let built = chrono::Utc::now().format("%Y-%m-%d").to_string();

    println!("cargo:rustc-env=PLUMB_GIT_HASH={revision}");
    println!("cargo:rustc-env=PLUMB_BUILD_DATE={built}");
}
