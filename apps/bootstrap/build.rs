//! Stamps the launcher with the commit it was built from.
//!
//! `bootstrap version` prints `BOOTSTRAP_GIT_COMMIT` next to the package
//! version. Builds outside a git checkout get `unknown`.

use std::process::Command;

fn main() {
    let commit = git(&["rev-parse", "--short=7", "HEAD"]).unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=BOOTSTRAP_GIT_COMMIT={commit}");

    // A new commit moves the branch ref; a checkout moves HEAD.
    if let Some(git_dir) = git(&["rev-parse", "--absolute-git-dir"]) {
        println!("cargo:rerun-if-changed={git_dir}/HEAD");
        if let Some(branch_ref) = git(&["symbolic-ref", "-q", "HEAD"]) {
            println!("cargo:rerun-if-changed={git_dir}/{branch_ref}");
        }
    }
}

/// Runs git in the package directory and returns its trimmed stdout.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}
