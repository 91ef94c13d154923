use std::{env, process::Command};

// Exposes FSK_BUILD_DESCRIBE to the crate. An explicit env override wins so
// release pipelines without a .git directory can still stamp binaries.
fn main() {
    println!("cargo:rerun-if-env-changed=FSK_BUILD_DESCRIBE");
    println!("cargo:rerun-if-changed=.git/HEAD");

    let describe = env::var("FSK_BUILD_DESCRIBE")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| git_output(&["describe", "--tags", "--always", "--dirty"]))
        .unwrap_or_else(|| "untagged".to_string());

    println!("cargo:rustc-env=FSK_BUILD_DESCRIBE={describe}");
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
