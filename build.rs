use std::path::{Path, PathBuf};
use std::process::Command;

#[path = "src/version/scm.rs"]
#[allow(dead_code)]
mod scm;

const PRETEND_VERSION_ENV: &str = "RADAR_DISTANCE_PRETEND_VERSION";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR")?);
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    let version = match std::env::var(PRETEND_VERSION_ENV) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => {
            let describe = git_describe(&manifest_dir);
            let date = chrono::Utc::now().format("%Y%m%d").to_string();
            scm::resolve_version(describe.as_deref(), &date)
        }
    };

    std::fs::write(out_dir.join("version.rs"), scm::render_version_module(&version))?;

    println!("cargo:rerun-if-env-changed={PRETEND_VERSION_ENV}");
    let git_dir = manifest_dir.join(".git");
    if git_dir.exists() {
        println!("cargo:rerun-if-changed={}", git_dir.join("HEAD").display());
        println!("cargo:rerun-if-changed={}", git_dir.join("index").display());
        println!("cargo:rerun-if-changed={}", git_dir.join("refs").display());
        println!("cargo:rerun-if-changed={}", git_dir.join("packed-refs").display());
        // `--dirty` looks at the working tree, which the index alone does not track.
        for path in ["build.rs", "Cargo.toml", "src", "tests"] {
            println!("cargo:rerun-if-changed={}", manifest_dir.join(path).display());
        }
    }
    Ok(())
}

/// Output of `git describe`, or `None` outside a tagged checkout or without git.
fn git_describe(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--long", "--dirty"])
        .current_dir(dir)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
