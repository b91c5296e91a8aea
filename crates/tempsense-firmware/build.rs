//! Embeds the board settings into the firmware image.
//!
//! `TEMPSENSE_SETTINGS` (from the environment or a `.env` file next to this
//! manifest) names the settings file; it defaults to `settings.toml`. A
//! missing file embeds empty settings, which the board reports as a
//! configuration fault at boot.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    let _ = dotenvy::from_path(manifest_dir.join(".env"));
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-env-changed=TEMPSENSE_SETTINGS");

    let settings_path = match env::var("TEMPSENSE_SETTINGS") {
        Ok(path) => manifest_dir.join(path),
        Err(_) => manifest_dir.join("settings.toml"),
    };
    println!("cargo:rerun-if-changed={}", settings_path.display());

    let settings = fs::read_to_string(&settings_path).unwrap_or_else(|_| {
        println!(
            "cargo:warning=settings file {} not found, the board will halt with a configuration fault",
            settings_path.display()
        );
        String::new()
    });

    fs::write(out_dir.join("settings.toml"), settings).expect("failed to write embedded settings");
}
