//! Build script for ebtc
//!
//! Embeds build-time information (git commit, dirty status, build timestamp)
//! used by `ebtc --version`.

fn main() {
    // Re-run build if the packager overrides the default table name
    println!("cargo:rerun-if-env-changed=EBTC_DEFAULT_TABLE");

    // Embed git commit, build time, and dirty status
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("Failed to generate build info");
}
