use std::env;
use std::fs;

fn main() {
    println!("cargo:rerun-if-changed=VERSION");

    let pinned = match fs::read_to_string("VERSION") {
        Ok(contents) => contents.trim().to_string(),
        Err(e) => panic!("cannot read VERSION ({}); create it with the crate version", e),
    };
    let package = env::var("CARGO_PKG_VERSION").unwrap_or_default();

    if pinned != package {
        panic!(
            "\n\nVERSION file says {} but Cargo.toml says {}; bump both together.\n\n",
            pinned, package
        );
    }

    // Without a driver feature the crate only exposes the contract and helpers
    let has_driver = ["CARGO_FEATURE_SQLITE", "CARGO_FEATURE_MYSQL"]
        .iter()
        .any(|feature| env::var_os(feature).is_some());
    if !has_driver {
        println!("cargo:warning=sql-cache built without the `sqlite` or `mysql` feature; no backend is available");
    }
}
