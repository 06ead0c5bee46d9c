// Build provenance for `cix version --extended`.
fn main() {
    for (cargo_var, exported) in [
        ("TARGET", "CIX_BUILD_TARGET"),
        ("PROFILE", "CIX_BUILD_PROFILE"),
    ] {
        if let Ok(value) = std::env::var(cargo_var) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={cargo_var}");
    }
}
