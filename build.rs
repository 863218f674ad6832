use std::env;

/// Compile-time defaults for the pending-writer task, overridable from the
/// build environment.
const DEFAULTS: [(&str, &str); 3] = [
    ("SETTINGS_WRITE_DELAY_MS", "2500"),
    ("SETTINGS_WRITER_STACK", "4096"),
    ("SETTINGS_WRITER_PRIORITY", "1"),
];

fn main() {
    for (name, default) in DEFAULTS {
        match env::var(name) {
            Ok(value) if value.parse::<u64>().is_ok() => {
                println!("cargo:rustc-env={}={}", name, value);
                println!("cargo:warning=Using {} from environment: {}", name, value);
            }
            Ok(value) => {
                println!(
                    "cargo:warning=Ignoring non-numeric {}={}, using {}",
                    name, value, default
                );
                println!("cargo:rustc-env={}={}", name, default);
            }
            Err(_) => {
                println!("cargo:rustc-env={}={}", name, default);
            }
        }
        println!("cargo:rerun-if-env-changed={}", name);
    }
}
