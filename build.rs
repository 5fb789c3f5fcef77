//! Bakes the Wi-Fi credentials into the firmware and sets up linking.
//!
//! `WIFI_SSID` and `WIFI_PASSWORD` are read from the environment, falling back
//! to a `.env` file next to this script (see `.env.example`).

const CREDENTIALS: [&str; 2] = ["WIFI_SSID", "WIFI_PASSWORD"];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    for key in CREDENTIALS {
        println!("cargo:rerun-if-env-changed={}", key);
    }

    // A missing .env is fine as long as the variables are exported.
    let _ = dotenvy::dotenv();

    for key in CREDENTIALS {
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={}={}", key, value),
            Err(_) => panic!("{} is not set; add it to .env or export it", key),
        }
    }

    if std::env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("xtensa") {
        println!("cargo:rustc-link-arg=-Tlinkall.x");
    }
}
