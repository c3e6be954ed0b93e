use std::env;

fn main() {
    if env::var("CARGO_CFG_TARGET_OS").map(|os| os == "windows").unwrap_or(false) {
        // Version info resource for the emulator's plugin list
        let res = winres::WindowsResource::new();
        if let Err(e) = res.compile() {
            println!("cargo:warning=failed to embed version resource: {}", e);
        }
    }
}
