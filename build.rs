use std::env;

fn main() {
    // TEV_UTICK_WIDTH, default to u64
    println!("cargo:rerun-if-env-changed=TEV_UTICK_WIDTH");
    let utick_width = env::var("TEV_UTICK_WIDTH")
        .unwrap_or("64".to_owned());
    match utick_width.as_str() {
        "32" | "64" | "128" => {}
        _ => panic!("TEV_UTICK_WIDTH must be one of 32, 64, 128, found {:?}", utick_width),
    }
    println!("cargo:rustc-check-cfg=cfg(tev_utick_width, values(\"32\", \"64\", \"128\"))");
    println!("cargo:rustc-cfg=tev_utick_width=\"{}\"", utick_width);
}
