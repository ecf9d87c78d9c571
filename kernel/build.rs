use std::env;

fn main() {
    println!("cargo:rerun-if-changed=linker.ld");

    // The linker script only applies to the bootable image.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none") {
        let dir = env::var("CARGO_MANIFEST_DIR").unwrap();
        println!("cargo:rustc-link-arg-bins=-T{dir}/linker.ld");
    }
}
