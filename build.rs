/// Generate C header via cbindgen (only when `gen-header` feature is active).
/// Run `cargo build --features gen-header` to regenerate.
#[cfg(feature = "gen-header")]
fn generate_c_header() {
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let output_dir = std::path::PathBuf::from(&crate_dir).join("include");
    std::fs::create_dir_all(&output_dir).unwrap();

    let config = cbindgen::Config::from_file("cbindgen.toml")
        .expect("Unable to find cbindgen.toml");

    cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
        .expect("Unable to generate C bindings")
        .write_to_file(output_dir.join("xhal.h"));
}

/// Compile the RPC schema into `OUT_DIR/xhal_capnp.rs` (feature `rpc`).
#[cfg(feature = "rpc")]
fn compile_schema() {
    let crate_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let schema_dir = std::path::PathBuf::from(crate_dir).join("schema");
    println!("cargo:rerun-if-changed={}", schema_dir.display());

    capnpc::CompilerCommand::new()
        .src_prefix(&schema_dir)
        .file(schema_dir.join("xhal.capnp"))
        .run()
        .expect("Failed to compile Cap'n Proto schema");
}

fn main() {
    #[cfg(feature = "gen-header")]
    generate_c_header();

    #[cfg(feature = "rpc")]
    compile_schema();
}
