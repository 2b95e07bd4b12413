use std::path::PathBuf;
use std::process::Command;

fn main() {
    let protos = ["proto/routing.proto", "proto/ids.proto"];
    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }

    let mut config = prost_build::Config::new();
    if std::env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path().expect("vendored protoc must be available");
        config.protoc_executable(protoc);
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("cargo sets OUT_DIR"));
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("routing_descriptor.bin"))
        .compile_protos_with_config(config, &protos, &["proto"])
        .expect("routing proto compilation must succeed");

    println!("cargo:rerun-if-env-changed=ROUTING_BUILD_ID");
    println!("cargo:rustc-env=ROUTING_BUILD_ID={}", build_id());
}

/// Abbreviated commit hash of the checkout, `unknown` outside a git tree.
fn build_id() -> String {
    if let Ok(id) = std::env::var("ROUTING_BUILD_ID") {
        return id;
    }

    Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
