use std::path::{Path, PathBuf};

fn main() {
    let proto = PathBuf::from("../proto/payments/v1/payments.proto");
    println!("cargo:rerun-if-changed={}", proto.display());
    println!("cargo:rerun-if-env-changed=PROTOC");

    // External protoc only: `PROTOC=/path/to/protoc` or `protoc` on PATH.
    if std::env::var_os("PROTOC").filter(|v| !v.is_empty()).is_none() {
        match std::process::Command::new("protoc").arg("--version").output() {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                let exit = out.status.code().unwrap_or(-1);
                let stderr = String::from_utf8_lossy(&out.stderr);
                panic!(
                    "protoc is required to build txload-testserver but PATH 'protoc' failed (exit={exit}): {stderr}"
                );
            }
            Err(e) => {
                panic!(
                    "protoc is required to build txload-testserver but was not found on PATH: {e}\n\
                     Install protoc or set PROTOC=/path/to/protoc"
                );
            }
        }
    }

    let out_dir = match std::env::var_os("OUT_DIR") {
        Some(v) => PathBuf::from(v),
        None => panic!("OUT_DIR is not set"),
    };

    let include_dir = Path::new("../proto").to_path_buf();

    if let Err(e) = tonic_prost_build::configure()
        .build_client(false)
        .file_descriptor_set_path(out_dir.join("payments_descriptor.bin"))
        .compile_protos(
            std::slice::from_ref(&proto),
            std::slice::from_ref(&include_dir),
        )
    {
        panic!("failed to compile payments protos: {e}");
    }
}
