use protobuf_codegen::Codegen;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_files = ["src/protos/tedapi.proto"];

    for path in &proto_files {
        println!("cargo:rerun-if-changed={path}");
    }

    Codegen::new()
        .pure()
        .cargo_out_dir("tedapi")
        .inputs(proto_files)
        .include("src/protos")
        .run_from_script();

    Ok(())
}
