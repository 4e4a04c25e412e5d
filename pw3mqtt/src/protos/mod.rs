// Generated from protobuf by build.rs.
include!(concat!(env!("OUT_DIR"), "/tedapi/mod.rs"));
