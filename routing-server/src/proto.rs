//! Generated protobuf and gRPC code.
//!
//! `routing` carries the request/response protocol spoken with the
//! simulation; `ids` carries the records of the id store file.

#[allow(clippy::all)]
pub mod routing {
    tonic::include_proto!("routing");
}

#[allow(clippy::all)]
pub mod ids {
    tonic::include_proto!("ids");
}

/// Encoded descriptors of both packages, served over gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("routing_descriptor");
