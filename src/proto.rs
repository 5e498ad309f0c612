//! Generated prost/tonic code for the bundled service definitions. `build.rs` compiles every
//! file under `proto/` into `OUT_DIR`.
#![allow(clippy::all, clippy::pedantic)]

pub mod lnrpc {
    tonic::include_proto!("lnrpc");
}

pub mod routerrpc {
    tonic::include_proto!("routerrpc");
}

pub mod invoicesrpc {
    tonic::include_proto!("invoicesrpc");
}

pub mod walletrpc {
    tonic::include_proto!("walletrpc");
}

pub mod signrpc {
    tonic::include_proto!("signrpc");
}

pub mod chainrpc {
    tonic::include_proto!("chainrpc");
}

pub mod verrpc {
    tonic::include_proto!("verrpc");
}

/// Encoded `FileDescriptorSet` for every bundled proto file.
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("lnd_descriptor");
