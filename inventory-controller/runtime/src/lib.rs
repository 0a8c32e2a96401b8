#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use inventory_controller_core as core;
pub use inventory_controller_k8s as k8s;

mod args;
pub mod client;
pub mod guard;
pub mod http;
pub mod server;
pub mod tls;

pub use self::{
    args::Args,
    guard::{ConnectionInfo, Guard, LogConnection, VerifyConnection},
    http::Handler,
    tls::TrustMaterial,
};
