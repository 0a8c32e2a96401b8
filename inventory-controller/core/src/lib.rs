#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod inventory;
mod namespace;
mod workload;

pub use self::{
    inventory::Inventory,
    namespace::{path_segments, NamespaceFilter},
    workload::{ListWorkloads, Workload},
};
